use crate::{
  db::{self, TaskData, TaskKind},
  test::util::test_db,
};

#[test]
fn test_push_pop() {
  let db = test_db();

  db.push_task(TaskKind::Submission, 10, 0).unwrap();
  let urgent = db.push_task(TaskKind::Hack, 20, 5).unwrap();

  let leased = db.pop_task("w1").unwrap().unwrap();
  assert_eq!(leased.id, urgent);
  assert_eq!(leased.kind, TaskKind::Hack);
  assert_eq!(leased.payload, 20);

  let leased = db.pop_task("w1").unwrap().unwrap();
  assert_eq!(leased.kind, TaskKind::Submission);
  assert_eq!(leased.payload, 10);
}

#[test]
fn test_pop_empty() {
  let db = test_db();

  assert!(db.pop_task("w1").unwrap().is_none());
}

#[test]
fn test_pop_leased_task_hidden() {
  let db = test_db();

  db.push_task(TaskKind::Submission, 1, 0).unwrap();
  assert!(db.pop_task("w1").unwrap().is_some());

  // the lease hides the task from other workers
  assert!(db.pop_task("w2").unwrap().is_none());
}

#[test]
fn test_expired_lease_is_stolen() {
  let db = test_db();

  let id = db.push_task(TaskKind::Submission, 1, 0).unwrap();
  db.pop_task("w1").unwrap().unwrap();

  // fake lease expiry
  db.conn()
    .execute("UPDATE tasks SET available = 0", [])
    .unwrap();

  let leased = db.pop_task("w2").unwrap().unwrap();
  assert_eq!(leased.id, id);

  // the original holder notices on its next touch
  assert!(matches!(
    db.touch_task(id, "w1"),
    Err(db::Error::Canceled)
  ));
  db.touch_task(id, "w2").unwrap();
}

#[test]
fn test_touch_if_needed() {
  let db = test_db();

  let id = db.push_task(TaskKind::Submission, 1, 0).unwrap();
  db.pop_task("w1").unwrap().unwrap();

  let mut task = TaskData::new(db.clone(), id, "w1");

  // inside half the lease interval this is a no-op, even without a row
  task.touch_if_needed().unwrap();

  task.expire_heartbeat();
  task.touch_if_needed().unwrap();

  // once the task is gone, a due touch surfaces the cancellation
  db.complete_task(id).unwrap();
  task.expire_heartbeat();
  assert!(matches!(
    task.touch_if_needed(),
    Err(db::Error::Canceled)
  ));
}

#[test]
fn test_complete_task() {
  let db = test_db();

  let id = db.push_task(TaskKind::Submission, 1, 0).unwrap();
  db.pop_task("w1").unwrap().unwrap();
  db.complete_task(id).unwrap();

  db.conn()
    .execute("UPDATE tasks SET available = 0", [])
    .unwrap();
  assert!(db.pop_task("w2").unwrap().is_none());
}

#[test]
fn test_abandon_task() {
  let db = test_db();

  let id = db.push_task(TaskKind::Submission, 1, 0).unwrap();
  db.pop_task("w1").unwrap().unwrap();

  db.abandon_task(id).unwrap();
  let leased = db.pop_task("w2").unwrap().unwrap();
  assert_eq!(leased.id, id);
}
