use std::sync::Arc;

use crate::{
  db::{self, Hack, TaskData, TaskKind},
  judge::exec_hack_task,
  storage::{DirSource, Fetcher},
  test::{
    init,
    util::{
      create_dummy_problem, dummy_submission, failed_result, ms, ok_result, result_with_stdout,
      test_db, write_bundle, MockRuntime,
    },
  },
  verdict::Status,
};

fn saved_submission(db: &db::Db) -> i64 {
  create_dummy_problem(db);
  db.register_user("user1", "id1").unwrap();
  return db
    .save_submission(&dummy_submission(Some("user1"), 0))
    .unwrap();
}

#[test]
fn test_hack() {
  let db = test_db();
  let sub_id = saved_submission(&db);

  let hack_id = db
    .save_hack(&Hack {
      submission_id: sub_id,
      test_case_cpp: Some(vec![]),
      ..Default::default()
    })
    .unwrap();

  let hack = db.fetch_hack(hack_id).unwrap();
  assert_eq!(hack.submission.unwrap().id, sub_id);
}

#[test]
fn test_save_invalid_hack() {
  let db = test_db();
  let sub_id = saved_submission(&db);

  // no testcase body at all
  assert!(matches!(
    db.save_hack(&Hack {
      submission_id: sub_id,
      ..Default::default()
    }),
    Err(db::Error::Invalid(_))
  ));

  // both bodies, even though empty
  assert!(matches!(
    db.save_hack(&Hack {
      submission_id: sub_id,
      test_case_cpp: Some(vec![]),
      test_case_txt: Some(vec![]),
      ..Default::default()
    }),
    Err(db::Error::Invalid(_))
  ));
}

#[test]
fn test_fetch_invalid_hack() {
  let db = test_db();

  assert!(matches!(db.fetch_hack(123), Err(db::Error::NotExist)));
  assert!(matches!(db.fetch_hack(0), Err(db::Error::NotExist)));
}

#[test]
fn test_update_hack() {
  let db = test_db();
  let sub_id = saved_submission(&db);

  let hack_id = db
    .save_hack(&Hack {
      submission_id: sub_id,
      test_case_txt: Some(vec![]),
      ..Default::default()
    })
    .unwrap();

  let mut hack = db.fetch_hack(hack_id).unwrap();
  hack.status = Status::Accepted;
  db.update_hack(&hack).unwrap();

  let hack = db.fetch_hack(hack_id).unwrap();
  assert_eq!(hack.status, Status::Accepted);
}

struct HackEnv {
  db: Arc<db::Db>,
  runtime: Arc<MockRuntime>,
  fetcher: Fetcher,
  task: TaskData,
  hack_id: i64,
  _dirs: (tempfile::TempDir, tempfile::TempDir),
}

fn hack_env(hack: Hack) -> HackEnv {
  init();
  let db = test_db();
  let sub_id = saved_submission(&db);
  let hack_id = db
    .save_hack(&Hack {
      submission_id: sub_id,
      ..hack
    })
    .unwrap();

  let task_id = db.push_task(TaskKind::Hack, hack_id, 0).unwrap();
  let leased = db.pop_task("w1").unwrap().unwrap();
  assert_eq!(leased.id, task_id);
  let task = TaskData::new(db.clone(), leased.id, "w1");

  let storage_dir = tempfile::tempdir().unwrap();
  let cache_dir = tempfile::tempdir().unwrap();
  write_bundle(storage_dir.path(), 1);
  let fetcher = Fetcher::new(
    cache_dir.path(),
    Arc::new(DirSource::new(storage_dir.path())),
  );

  return HackEnv {
    db,
    runtime: MockRuntime::new(),
    fetcher,
    task,
    hack_id,
    _dirs: (storage_dir, cache_dir),
  };
}

#[tokio::test]
async fn test_hack_txt_accepted() {
  let env = hack_env(Hack {
    test_case_txt: Some(b"1 2\n".to_vec()),
    ..Default::default()
  });

  env.runtime.push_compile(ok_result()); // checker
  env.runtime.push_compile(ok_result()); // submission source
  env
    .runtime
    .push_run(result_with_stdout(b"3\n", ms(100), 512));
  env.runtime.push_check(ok_result());

  exec_hack_task(
    env.db.clone(),
    env.runtime.clone(),
    &env.fetcher,
    env.task,
    env.hack_id,
  )
  .await
  .unwrap();

  let hack = env.db.fetch_hack(env.hack_id).unwrap();
  assert_eq!(hack.status, Status::Accepted);
  assert_eq!(hack.time, 100);
  assert_eq!(hack.memory, 512);
  assert_eq!(env.runtime.created(), env.runtime.removed());
}

#[tokio::test]
async fn test_hack_txt_breaks_submission() {
  let env = hack_env(Hack {
    test_case_txt: Some(b"1 2\n".to_vec()),
    ..Default::default()
  });

  env.runtime.push_compile(ok_result());
  env.runtime.push_compile(ok_result());
  env.runtime.push_run(failed_result(9, b"segfault"));

  exec_hack_task(
    env.db.clone(),
    env.runtime.clone(),
    &env.fetcher,
    env.task,
    env.hack_id,
  )
  .await
  .unwrap();

  let hack = env.db.fetch_hack(env.hack_id).unwrap();
  assert_eq!(hack.status, Status::RuntimeError);
  assert_eq!(hack.stderr, b"segfault");
}

#[tokio::test]
async fn test_hack_generator_produces_input() {
  let env = hack_env(Hack {
    test_case_cpp: Some(b"int main() { puts(\"1 2\"); }".to_vec()),
    ..Default::default()
  });

  env.runtime.push_compile(ok_result()); // checker
  env.runtime.push_compile(ok_result()); // generator
  env.runtime.push_compile(ok_result()); // submission source
  env
    .runtime
    .push_run(result_with_stdout(b"1 2\n", ms(5), 128)); // generator
  env
    .runtime
    .push_run(result_with_stdout(b"3\n", ms(100), 512)); // submission
  env.runtime.push_check(ok_result());

  exec_hack_task(
    env.db.clone(),
    env.runtime.clone(),
    &env.fetcher,
    env.task,
    env.hack_id,
  )
  .await
  .unwrap();

  let hack = env.db.fetch_hack(env.hack_id).unwrap();
  assert_eq!(hack.test_case_txt.as_deref(), Some(b"1 2\n".as_slice()));
  assert_eq!(hack.status, Status::Accepted);
  assert_eq!(env.runtime.created(), env.runtime.removed());
}

#[tokio::test]
async fn test_hack_generator_failure() {
  let env = hack_env(Hack {
    test_case_cpp: Some(b"int main() { return 1; }".to_vec()),
    ..Default::default()
  });

  env.runtime.push_compile(ok_result()); // checker
  env.runtime.push_compile(ok_result()); // generator
  env.runtime.push_run(failed_result(1, b"gen crashed"));

  exec_hack_task(
    env.db.clone(),
    env.runtime.clone(),
    &env.fetcher,
    env.task,
    env.hack_id,
  )
  .await
  .unwrap();

  let hack = env.db.fetch_hack(env.hack_id).unwrap();
  assert_eq!(hack.status, Status::Fail);
  assert_eq!(hack.test_case_txt, None);
}

#[tokio::test]
async fn test_hack_submission_no_longer_compiles() {
  let env = hack_env(Hack {
    test_case_txt: Some(b"1 2\n".to_vec()),
    ..Default::default()
  });

  env.runtime.push_compile(ok_result()); // checker
  env
    .runtime
    .push_compile(failed_result(1, b"no longer compiles"));

  exec_hack_task(
    env.db.clone(),
    env.runtime.clone(),
    &env.fetcher,
    env.task,
    env.hack_id,
  )
  .await
  .unwrap();

  let hack = env.db.fetch_hack(env.hack_id).unwrap();
  assert_eq!(hack.status, Status::Fail);
  assert_eq!(hack.stderr, b"no longer compiles");
}
