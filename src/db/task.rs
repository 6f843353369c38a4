use std::{sync::Arc, time};

use chrono::Utc;
use rusqlite::{
  params,
  types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
  OptionalExtension,
};

use super::{Db, Error};
use crate::CONFIG;

/// Kind of a queued judge task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TaskKind {
  Submission,
  Hack,
  Rejudge,
}

impl ToSql for TaskKind {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    return Ok(ToSqlOutput::from(self.to_string()));
  }
}

impl FromSql for TaskKind {
  fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
    return value
      .as_str()?
      .parse()
      .map_err(|e: strum::ParseError| FromSqlError::Other(Box::new(e)));
  }
}

/// A task popped from the queue, held under a lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasedTask {
  pub id: i64,
  pub kind: TaskKind,
  pub payload: i64,
}

fn now_millis() -> i64 {
  return Utc::now().timestamp_millis();
}

fn lease_millis() -> i64 {
  return CONFIG.judge.lease_interval.as_millis() as i64;
}

impl Db {
  /// Enqueue a task; it becomes leasable immediately.
  pub fn push_task(&self, kind: TaskKind, payload: i64, priority: i64) -> Result<i64, Error> {
    let conn = self.conn();
    conn.execute(
      "INSERT INTO tasks (kind, payload, priority, available) VALUES (?1, ?2, ?3, ?4)",
      params![kind, payload, priority, now_millis()],
    )?;
    return Ok(conn.last_insert_rowid());
  }

  /// Lease the best available task for `worker`, if any.
  ///
  /// Expired leases are taken over; the previous holder notices through a
  /// failed touch.
  pub fn pop_task(&self, worker: &str) -> Result<Option<LeasedTask>, Error> {
    let now = now_millis();
    return self
      .conn()
      .query_row(
        "UPDATE tasks SET available = ?2, worker = ?3
         WHERE id = (
           SELECT id FROM tasks WHERE available <= ?1
           ORDER BY priority DESC, id ASC LIMIT 1)
         RETURNING id, kind, payload",
        params![now, now + lease_millis(), worker],
        |row| {
          Ok(LeasedTask {
            id: row.get(0)?,
            kind: row.get(1)?,
            payload: row.get(2)?,
          })
        },
      )
      .optional()
      .map_err(Error::Sqlite);
  }

  /// Extend the lease on a held task. `Canceled` when the row is no longer
  /// held by `worker`.
  pub fn touch_task(&self, id: i64, worker: &str) -> Result<(), Error> {
    let changed = self.conn().execute(
      "UPDATE tasks SET available = ?3 WHERE id = ?1 AND worker = ?2",
      params![id, worker, now_millis() + lease_millis()],
    )?;
    if changed == 0 {
      return Err(Error::Canceled);
    }
    return Ok(());
  }

  /// Drop a finished task from the queue.
  pub fn complete_task(&self, id: i64) -> Result<(), Error> {
    self
      .conn()
      .execute("DELETE FROM tasks WHERE id = ?1", (id,))?;
    return Ok(());
  }

  /// Give up a lease so another worker can pick the task up at once.
  pub fn abandon_task(&self, id: i64) -> Result<(), Error> {
    self.conn().execute(
      "UPDATE tasks SET available = ?2, worker = NULL WHERE id = ?1",
      params![id, now_millis()],
    )?;
    return Ok(());
  }
}

/// Lease handle a pipeline heartbeats through while judging.
pub struct TaskData {
  db: Arc<Db>,
  pub task_id: i64,
  worker: String,
  last_touch: time::Instant,
}

impl TaskData {
  pub fn new(db: Arc<Db>, task_id: i64, worker: &str) -> Self {
    return Self {
      db,
      task_id,
      worker: worker.to_string(),
      last_touch: time::Instant::now(),
    };
  }

  /// Extend the lease once more than half the lease interval has elapsed
  /// since the last heartbeat; otherwise a no-op.
  pub fn touch_if_needed(&mut self) -> Result<(), Error> {
    if self.last_touch.elapsed() * 2 < CONFIG.judge.lease_interval {
      return Ok(());
    }
    self.db.touch_task(self.task_id, &self.worker)?;
    self.last_touch = time::Instant::now();
    return Ok(());
  }

  /// Backdate the heartbeat so the next `touch_if_needed` hits the database.
  #[cfg(test)]
  pub(crate) fn expire_heartbeat(&mut self) {
    self.last_touch -= CONFIG.judge.lease_interval;
  }
}
