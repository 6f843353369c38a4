mod hack;
mod submission;
mod task;

pub use {
  hack::Hack,
  submission::{Submission, SubmissionOrder, SubmissionOverview, SubmissionTestcaseResult},
  task::{LeasedTask, TaskData, TaskKind},
};

use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use thiserror::Error;

/// Database failure taxonomy.
///
/// `NotExist` and `Invalid` are surfaced verbatim and never retried;
/// `Sqlite` is infrastructure and may be retried by the queue. `Canceled`
/// is the lease-loss signal and must stop a pipeline without finalizing.
#[derive(Debug, Error)]
pub enum Error {
  #[error("record not found")]
  NotExist,

  #[error("validation failed: {0}")]
  Invalid(String),

  #[error("task lease lost")]
  Canceled,

  #[error("database error")]
  Sqlite(#[from] rusqlite::Error),
}

impl Error {
  /// Map an empty query result to `NotExist`.
  fn or_not_exist(err: rusqlite::Error) -> Error {
    return match err {
      rusqlite::Error::QueryReturnedNoRows => Error::NotExist,
      err => Error::Sqlite(err),
    };
  }
}

/// Handle to the judge database.
///
/// Every operation is atomic with respect to a single row; multi-row writes
/// run in an explicit transaction.
pub struct Db {
  conn: Mutex<Connection>,
}

impl Db {
  pub fn open(url: &str) -> Result<Self, Error> {
    let conn = match url {
      ":memory:" => Connection::open_in_memory()?,
      path => Connection::open(path)?,
    };
    let db = Self {
      conn: Mutex::new(conn),
    };
    db.init_schema()?;
    return Ok(db);
  }

  pub fn open_in_memory() -> Result<Self, Error> {
    return Self::open(":memory:");
  }

  pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
    return self.conn.lock().unwrap();
  }

  fn init_schema(&self) -> Result<(), Error> {
    self.conn().execute_batch(SCHEMA)?;
    return Ok(());
  }

  pub fn register_user(&self, name: &str, uid: &str) -> Result<(), Error> {
    if name.is_empty() {
      return Err(Error::Invalid("empty user name".to_string()));
    }
    self.conn().execute(
      "INSERT INTO users (name, uid) VALUES (?1, ?2)",
      (name, uid),
    )?;
    return Ok(());
  }

  pub fn fetch_user(&self, name: &str) -> Result<User, Error> {
    return self
      .conn()
      .query_row(
        "SELECT name, uid FROM users WHERE name = ?1",
        (name,),
        |row| {
          Ok(User {
            name: row.get(0)?,
            uid: row.get(1)?,
          })
        },
      )
      .map_err(Error::or_not_exist);
  }

  pub fn save_problem(&self, p: &Problem) -> Result<(), Error> {
    self.conn().execute(
      "INSERT INTO problems (name, version, testcases_version, time_limit_ms)
       VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT (name) DO UPDATE SET
         version = excluded.version,
         testcases_version = excluded.testcases_version,
         time_limit_ms = excluded.time_limit_ms",
      (&p.name, &p.version, &p.testcases_version, p.time_limit_ms),
    )?;
    return Ok(());
  }

  pub fn fetch_problem(&self, name: &str) -> Result<Problem, Error> {
    return self
      .conn()
      .query_row(
        "SELECT name, version, testcases_version, time_limit_ms
         FROM problems WHERE name = ?1",
        (name,),
        |row| {
          Ok(Problem {
            name: row.get(0)?,
            version: row.get(1)?,
            testcases_version: row.get(2)?,
            time_limit_ms: row.get(3)?,
          })
        },
      )
      .map_err(Error::or_not_exist);
  }
}

/// Problem row, joined into submissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Problem {
  pub name: String,
  pub version: String,
  pub testcases_version: String,
  pub time_limit_ms: i64,
}

/// User row, joined into submissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
  pub name: String,
  pub uid: String,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
  name TEXT PRIMARY KEY,
  uid TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS problems (
  name TEXT PRIMARY KEY,
  version TEXT NOT NULL DEFAULT '',
  testcases_version TEXT NOT NULL DEFAULT '',
  time_limit_ms INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS submissions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  problem_name TEXT NOT NULL REFERENCES problems (name),
  user_name TEXT REFERENCES users (name),
  lang TEXT NOT NULL DEFAULT '',
  source TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'WJ',
  prev_status TEXT NOT NULL DEFAULT 'WJ',
  max_time INTEGER NOT NULL DEFAULT -1,
  max_memory INTEGER NOT NULL DEFAULT -1,
  compile_error BLOB NOT NULL DEFAULT x'',
  testcases_version TEXT NOT NULL DEFAULT '',
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS submissions_filter
  ON submissions (problem_name, user_name, lang, status);

CREATE TABLE IF NOT EXISTS submission_testcase_results (
  submission INTEGER NOT NULL REFERENCES submissions (id),
  testcase TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT '-',
  time INTEGER NOT NULL DEFAULT 0,
  memory INTEGER NOT NULL DEFAULT 0,
  stderr BLOB NOT NULL DEFAULT x'',
  checker_out BLOB NOT NULL DEFAULT x'',
  PRIMARY KEY (submission, testcase)
);

CREATE TABLE IF NOT EXISTS hacks (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  submission INTEGER NOT NULL REFERENCES submissions (id),
  test_case_cpp BLOB,
  test_case_txt BLOB,
  status TEXT NOT NULL DEFAULT 'WJ',
  time INTEGER NOT NULL DEFAULT -1,
  memory INTEGER NOT NULL DEFAULT -1,
  judge_output BLOB NOT NULL DEFAULT x'',
  stderr BLOB NOT NULL DEFAULT x'',
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  kind TEXT NOT NULL,
  payload INTEGER NOT NULL,
  priority INTEGER NOT NULL DEFAULT 0,
  available INTEGER NOT NULL,
  worker TEXT
);

CREATE INDEX IF NOT EXISTS tasks_available ON tasks (available, priority);
";
