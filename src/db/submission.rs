use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{Db, Error, Problem, User};
use crate::verdict::Status;

/// Submission source size bounds, in bytes.
const MIN_SOURCE_LEN: usize = 1;
const MAX_SOURCE_LEN: usize = 1024 * 1024;

/// A single attempt by a user to solve a problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
  pub id: i64,
  pub problem_name: String,
  pub user_name: Option<String>,
  pub lang: String,
  pub source: String,
  pub status: Status,
  pub prev_status: Status,
  /// Max runtime over recorded cases in ms, -1 when nothing was measured.
  pub max_time: i64,
  /// Max memory over recorded cases in KiB, -1 when nothing was measured.
  pub max_memory: i64,
  #[serde(with = "serde_bytes")]
  pub compile_error: Vec<u8>,
  /// Testcase version the last judge run used.
  pub testcases_version: String,
  pub created_at: DateTime<Utc>,

  /// Joined problem row; filled by fetch operations.
  pub problem: Problem,
  /// Joined user row; filled by fetch operations.
  pub user: Option<User>,
}

impl Default for Submission {
  fn default() -> Self {
    return Self {
      id: 0,
      problem_name: String::new(),
      user_name: None,
      lang: String::new(),
      source: String::new(),
      status: Status::Waiting,
      prev_status: Status::Waiting,
      max_time: -1,
      max_memory: -1,
      compile_error: vec![],
      testcases_version: String::new(),
      created_at: Utc::now(),
      problem: Problem::default(),
      user: None,
    };
  }
}

/// Per-testcase result row, keyed on `(submission, testcase)`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubmissionTestcaseResult {
  pub submission: i64,
  pub testcase: String,
  pub status: Status,
  /// Runtime in ms.
  pub time: i64,
  /// Memory in KiB.
  pub memory: i64,
  #[serde(with = "serde_bytes")]
  pub stderr: Vec<u8>,
  #[serde(with = "serde_bytes")]
  pub checker_out: Vec<u8>,
}

/// Sort key for submission list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOrder {
  IdAsc,
  IdDesc,
  MaxTimeAsc,
  MaxTimeDesc,
}

impl SubmissionOrder {
  fn sql(&self) -> &'static str {
    return match self {
      SubmissionOrder::IdAsc => "id ASC",
      SubmissionOrder::IdDesc => "id DESC",
      SubmissionOrder::MaxTimeAsc => "max_time ASC",
      SubmissionOrder::MaxTimeDesc => "max_time DESC",
    };
  }

  /// Full ORDER BY body. `IdDesc` is always appended as the final tiebreak
  /// so orderings (and dedup picks) are deterministic.
  fn clause(keys: &[SubmissionOrder]) -> String {
    let mut parts: Vec<&str> = keys.iter().map(SubmissionOrder::sql).collect();
    parts.push(SubmissionOrder::IdDesc.sql());
    return parts.join(", ");
  }
}

/// Submission row without the source body, for list pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOverview {
  pub id: i64,
  pub problem_name: String,
  pub user_name: Option<String>,
  pub lang: String,
  pub status: Status,
  pub max_time: i64,
  pub max_memory: i64,
  pub testcases_version: String,
  pub created_at: DateTime<Utc>,
}

const FILTER: &str = "(?1 = '' OR problem_name = ?1)
   AND (?2 = '' OR status = ?2)
   AND (?3 = '' OR lang = ?3)
   AND (?4 = '' OR user_name = ?4)";

const OVERVIEW_COLS: &str = "id, problem_name, user_name, lang, status,
   max_time, max_memory, testcases_version, created_at";

impl Db {
  /// Validate and insert a submission; returns the new id.
  pub fn save_submission(&self, s: &Submission) -> Result<i64, Error> {
    if s.source.len() < MIN_SOURCE_LEN || s.source.len() > MAX_SOURCE_LEN {
      return Err(Error::Invalid(format!(
        "source length out of bounds: {}",
        s.source.len()
      )));
    }

    let conn = self.conn();
    conn.execute(
      "INSERT INTO submissions
         (problem_name, user_name, lang, source, status, prev_status,
          max_time, max_memory, compile_error, testcases_version, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
      params![
        s.problem_name,
        s.user_name,
        s.lang,
        s.source,
        s.status,
        s.prev_status,
        s.max_time,
        s.max_memory,
        s.compile_error,
        s.testcases_version,
        s.created_at,
      ],
    )?;
    return Ok(conn.last_insert_rowid());
  }

  /// Fetch a submission joined with its problem and user rows.
  pub fn fetch_submission(&self, id: i64) -> Result<Submission, Error> {
    // A zero id never refers to a saved row.
    if id == 0 {
      return Err(Error::NotExist);
    }

    return self
      .conn()
      .query_row(
        "SELECT s.id, s.problem_name, s.user_name, s.lang, s.source,
                s.status, s.prev_status, s.max_time, s.max_memory,
                s.compile_error, s.testcases_version, s.created_at,
                p.version, p.testcases_version, p.time_limit_ms, u.uid
         FROM submissions s
         JOIN problems p ON p.name = s.problem_name
         LEFT JOIN users u ON u.name = s.user_name
         WHERE s.id = ?1",
        (id,),
        |row| {
          let problem_name: String = row.get(1)?;
          let user_name: Option<String> = row.get(2)?;
          let uid: Option<String> = row.get(15)?;
          Ok(Submission {
            id: row.get(0)?,
            problem_name: problem_name.clone(),
            user_name: user_name.clone(),
            lang: row.get(3)?,
            source: row.get(4)?,
            status: row.get(5)?,
            prev_status: row.get(6)?,
            max_time: row.get(7)?,
            max_memory: row.get(8)?,
            compile_error: row.get(9)?,
            testcases_version: row.get(10)?,
            created_at: row.get(11)?,
            problem: Problem {
              name: problem_name,
              version: row.get(12)?,
              testcases_version: row.get(13)?,
              time_limit_ms: row.get(14)?,
            },
            user: match (user_name, uid) {
              (Some(name), Some(uid)) => Some(User { name, uid }),
              _ => None,
            },
          })
        },
      )
      .map_err(Error::or_not_exist);
  }

  /// Overwrite the mutable fields of a submission. Identity fields
  /// (problem, user, lang, source, creation time) are left untouched.
  pub fn update_submission(&self, s: &Submission) -> Result<(), Error> {
    let changed = self.conn().execute(
      "UPDATE submissions SET
         status = ?2, prev_status = ?3, max_time = ?4, max_memory = ?5,
         compile_error = ?6, testcases_version = ?7
       WHERE id = ?1",
      params![
        s.id,
        s.status,
        s.prev_status,
        s.max_time,
        s.max_memory,
        s.compile_error,
        s.testcases_version,
      ],
    )?;
    if changed == 0 {
      return Err(Error::NotExist);
    }
    return Ok(());
  }

  /// Narrow status-only update used by streaming sync.
  pub fn update_submission_status(&self, id: i64, status: Status) -> Result<(), Error> {
    let changed = self.conn().execute(
      "UPDATE submissions SET status = ?2 WHERE id = ?1",
      params![id, status],
    )?;
    if changed == 0 {
      return Err(Error::NotExist);
    }
    return Ok(());
  }

  pub fn clear_testcase_results(&self, submission: i64) -> Result<(), Error> {
    self.conn().execute(
      "DELETE FROM submission_testcase_results WHERE submission = ?1",
      (submission,),
    )?;
    return Ok(());
  }

  /// Idempotent bulk upsert keyed on `(submission, testcase)`.
  pub fn save_testcase_results(&self, results: &[SubmissionTestcaseResult]) -> Result<(), Error> {
    let mut conn = self.conn();
    let tx = conn.transaction()?;
    {
      let mut stmt = tx.prepare(
        "INSERT INTO submission_testcase_results
           (submission, testcase, status, time, memory, stderr, checker_out)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (submission, testcase) DO UPDATE SET
           status = excluded.status,
           time = excluded.time,
           memory = excluded.memory,
           stderr = excluded.stderr,
           checker_out = excluded.checker_out",
      )?;
      for r in results {
        stmt.execute(params![
          r.submission,
          r.testcase,
          r.status,
          r.time,
          r.memory,
          r.stderr,
          r.checker_out,
        ])?;
      }
    }
    tx.commit()?;
    return Ok(());
  }

  pub fn fetch_testcase_results(
    &self,
    submission: i64,
  ) -> Result<Vec<SubmissionTestcaseResult>, Error> {
    let conn = self.conn();
    let mut stmt = conn.prepare(
      "SELECT submission, testcase, status, time, memory, stderr, checker_out
       FROM submission_testcase_results
       WHERE submission = ?1
       ORDER BY testcase",
    )?;
    let rows = stmt.query_map((submission,), |row| {
      Ok(SubmissionTestcaseResult {
        submission: row.get(0)?,
        testcase: row.get(1)?,
        status: row.get(2)?,
        time: row.get(3)?,
        memory: row.get(4)?,
        stderr: row.get(5)?,
        checker_out: row.get(6)?,
      })
    })?;
    return rows.collect::<Result<_, _>>().map_err(Error::Sqlite);
  }

  /// Filtered, ordered submission page plus the filter-respecting total.
  ///
  /// Empty filter strings match everything. With `dedup_per_user` only the
  /// best-ranked row per user (under the requested order) survives, and the
  /// returned count honors that.
  #[allow(clippy::too_many_arguments)]
  pub fn fetch_submission_list(
    &self,
    problem: &str,
    status: &str,
    lang: &str,
    user: &str,
    dedup_per_user: bool,
    order: &[SubmissionOrder],
    skip: i64,
    limit: i64,
  ) -> Result<(Vec<SubmissionOverview>, i64), Error> {
    let order_sql = SubmissionOrder::clause(order);

    let (count_sql, page_sql) = if dedup_per_user {
      let ranked = format!(
        "WITH ranked AS (
           SELECT {}, ROW_NUMBER() OVER (PARTITION BY user_name ORDER BY {}) AS rn
           FROM submissions WHERE {})",
        OVERVIEW_COLS, order_sql, FILTER,
      );
      (
        format!("{} SELECT COUNT(*) FROM ranked WHERE rn = 1", ranked),
        format!(
          "{} SELECT {} FROM ranked WHERE rn = 1 ORDER BY {} LIMIT ?6 OFFSET ?5",
          ranked, OVERVIEW_COLS, order_sql,
        ),
      )
    } else {
      (
        format!("SELECT COUNT(*) FROM submissions WHERE {}", FILTER),
        format!(
          "SELECT {} FROM submissions WHERE {} ORDER BY {} LIMIT ?6 OFFSET ?5",
          OVERVIEW_COLS, FILTER, order_sql,
        ),
      )
    };

    let conn = self.conn();
    let count: i64 = conn.query_row(&count_sql, params![problem, status, lang, user], |row| {
      row.get(0)
    })?;

    let mut stmt = conn.prepare(&page_sql)?;
    let rows = stmt.query_map(
      params![problem, status, lang, user, skip, limit],
      |row| {
        Ok(SubmissionOverview {
          id: row.get(0)?,
          problem_name: row.get(1)?,
          user_name: row.get(2)?,
          lang: row.get(3)?,
          status: row.get(4)?,
          max_time: row.get(5)?,
          max_memory: row.get(6)?,
          testcases_version: row.get(7)?,
          created_at: row.get(8)?,
        })
      },
    )?;
    let page = rows.collect::<Result<_, _>>().map_err(Error::Sqlite)?;
    return Ok((page, count));
  }
}
