use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{Db, Error, Submission};
use crate::verdict::Status;

/// A counterexample attempt against a submission.
///
/// Exactly one testcase body is supplied at save time: a ready-made `.txt`
/// input, or a `.cpp` generator whose stdout becomes the input. The judge
/// stores the generated text back onto the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hack {
  pub id: i64,
  pub submission_id: i64,
  #[serde(with = "serde_bytes")]
  pub test_case_cpp: Option<Vec<u8>>,
  #[serde(with = "serde_bytes")]
  pub test_case_txt: Option<Vec<u8>>,
  pub status: Status,
  /// Runtime in ms, -1 before judging.
  pub time: i64,
  /// Memory in KiB, -1 before judging.
  pub memory: i64,
  #[serde(with = "serde_bytes")]
  pub judge_output: Vec<u8>,
  #[serde(with = "serde_bytes")]
  pub stderr: Vec<u8>,
  pub created_at: DateTime<Utc>,

  /// Joined target submission; filled by fetch operations.
  pub submission: Option<Submission>,
}

impl Default for Hack {
  fn default() -> Self {
    return Self {
      id: 0,
      submission_id: 0,
      test_case_cpp: None,
      test_case_txt: None,
      status: Status::Waiting,
      time: -1,
      memory: -1,
      judge_output: vec![],
      stderr: vec![],
      created_at: Utc::now(),
      submission: None,
    };
  }
}

impl Db {
  /// Validate and insert a hack; returns the new id.
  ///
  /// Exactly one of the testcase bodies must be present. An explicitly
  /// empty body counts as present, so two empty bodies are still rejected.
  pub fn save_hack(&self, h: &Hack) -> Result<i64, Error> {
    match (&h.test_case_cpp, &h.test_case_txt) {
      (None, None) => {
        return Err(Error::Invalid("hack has no testcase body".to_string()));
      }
      (Some(_), Some(_)) => {
        return Err(Error::Invalid(
          "hack has both testcase bodies".to_string(),
        ));
      }
      _ => {}
    }

    let conn = self.conn();
    conn.execute(
      "INSERT INTO hacks
         (submission, test_case_cpp, test_case_txt, status, time, memory,
          judge_output, stderr, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
      params![
        h.submission_id,
        h.test_case_cpp,
        h.test_case_txt,
        h.status,
        h.time,
        h.memory,
        h.judge_output,
        h.stderr,
        h.created_at,
      ],
    )?;
    return Ok(conn.last_insert_rowid());
  }

  /// Fetch a hack joined with its target submission.
  pub fn fetch_hack(&self, id: i64) -> Result<Hack, Error> {
    if id == 0 {
      return Err(Error::NotExist);
    }

    let mut hack = self
      .conn()
      .query_row(
        "SELECT id, submission, test_case_cpp, test_case_txt, status,
                time, memory, judge_output, stderr, created_at
         FROM hacks WHERE id = ?1",
        (id,),
        |row| {
          Ok(Hack {
            id: row.get(0)?,
            submission_id: row.get(1)?,
            test_case_cpp: row.get(2)?,
            test_case_txt: row.get(3)?,
            status: row.get(4)?,
            time: row.get(5)?,
            memory: row.get(6)?,
            judge_output: row.get(7)?,
            stderr: row.get(8)?,
            created_at: row.get(9)?,
            submission: None,
          })
        },
      )
      .map_err(Error::or_not_exist)?;

    hack.submission = Some(self.fetch_submission(hack.submission_id)?);
    return Ok(hack);
  }

  /// Overwrite the mutable fields of a hack. The `.cpp` body and the target
  /// submission are immutable; the `.txt` body is writable so the judge can
  /// store generated inputs.
  pub fn update_hack(&self, h: &Hack) -> Result<(), Error> {
    let changed = self.conn().execute(
      "UPDATE hacks SET
         test_case_txt = ?2, status = ?3, time = ?4, memory = ?5,
         judge_output = ?6, stderr = ?7
       WHERE id = ?1",
      params![
        h.id,
        h.test_case_txt,
        h.status,
        h.time,
        h.memory,
        h.judge_output,
        h.stderr,
      ],
    )?;
    if changed == 0 {
      return Err(Error::NotExist);
    }
    return Ok(());
  }
}
