use std::{fmt::Display, str::FromStr};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

/// Judging status of a submission, a hack or a single test case.
///
/// The wire form is the short status string stored in the database and
/// shown to users (`WJ`, `-`, `AC`, `3/20`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub enum Status {
  /// Waiting for judge.
  Waiting,
  /// Picked up by a worker, not started yet.
  Scheduled,
  /// Downloading problem artifacts.
  Fetching,
  /// Compiling the checker or the submitted source.
  Compiling,
  /// Running test case `finished` of `total`.
  Running { finished: usize, total: usize },
  Accepted,
  WrongAnswer,
  TimeLimitExceeded,
  MemoryLimitExceeded,
  RuntimeError,
  /// The submitted source failed to compile.
  CompileError,
  /// The problem checker failed to compile.
  CheckerCompileError,
  /// Internal judge error.
  InternalError,
  /// A hack against a submission that no longer compiles.
  Fail,
}

impl Default for Status {
  fn default() -> Self {
    return Status::Waiting;
  }
}

impl Display for Status {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Status::Waiting => write!(f, "WJ"),
      Status::Scheduled => write!(f, "-"),
      Status::Fetching => write!(f, "Fetching"),
      Status::Compiling => write!(f, "Compiling"),
      Status::Running { finished, total } => write!(f, "{}/{}", finished, total),
      Status::Accepted => write!(f, "AC"),
      Status::WrongAnswer => write!(f, "WA"),
      Status::TimeLimitExceeded => write!(f, "TLE"),
      Status::MemoryLimitExceeded => write!(f, "MLE"),
      Status::RuntimeError => write!(f, "RE"),
      Status::CompileError => write!(f, "CE"),
      Status::CheckerCompileError => write!(f, "ICE"),
      Status::InternalError => write!(f, "IE"),
      Status::Fail => write!(f, "Fail"),
    }
  }
}

/// Error when parsing a string which is not in the status set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid status: {status}")]
pub struct InvalidStatusError {
  pub status: String,
}

impl FromStr for Status {
  type Err = InvalidStatusError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "WJ" => return Ok(Status::Waiting),
      "-" => return Ok(Status::Scheduled),
      "Fetching" => return Ok(Status::Fetching),
      "Compiling" => return Ok(Status::Compiling),
      "AC" => return Ok(Status::Accepted),
      "WA" => return Ok(Status::WrongAnswer),
      "TLE" => return Ok(Status::TimeLimitExceeded),
      "MLE" => return Ok(Status::MemoryLimitExceeded),
      "RE" => return Ok(Status::RuntimeError),
      "CE" => return Ok(Status::CompileError),
      "ICE" => return Ok(Status::CheckerCompileError),
      "IE" => return Ok(Status::InternalError),
      "Fail" => return Ok(Status::Fail),
      _ => {}
    }

    if let Some((finished, total)) = s.split_once('/') {
      if let (Ok(finished), Ok(total)) = (finished.parse(), total.parse()) {
        return Ok(Status::Running { finished, total });
      }
    }

    return Err(InvalidStatusError {
      status: s.to_string(),
    });
  }
}

impl ToSql for Status {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    return Ok(ToSqlOutput::from(self.to_string()));
  }
}

impl FromSql for Status {
  fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
    return value
      .as_str()?
      .parse()
      .map_err(|e: InvalidStatusError| FromSqlError::Other(Box::new(e)));
  }
}
