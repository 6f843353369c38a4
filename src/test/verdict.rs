use std::str::FromStr;

use crate::verdict::Status;

#[test]
fn test_display() {
  assert_eq!(Status::Waiting.to_string(), "WJ");
  assert_eq!(Status::Scheduled.to_string(), "-");
  assert_eq!(Status::Fetching.to_string(), "Fetching");
  assert_eq!(Status::Compiling.to_string(), "Compiling");
  assert_eq!(
    Status::Running {
      finished: 3,
      total: 20
    }
    .to_string(),
    "3/20"
  );
  assert_eq!(Status::Accepted.to_string(), "AC");
  assert_eq!(Status::CheckerCompileError.to_string(), "ICE");
  assert_eq!(Status::Fail.to_string(), "Fail");
}

#[test]
fn test_parse_round_trip() {
  for status in [
    Status::Waiting,
    Status::Scheduled,
    Status::Fetching,
    Status::Compiling,
    Status::Running {
      finished: 0,
      total: 7
    },
    Status::Accepted,
    Status::WrongAnswer,
    Status::TimeLimitExceeded,
    Status::MemoryLimitExceeded,
    Status::RuntimeError,
    Status::CompileError,
    Status::CheckerCompileError,
    Status::InternalError,
    Status::Fail,
  ] {
    assert_eq!(Status::from_str(&status.to_string()).unwrap(), status);
  }
}

#[test]
fn test_parse_invalid() {
  assert!(Status::from_str("").is_err());
  assert!(Status::from_str("ac").is_err());
  assert!(Status::from_str("3/").is_err());
  assert!(Status::from_str("a/b").is_err());
}

#[test]
fn test_default_is_waiting() {
  assert_eq!(Status::default(), Status::Waiting);
}
