mod hack;
mod submission;

pub use {hack::exec_hack_task, submission::exec_submission_task};

use std::{path::Path, sync::Arc, time};

use thiserror::Error;

use crate::{
  db,
  lang::{InvalidLangError, LangCfg},
  sandbox::{self, clip, Limits, TaskResult, Volume},
  storage,
  verdict::Status,
};

/// How often streamed status updates may hit the database.
pub const SYNC_INTERVAL: time::Duration = time::Duration::from_secs(3);

/// Byte cap on stderr / checker output stored per case.
const STORED_OUTPUT_CAP: u64 = 4096;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error")]
  Db(#[from] db::Error),

  #[error("sandbox error")]
  Sandbox(#[from] sandbox::Error),

  #[error("storage error")]
  Storage(#[from] storage::Error),

  #[error(transparent)]
  InvalidLang(#[from] InvalidLangError),

  #[error("judge i/o error")]
  Io(#[from] std::io::Error),
}

impl Error {
  /// Lease loss stops the pipeline without a terminal status write.
  pub fn is_canceled(&self) -> bool {
    return matches!(self, Error::Db(db::Error::Canceled));
  }
}

/// Verdict of a single executed test case.
#[derive(Debug, Clone)]
pub struct CaseResult {
  pub status: Status,
  pub time: time::Duration,
  /// Memory in KiB, -1 when not measured.
  pub memory: i64,
  pub stderr: Vec<u8>,
  pub checker_out: Vec<u8>,
}

/// Fold per-case verdicts into the submission verdict.
///
/// The status of a later non-AC case overwrites an earlier one; time and
/// memory are maxima, with -1 dominated by any measurement.
pub fn aggregate_results(results: &[CaseResult]) -> CaseResult {
  let mut ans = CaseResult {
    status: Status::Accepted,
    time: time::Duration::ZERO,
    memory: -1,
    stderr: vec![],
    checker_out: vec![],
  };
  for res in results {
    if res.status != Status::Accepted {
      ans.status = res.status;
    }
    if ans.time < res.time {
      ans.time = res.time;
    }
    if ans.memory < res.memory {
      ans.memory = res.memory;
    }
  }
  return ans;
}

/// Rate limiter for streamed status updates.
///
/// Takes explicit instants so the limit is testable without sleeping.
pub struct SyncGate {
  last: time::Instant,
  interval: time::Duration,
}

impl SyncGate {
  pub fn new(interval: time::Duration) -> Self {
    return Self {
      last: time::Instant::now(),
      interval,
    };
  }

  /// Whether a sync should run at `now`. A `true` return records the sync;
  /// `force` always passes and always records.
  pub fn should_sync(&mut self, force: bool, now: time::Instant) -> bool {
    if !force && now.duration_since(self.last) < self.interval {
      return false;
    }
    self.last = now;
    return true;
  }
}

/// Copy a source file (and the bundle include dir, when present) into a
/// volume and run the language's compile command there.
async fn stage_and_compile(
  volume: &Volume,
  lang: &LangCfg,
  source: &Path,
  include_dir: Option<&Path>,
) -> Result<TaskResult, Error> {
  volume.copy_in(source, lang.source()).await?;
  if let Some(dir) = include_dir {
    if dir.is_dir() {
      volume.copy_in(dir, "include").await?;
    }
  }
  return Ok(volume.run(lang.compile_cmd(), None, &Limits::compile()).await?);
}

/// Compile the checker the bundle declares, in a fresh volume.
///
/// A non-zero exit is not an error here; the caller maps it to `ICE`.
pub(crate) async fn compile_checker(
  runtime: Arc<dyn sandbox::Runtime>,
  files: &storage::ProblemFiles,
  info: &storage::Info,
) -> Result<(Volume, TaskResult), Error> {
  let lang: LangCfg = "checker".parse()?;
  let volume = Volume::new(runtime).await?;
  match stage_and_compile(
    &volume,
    &lang,
    &files.checker_path(info),
    Some(&files.include_dir()),
  )
  .await
  {
    Ok(result) => return Ok((volume, result)),
    Err(err) => {
      volume.remove().await;
      return Err(err);
    }
  }
}

/// Stage user source text into a scratch file and compile it in a fresh
/// volume. A non-zero exit is mapped to `CE` (or `Fail`) by the caller.
pub(crate) async fn compile_source(
  runtime: Arc<dyn sandbox::Runtime>,
  files: &storage::ProblemFiles,
  lang: &LangCfg,
  source: &str,
) -> Result<(Volume, TaskResult), Error> {
  let dir = tempfile::tempdir()?;
  let staged = dir.path().join(lang.source());
  std::fs::write(&staged, source)?;

  let volume = Volume::new(runtime).await?;
  match stage_and_compile(&volume, lang, &staged, Some(&files.include_dir())).await {
    Ok(result) => return Ok((volume, result)),
    Err(err) => {
      volume.remove().await;
      return Err(err);
    }
  }
}

/// Run one test case and decide its verdict.
///
/// Runtime flags dominate: OOM maps to MLE, a hit time limit to TLE, any
/// other abnormal exit to RE. Otherwise the checker decides: exit 0 is AC,
/// everything else WA with the checker output retained. A checker that
/// itself blows a resource limit marks the case as an internal error.
///
/// Without a reference output (hack cases) the program's own output fills
/// the answer slot; problems open to hacking ship checkers that judge from
/// input and output alone.
pub(crate) async fn run_test_case(
  source_volume: &Volume,
  checker_volume: &Volume,
  lang: &LangCfg,
  time_limit: time::Duration,
  in_file: &Path,
  expect_file: Option<&Path>,
) -> Result<CaseResult, Error> {
  let run = source_volume
    .run(lang.run_cmd(), Some(in_file), &Limits::run(time_limit))
    .await?;

  let mut result = CaseResult {
    status: Status::Accepted,
    time: run.cpu_time,
    memory: run.memory,
    stderr: clip(run.stderr, STORED_OUTPUT_CAP),
    checker_out: vec![],
  };

  if run.oom {
    result.status = Status::MemoryLimitExceeded;
  } else if run.tle {
    result.status = Status::TimeLimitExceeded;
  } else if run.exit_code != 0 {
    result.status = Status::RuntimeError;
  }
  if result.status != Status::Accepted {
    return Ok(result);
  }

  let dir = tempfile::tempdir()?;
  let actual = dir.path().join("actual.out");
  std::fs::write(&actual, &run.stdout)?;

  checker_volume.copy_in(in_file, "input.in").await?;
  checker_volume.copy_in(&actual, "actual.out").await?;
  checker_volume
    .copy_in(expect_file.unwrap_or(actual.as_path()), "expect.out")
    .await?;

  let checker_lang: LangCfg = "checker".parse()?;
  let check = checker_volume
    .run(
      &[
        checker_lang.run_cmd().clone(),
        vec![
          "input.in".to_string(),
          "actual.out".to_string(),
          "expect.out".to_string(),
        ],
      ]
      .concat(),
      None,
      &Limits::compile(),
    )
    .await?;

  result.checker_out = clip(
    [check.stdout.as_slice(), check.stderr.as_slice()].concat(),
    STORED_OUTPUT_CAP,
  );
  result.status = if check.tle || check.oom {
    Status::InternalError
  } else if check.exit_code == 0 {
    Status::Accepted
  } else {
    Status::WrongAnswer
  };
  return Ok(result);
}
