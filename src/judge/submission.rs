use std::{sync::Arc, time};

use crate::{
  db::{Db, Submission, SubmissionTestcaseResult, TaskData},
  judge::{
    aggregate_results, compile_checker, compile_source, run_test_case, CaseResult, Error,
    SyncGate, SYNC_INTERVAL,
  },
  lang::LangCfg,
  sandbox::{Runtime, Volume},
  storage::{Fetcher, Info, Problem, ProblemFiles},
  verdict::Status,
  CONFIG,
};

/// Judge one submission task end to end.
///
/// Any failure other than a lost lease writes `IE` best-effort before
/// propagating; a lost lease leaves the streamed state untouched so the
/// next holder can restart cleanly.
pub async fn exec_submission_task(
  db: Arc<Db>,
  runtime: Arc<dyn Runtime>,
  fetcher: &Fetcher,
  task: TaskData,
  submission_id: i64,
) -> Result<(), Error> {
  log::info!(
    "start to judge submission (task: {}, submission: {})",
    task.task_id,
    submission_id
  );

  let s = db.fetch_submission(submission_id)?;
  let lang: LangCfg = s.lang.parse()?;

  let problem = Problem {
    name: s.problem.name.clone(),
    version: s.problem.version.clone(),
    testcase_version: s.problem.testcases_version.clone(),
  };
  let files = fetcher.fetch(&problem).await?;
  let info = Info::parse(&files.info_toml_path())?;

  let mut data = SubmissionJob {
    db,
    runtime,
    task,
    files,
    info,
    lang,
    s,
    results: vec![],
    pending: vec![],
    gate: SyncGate::new(SYNC_INTERVAL),
  };

  data.init()?;
  if let Err(err) = data.judge().await {
    if err.is_canceled() {
      return Err(err);
    }
    data.s.status = Status::InternalError;
    if let Err(deep) = data.update_submission() {
      log::error!("failed to record internal error: {}", deep);
    }
    return Err(err);
  }

  return Ok(());
}

struct SubmissionJob {
  db: Arc<Db>,
  runtime: Arc<dyn Runtime>,
  task: TaskData,
  files: ProblemFiles,
  info: Info,
  lang: LangCfg,
  s: Submission,
  results: Vec<SubmissionTestcaseResult>,
  /// Case rows buffered between syncs to cut write amplification.
  pending: Vec<SubmissionTestcaseResult>,
  gate: SyncGate,
}

impl SubmissionJob {
  /// Reset the submission for a fresh run and preallocate one `-` row per
  /// declared test case.
  fn init(&mut self) -> Result<(), Error> {
    self.results = self
      .info
      .test_case_names()
      .into_iter()
      .map(|name| SubmissionTestcaseResult {
        submission: self.s.id,
        testcase: name,
        status: Status::Scheduled,
        ..Default::default()
      })
      .collect();

    self.s.max_time = -1;
    self.s.max_memory = -1;
    self.s.prev_status = self.s.status;
    self.s.status = Status::Scheduled;
    self.s.testcases_version = self.s.problem.testcases_version.clone();
    self.s.compile_error = vec![];
    self.update_submission()?;

    self.db.clear_testcase_results(self.s.id)?;
    self.db.save_testcase_results(&self.results)?;
    return Ok(());
  }

  async fn judge(&mut self) -> Result<(), Error> {
    log::info!("fetch data");
    self.s.status = Status::Fetching;
    self.sync_status_and_results(false)?;

    log::info!("compile checker");
    self.s.status = Status::Compiling;
    self.sync_status_and_results(false)?;
    let (checker_volume, result) =
      compile_checker(self.runtime.clone(), &self.files, &self.info).await?;
    if result.exit_code != 0 {
      self.s.status = Status::CheckerCompileError;
      self.s.compile_error = result.stderr;
      let res = self.update_submission();
      checker_volume.remove().await;
      return res;
    }

    let res = self.judge_source(&checker_volume).await;
    checker_volume.remove().await;
    return res;
  }

  async fn judge_source(&mut self, checker_volume: &Volume) -> Result<(), Error> {
    let (source_volume, result) =
      compile_source(self.runtime.clone(), &self.files, &self.lang, &self.s.source).await?;
    let res = if result.exit_code != 0 {
      self.s.status = Status::CompileError;
      self.s.compile_error = result.stderr;
      self.update_submission()
    } else {
      self.run_cases(checker_volume, &source_volume).await
    };
    source_volume.remove().await;
    return res;
  }

  async fn run_cases(
    &mut self,
    checker_volume: &Volume,
    source_volume: &Volume,
  ) -> Result<(), Error> {
    log::info!("start executing");
    let total = self.results.len();
    let time_limit = self
      .info
      .time_limit()
      .mul_f64(CONFIG.judge.timeout_multiplier);

    let mut case_results = vec![];
    for idx in 0..total {
      let name = self.results[idx].testcase.clone();
      self.s.status = Status::Running {
        finished: idx,
        total,
      };
      self.sync_status_and_results(false)?;

      let result = match run_test_case(
        source_volume,
        checker_volume,
        &self.lang,
        time_limit,
        &self.files.in_file_path(&name),
        Some(&self.files.out_file_path(&name)),
      )
      .await
      {
        Ok(result) => result,
        Err(Error::Sandbox(err)) => {
          // A broken sandbox fails the case, not the whole run.
          log::error!("sandbox failure on case {}: {}", name, err);
          CaseResult {
            status: Status::InternalError,
            time: time::Duration::ZERO,
            memory: -1,
            stderr: vec![],
            checker_out: vec![],
          }
        }
        Err(err) => return Err(err),
      };

      let row = &mut self.results[idx];
      row.status = result.status;
      row.time = result.time.as_millis() as i64;
      row.memory = result.memory;
      row.stderr = result.stderr.clone();
      row.checker_out = result.checker_out.clone();
      self.pending.push(row.clone());
      case_results.push(result);
    }

    // Final sync must flush every buffered row before aggregation.
    self.sync_status_and_results(true)?;

    let total_result = aggregate_results(&case_results);
    self.s.status = total_result.status;
    self.s.max_time = total_result.time.as_millis() as i64;
    self.s.max_memory = total_result.memory;
    return self.update_submission();
  }

  /// Streamed status write. Rate limited unless forced; touches the lease
  /// and flushes buffered case rows as one upsert batch when it runs.
  fn sync_status_and_results(&mut self, force: bool) -> Result<(), Error> {
    if !self.gate.should_sync(force, time::Instant::now()) {
      return Ok(());
    }

    self.task.touch_if_needed()?;
    self.db.update_submission_status(self.s.id, self.s.status)?;
    if !self.pending.is_empty() {
      self.db.save_testcase_results(&self.pending)?;
      self.pending.clear();
    }
    return Ok(());
  }

  /// Full-record write; unconditional, used at init and finalization.
  fn update_submission(&mut self) -> Result<(), Error> {
    self.task.touch_if_needed()?;
    self.db.update_submission(&self.s)?;
    return Ok(());
  }
}
