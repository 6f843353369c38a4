use std::sync::Arc;

use crate::{
  db::{self, Db, Hack, Submission, TaskData},
  judge::{compile_checker, compile_source, run_test_case, Error, STORED_OUTPUT_CAP},
  lang::LangCfg,
  sandbox::{clip, Limits, Runtime, TaskResult, Volume},
  storage::{Fetcher, Info, Problem, ProblemFiles},
  verdict::Status,
  CONFIG,
};

/// Judge one hack task: synthesize the testcase, re-compile the referenced
/// submission and run the single case.
pub async fn exec_hack_task(
  db: Arc<Db>,
  runtime: Arc<dyn Runtime>,
  fetcher: &Fetcher,
  task: TaskData,
  hack_id: i64,
) -> Result<(), Error> {
  log::info!(
    "start to judge hack (task: {}, hack: {})",
    task.task_id,
    hack_id
  );

  let h = db.fetch_hack(hack_id)?;
  let s = h
    .submission
    .clone()
    .ok_or(Error::Db(db::Error::NotExist))?;
  let lang: LangCfg = s.lang.parse()?;

  let problem = Problem {
    name: s.problem.name.clone(),
    version: s.problem.version.clone(),
    testcase_version: s.problem.testcases_version.clone(),
  };
  let files = fetcher.fetch(&problem).await?;
  let info = Info::parse(&files.info_toml_path())?;

  let mut data = HackJob {
    db,
    runtime,
    task,
    files,
    info,
    lang,
    h,
    s,
  };

  if let Err(err) = data.judge().await {
    if err.is_canceled() {
      return Err(err);
    }
    data.h.status = Status::InternalError;
    if let Err(deep) = data.update_hack() {
      log::error!("failed to record internal error: {}", deep);
    }
    return Err(err);
  }

  return Ok(());
}

struct HackJob {
  db: Arc<Db>,
  runtime: Arc<dyn Runtime>,
  task: TaskData,
  files: ProblemFiles,
  info: Info,
  lang: LangCfg,
  h: Hack,
  s: Submission,
}

impl HackJob {
  async fn judge(&mut self) -> Result<(), Error> {
    log::info!("compile checker");
    self.h.status = Status::Compiling;
    self.update_hack()?;

    let (checker_volume, result) =
      compile_checker(self.runtime.clone(), &self.files, &self.info).await?;
    if result.exit_code != 0 {
      self.h.status = Status::CheckerCompileError;
      self.h.stderr = result.stderr;
      let res = self.update_hack();
      checker_volume.remove().await;
      return res;
    }

    let res = self.judge_case(&checker_volume).await;
    checker_volume.remove().await;
    return res;
  }

  async fn judge_case(&mut self, checker_volume: &Volume) -> Result<(), Error> {
    let input = match self.synthesize_input().await? {
      Some(input) => input,
      // The generator failed; its verdict is already on the row.
      None => return Ok(()),
    };

    let (source_volume, result) =
      compile_source(self.runtime.clone(), &self.files, &self.lang, &self.s.source).await?;
    if result.exit_code != 0 {
      // Hacks presuppose a submission that still compiles.
      self.h.status = Status::Fail;
      self.h.stderr = result.stderr;
      let res = self.update_hack();
      source_volume.remove().await;
      return res;
    }

    let res = self.run_case(checker_volume, &source_volume, &input).await;
    source_volume.remove().await;
    return res;
  }

  /// Produce the testcase input: the stored text, or the generator's stdout.
  ///
  /// `None` means the generator could not produce an input and the hack was
  /// finalized as `Fail`.
  async fn synthesize_input(&mut self) -> Result<Option<Vec<u8>>, Error> {
    if let Some(txt) = &self.h.test_case_txt {
      return Ok(Some(txt.clone()));
    }

    let cpp = match &self.h.test_case_cpp {
      Some(cpp) => String::from_utf8_lossy(cpp).to_string(),
      None => {
        return Err(Error::Db(db::Error::Invalid(
          "hack has no testcase body".to_string(),
        )));
      }
    };

    log::info!("compile generator");
    let gen_lang: LangCfg = "cpp".parse()?;
    let (gen_volume, result) =
      compile_source(self.runtime.clone(), &self.files, &gen_lang, &cpp).await?;
    let res = self.run_generator(&gen_volume, &gen_lang, result).await;
    gen_volume.remove().await;
    return res;
  }

  async fn run_generator(
    &mut self,
    gen_volume: &Volume,
    gen_lang: &LangCfg,
    compiled: TaskResult,
  ) -> Result<Option<Vec<u8>>, Error> {
    if compiled.exit_code != 0 {
      self.h.status = Status::Fail;
      self.h.stderr = compiled.stderr;
      self.update_hack()?;
      return Ok(None);
    }

    let run = gen_volume
      .run(gen_lang.run_cmd(), None, &Limits::compile())
      .await?;
    if run.exit_code != 0 || run.tle || run.oom {
      self.h.status = Status::Fail;
      self.h.stderr = clip(run.stderr, STORED_OUTPUT_CAP);
      self.update_hack()?;
      return Ok(None);
    }

    // Keep the generated bytes on the row so the case is reproducible.
    self.h.test_case_txt = Some(run.stdout.clone());
    self.update_hack()?;
    return Ok(Some(run.stdout));
  }

  async fn run_case(
    &mut self,
    checker_volume: &Volume,
    source_volume: &Volume,
    input: &[u8],
  ) -> Result<(), Error> {
    log::info!("run hack case");
    let dir = tempfile::tempdir()?;
    let in_file = dir.path().join("hack.in");
    std::fs::write(&in_file, input)?;

    let time_limit = self
      .info
      .time_limit()
      .mul_f64(CONFIG.judge.timeout_multiplier);
    let result = run_test_case(
      source_volume,
      checker_volume,
      &self.lang,
      time_limit,
      &in_file,
      None,
    )
    .await?;

    self.h.status = result.status;
    self.h.time = result.time.as_millis() as i64;
    self.h.memory = result.memory;
    self.h.stderr = result.stderr;
    self.h.judge_output = result.checker_out;
    return self.update_hack();
  }

  fn update_hack(&mut self) -> Result<(), Error> {
    self.task.touch_if_needed()?;
    self.db.update_hack(&self.h)?;
    return Ok(());
  }
}
