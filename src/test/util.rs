use std::{
  collections::VecDeque,
  path::Path,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
  },
  time,
};

use async_trait::async_trait;

use crate::{
  db::{self, Db},
  sandbox::{Error, Limits, Runtime, TaskResult},
};

/// Scripted sandbox backend for pipeline tests.
///
/// Commands are classified by their argv and served from per-class queues:
/// compiler invocations, checker runs and program runs. Running an
/// unscripted command panics, which pins down the exact call sequence.
pub struct MockRuntime {
  compiles: Mutex<VecDeque<TaskResult>>,
  runs: Mutex<VecDeque<TaskResult>>,
  checks: Mutex<VecDeque<TaskResult>>,
  created: AtomicUsize,
  removed: AtomicUsize,
}

impl MockRuntime {
  pub fn new() -> Arc<Self> {
    return Arc::new(Self {
      compiles: Mutex::new(VecDeque::new()),
      runs: Mutex::new(VecDeque::new()),
      checks: Mutex::new(VecDeque::new()),
      created: AtomicUsize::new(0),
      removed: AtomicUsize::new(0),
    });
  }

  pub fn push_compile(&self, result: TaskResult) {
    self.compiles.lock().unwrap().push_back(result);
  }

  pub fn push_run(&self, result: TaskResult) {
    self.runs.lock().unwrap().push_back(result);
  }

  pub fn push_check(&self, result: TaskResult) {
    self.checks.lock().unwrap().push_back(result);
  }

  pub fn created(&self) -> usize {
    return self.created.load(Ordering::SeqCst);
  }

  pub fn removed(&self) -> usize {
    return self.removed.load(Ordering::SeqCst);
  }
}

#[async_trait]
impl Runtime for MockRuntime {
  async fn volume_create(&self) -> Result<String, Error> {
    let n = self.created.fetch_add(1, Ordering::SeqCst);
    return Ok(format!("vol-{}", n));
  }

  async fn volume_copy_in(&self, _volume: &str, _host: &Path, _guest: &str) -> Result<(), Error> {
    return Ok(());
  }

  async fn volume_read(&self, _volume: &str, guest: &str) -> Result<Vec<u8>, Error> {
    return Err(Error::NotFound(guest.to_string()));
  }

  async fn volume_remove(&self, _volume: &str) -> Result<(), Error> {
    self.removed.fetch_add(1, Ordering::SeqCst);
    return Ok(());
  }

  async fn run(
    &self,
    _volume: &str,
    cmd: &[String],
    _stdin: Option<&Path>,
    _limits: &Limits,
  ) -> Result<TaskResult, Error> {
    let queue = if cmd.iter().any(|arg| arg == "g++" || arg == "gcc") {
      &self.compiles
    } else if cmd[0].contains("checker") {
      &self.checks
    } else {
      &self.runs
    };
    return Ok(
      queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| panic!("unscripted sandbox command: {:?}", cmd)),
    );
  }
}

pub fn ms(n: u64) -> time::Duration {
  return time::Duration::from_millis(n);
}

/// Successful execution with a small, fixed footprint.
pub fn ok_result() -> TaskResult {
  return TaskResult {
    exit_code: 0,
    stdout: vec![],
    stderr: vec![],
    wall_time: ms(10),
    cpu_time: ms(10),
    memory: 256,
    tle: false,
    oom: false,
  };
}

pub fn result_with_stdout(stdout: &[u8], cpu: time::Duration, memory: i64) -> TaskResult {
  return TaskResult {
    stdout: stdout.to_vec(),
    cpu_time: cpu,
    wall_time: cpu,
    memory,
    ..ok_result()
  };
}

pub fn failed_result(exit_code: i32, stderr: &[u8]) -> TaskResult {
  return TaskResult {
    exit_code,
    stderr: stderr.to_vec(),
    ..ok_result()
  };
}

pub fn tle_result(cpu: time::Duration) -> TaskResult {
  return TaskResult {
    exit_code: -1,
    cpu_time: cpu,
    wall_time: cpu,
    tle: true,
    ..ok_result()
  };
}

pub fn oom_result() -> TaskResult {
  return TaskResult {
    exit_code: -1,
    memory: 1024 * 1024,
    oom: true,
    ..ok_result()
  };
}

pub fn test_db() -> Arc<Db> {
  return Arc::new(Db::open_in_memory().unwrap());
}

/// The `aplusb` fixture problem every test reuses.
pub fn create_dummy_problem(db: &Db) {
  db.save_problem(&db::Problem {
    name: "aplusb".to_string(),
    version: "v1".to_string(),
    testcases_version: "t1".to_string(),
    time_limit_ms: 2000,
  })
  .unwrap();
}

pub fn dummy_submission(user: Option<&str>, max_time: i64) -> db::Submission {
  return db::Submission {
    problem_name: "aplusb".to_string(),
    user_name: user.map(str::to_string),
    lang: "cpp".to_string(),
    source: "source".to_string(),
    max_time,
    ..Default::default()
  };
}

/// Write a bundle for `aplusb` under `root/aplusb/v1/t1` with `number`
/// cases named `example_*`.
pub fn write_bundle(root: &Path, number: usize) {
  let dir = root.join("aplusb").join("v1").join("t1");
  std::fs::create_dir_all(dir.join("in")).unwrap();
  std::fs::create_dir_all(dir.join("out")).unwrap();
  std::fs::write(
    dir.join("info.toml"),
    format!(
      "timelimit = 2.0\n\n[[tests]]\nname = \"example.in\"\nnumber = {}\n",
      number
    ),
  )
  .unwrap();
  for i in 0..number {
    std::fs::write(dir.join("in").join(format!("example_{:02}.in", i)), "1 2\n").unwrap();
    std::fs::write(dir.join("out").join(format!("example_{:02}.out", i)), "3\n").unwrap();
  }
  std::fs::write(dir.join("checker.cpp"), "// token compare checker\n").unwrap();
}
