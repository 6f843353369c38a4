mod docker;

pub use docker::DockerRuntime;

use std::{
  path::Path,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  time,
};

use async_trait::async_trait;
use thiserror::Error;

use crate::CONFIG;

/// Resource caps for a single sandboxed command.
#[derive(Debug, Clone)]
pub struct Limits {
  /// Wall clock limit, enforced from the host side.
  pub wall: time::Duration,

  /// CPU time limit, enforced inside the sandbox.
  pub cpu: time::Duration,

  /// Memory limit in bytes.
  pub memory: u64,

  /// Process count limit.
  pub pids: u64,

  /// Stdout capture limit in bytes. Longer output is truncated, not an error.
  pub stdout: u64,

  /// Stderr capture limit in bytes.
  pub stderr: u64,
}

impl Limits {
  /// Caps for compiling checkers, generators and user sources.
  pub fn compile() -> Self {
    let c = &CONFIG.judge;
    return Self {
      wall: c.compile_time_limit * 2,
      cpu: c.compile_time_limit,
      memory: c.memory_limit,
      pids: c.process_limit,
      stdout: c.stdout_limit,
      stderr: c.stderr_limit,
    };
  }

  /// Caps for running a program under a per-problem time limit.
  pub fn run(time_limit: time::Duration) -> Self {
    let c = &CONFIG.judge;
    return Self {
      wall: time_limit * 2,
      cpu: time_limit,
      memory: c.memory_limit,
      pids: c.process_limit,
      stdout: c.stdout_limit,
      stderr: c.stderr_limit,
    };
  }
}

/// Result of one sandboxed command.
#[derive(Debug, Clone)]
pub struct TaskResult {
  pub exit_code: i32,

  /// Captured stdout, truncated to the stdout cap.
  pub stdout: Vec<u8>,

  /// Captured stderr, truncated to the stderr cap.
  pub stderr: Vec<u8>,

  pub wall_time: time::Duration,

  pub cpu_time: time::Duration,

  /// Max resident set size in KiB, or -1 when no measurement was taken.
  pub memory: i64,

  /// The CPU or wall limit was the terminating cause.
  pub tle: bool,

  /// The memory limit was the terminating cause.
  pub oom: bool,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("sandbox i/o error")]
  Io(#[from] std::io::Error),

  #[error("sandbox command failed: {0}")]
  Runtime(String),

  #[error("missing file in volume: {0}")]
  NotFound(String),
}

/// Contract demanded of the container runtime.
///
/// The production implementation is [`DockerRuntime`]; tests script one.
#[async_trait]
pub trait Runtime: Send + Sync {
  /// Create a named ephemeral writable filesystem root.
  async fn volume_create(&self) -> Result<String, Error>;

  /// Copy a host file to `guest` (relative to the volume root).
  async fn volume_copy_in(&self, volume: &str, host: &Path, guest: &str) -> Result<(), Error>;

  /// Read a file from the volume.
  async fn volume_read(&self, volume: &str, guest: &str) -> Result<Vec<u8>, Error>;

  /// Destroy the volume. Must succeed for a volume that exists.
  async fn volume_remove(&self, volume: &str) -> Result<(), Error>;

  /// Execute a command with the volume as working directory.
  async fn run(
    &self,
    volume: &str,
    cmd: &[String],
    stdin: Option<&Path>,
    limits: &Limits,
  ) -> Result<TaskResult, Error>;
}

/// An isolated, disposable working directory for sandboxed commands.
///
/// No two live volumes share filesystem state. [`Volume::remove`] is
/// idempotent and must run on every pipeline exit path.
pub struct Volume {
  runtime: Arc<dyn Runtime>,
  name: String,
  removed: AtomicBool,
}

impl Volume {
  pub async fn new(runtime: Arc<dyn Runtime>) -> Result<Self, Error> {
    let name = runtime.volume_create().await?;
    return Ok(Self {
      runtime,
      name,
      removed: AtomicBool::new(false),
    });
  }

  pub fn name(&self) -> &str {
    return &self.name;
  }

  pub async fn copy_in(&self, host: &Path, guest: &str) -> Result<(), Error> {
    return self.runtime.volume_copy_in(&self.name, host, guest).await;
  }

  pub async fn read(&self, guest: &str) -> Result<Vec<u8>, Error> {
    return self.runtime.volume_read(&self.name, guest).await;
  }

  pub async fn run(
    &self,
    cmd: &[String],
    stdin: Option<&Path>,
    limits: &Limits,
  ) -> Result<TaskResult, Error> {
    return self.runtime.run(&self.name, cmd, stdin, limits).await;
  }

  /// Remove the volume. Safe to call more than once.
  pub async fn remove(&self) {
    if self.removed.swap(true, Ordering::SeqCst) {
      return;
    }
    if let Err(err) = self.runtime.volume_remove(&self.name).await {
      log::warn!("failed to remove volume {}: {}", self.name, err);
    }
  }
}

impl Drop for Volume {
  fn drop(&mut self) {
    if !self.removed.load(Ordering::SeqCst) {
      log::warn!("volume {} dropped without remove", self.name);
    }
  }
}

/// Truncate captured output to a byte cap.
pub(crate) fn clip(mut bytes: Vec<u8>, cap: u64) -> Vec<u8> {
  bytes.truncate(cap as usize);
  return bytes;
}
