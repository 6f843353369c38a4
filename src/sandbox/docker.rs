use std::{path::Path, process::Stdio, time};

use async_trait::async_trait;
use tokio::{fs::File, process::Command};
use uuid::Uuid;

use super::{clip, Error, Limits, Runtime, TaskResult};
use crate::CONFIG;

const WORKDIR: &str = "/workdir";

/// Rusage record written inside the volume by the run wrapper.
const RUSAGE_FILE: &str = ".rusage";

/// Sandbox backend driving the local Docker daemon through its CLI.
///
/// Each [`super::Volume`] is a named Docker volume; commands run in a
/// throwaway container with the volume mounted as the working directory and
/// the network disabled.
pub struct DockerRuntime {
  image: String,
}

impl DockerRuntime {
  pub fn new(image: &str) -> Self {
    return Self {
      image: image.to_string(),
    };
  }

  pub fn from_global_config() -> Self {
    return Self::new(&CONFIG.judge.image);
  }

  /// Run a docker CLI command and return its trimmed stdout.
  async fn docker(&self, args: &[&str]) -> Result<String, Error> {
    let out = Command::new("docker")
      .args(args)
      .stdin(Stdio::null())
      .output()
      .await?;
    if !out.status.success() {
      return Err(Error::Runtime(format!(
        "docker {} failed: {}",
        args.first().copied().unwrap_or(""),
        String::from_utf8_lossy(&out.stderr).trim()
      )));
    }
    return Ok(String::from_utf8_lossy(&out.stdout).trim().to_string());
  }

  /// Create a stopped helper container with the volume mounted, for `docker cp`.
  async fn helper_container(&self, volume: &str) -> Result<String, Error> {
    return self
      .docker(&[
        "container",
        "create",
        "-v",
        &format!("{}:{}", volume, WORKDIR),
        &self.image,
        "/bin/true",
      ])
      .await;
  }
}

#[async_trait]
impl Runtime for DockerRuntime {
  async fn volume_create(&self) -> Result<String, Error> {
    let name = format!("judge-{}", Uuid::new_v4());
    self.docker(&["volume", "create", &name]).await?;
    return Ok(name);
  }

  async fn volume_copy_in(&self, volume: &str, host: &Path, guest: &str) -> Result<(), Error> {
    let cid = self.helper_container(volume).await?;
    let res = self
      .docker(&[
        "cp",
        &host.to_string_lossy(),
        &format!("{}:{}/{}", cid, WORKDIR, guest),
      ])
      .await;
    let _ = self.docker(&["rm", "-f", &cid]).await;
    res?;
    return Ok(());
  }

  async fn volume_read(&self, volume: &str, guest: &str) -> Result<Vec<u8>, Error> {
    let cid = self.helper_container(volume).await?;
    let dir = tempfile::tempdir()?;
    let dst = dir.path().join("out");
    let res = self
      .docker(&[
        "cp",
        &format!("{}:{}/{}", cid, WORKDIR, guest),
        &dst.to_string_lossy(),
      ])
      .await;
    let _ = self.docker(&["rm", "-f", &cid]).await;
    if res.is_err() {
      return Err(Error::NotFound(guest.to_string()));
    }
    return Ok(tokio::fs::read(&dst).await?);
  }

  async fn volume_remove(&self, volume: &str) -> Result<(), Error> {
    self.docker(&["volume", "rm", "-f", volume]).await?;
    return Ok(());
  }

  async fn run(
    &self,
    volume: &str,
    cmd: &[String],
    stdin: Option<&Path>,
    limits: &Limits,
  ) -> Result<TaskResult, Error> {
    // CPU ceiling one second above the limit: the flag is computed from the
    // measured CPU time, the hard kill only stops runaways.
    let cpu_cap = limits.cpu.as_secs_f64().ceil() as u64 + 1;
    let script = format!(
      "ulimit -t {}; exec /usr/bin/time -q -f '%U %S %M' -o {}/{} \"$@\"",
      cpu_cap, WORKDIR, RUSAGE_FILE,
    );

    let memory = limits.memory.to_string();
    let pids = limits.pids.to_string();
    let mut args: Vec<String> = [
      "container",
      "create",
      "-i",
      "--network",
      "none",
      "-w",
      WORKDIR,
      "-v",
      &format!("{}:{}", volume, WORKDIR),
      "--memory",
      &memory,
      "--memory-swap",
      &memory,
      "--pids-limit",
      &pids,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for env in &CONFIG.judge.env {
      args.push("-e".to_string());
      args.push(env.clone());
    }
    args.extend([
      self.image.clone(),
      "sh".to_string(),
      "-c".to_string(),
      script,
      "sh".to_string(),
    ]);
    args.extend(cmd.iter().cloned());

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let cid = self.docker(&arg_refs).await?;

    let mut start = Command::new("docker");
    start
      .args(["start", "-a", "-i", &cid])
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    match stdin {
      Some(path) => {
        start.stdin(File::open(path).await?.into_std().await);
      }
      None => {
        start.stdin(Stdio::null());
      }
    }

    let began = time::Instant::now();
    let child = start.spawn()?;
    let waited = tokio::time::timeout(limits.wall, child.wait_with_output()).await;
    let wall_time = began.elapsed();

    let mut result = TaskResult {
      exit_code: -1,
      stdout: vec![],
      stderr: vec![],
      wall_time,
      cpu_time: wall_time,
      memory: -1,
      tle: false,
      oom: false,
    };

    match waited {
      Ok(out) => {
        let out = out?;
        result.stdout = clip(out.stdout, limits.stdout);
        result.stderr = clip(out.stderr, limits.stderr);
      }
      Err(_) => {
        // Wall limit hit: kill the container, discard its output.
        let _ = self.docker(&["kill", &cid]).await;
        result.tle = true;
      }
    }

    result.exit_code = self
      .docker(&["inspect", "-f", "{{.State.ExitCode}}", &cid])
      .await?
      .parse()
      .unwrap_or(-1);
    result.oom = self
      .docker(&["inspect", "-f", "{{.State.OOMKilled}}", &cid])
      .await?
      == "true";
    let _ = self.docker(&["rm", "-f", &cid]).await;

    if let Ok(rusage) = self.volume_read(volume, RUSAGE_FILE).await {
      let text = String::from_utf8_lossy(&rusage);
      let mut fields = text.split_whitespace();
      if let (Some(user), Some(sys), Some(rss)) = (fields.next(), fields.next(), fields.next()) {
        if let (Ok(user), Ok(sys)) = (user.parse::<f64>(), sys.parse::<f64>()) {
          result.cpu_time = time::Duration::from_secs_f64(user + sys);
        }
        result.memory = rss.parse().unwrap_or(-1);
      }
    }

    if result.cpu_time > limits.cpu {
      result.tle = true;
    }

    return Ok(result);
  }
}
