mod info;

pub use info::{Info, TestEntry};

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::CONFIG;

/// Key of a problem bundle in blob storage.
///
/// All three components take part in cache addressing; bundles of different
/// versions coexist in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
  pub name: String,
  pub version: String,
  pub testcase_version: String,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("storage i/o error")]
  Io(#[from] std::io::Error),

  #[error("invalid info.toml: {0}")]
  Info(#[from] toml::de::Error),

  #[error("invalid bundle key component: {0}")]
  InvalidKey(String),

  #[error("artifact download failed: {0}")]
  Download(String),
}

/// Narrow interface to the problem-artifact blob store.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
  /// Download the bundle for `problem` into `dest`.
  async fn download(&self, problem: &Problem, dest: &Path) -> Result<(), Error>;
}

/// Artifact source reading bundles from a local directory tree.
///
/// Layout: `<root>/<name>/<version>/<testcase_version>/{info.toml,
/// checker.cpp, include/, in/, out/}`.
pub struct DirSource {
  root: PathBuf,
}

impl DirSource {
  pub fn new(root: &Path) -> Self {
    return Self {
      root: root.to_path_buf(),
    };
  }

  pub fn from_global_config() -> Self {
    return Self::new(Path::new(&CONFIG.storage_root));
  }
}

#[async_trait]
impl ArtifactSource for DirSource {
  async fn download(&self, problem: &Problem, dest: &Path) -> Result<(), Error> {
    let src = self
      .root
      .join(&problem.name)
      .join(&problem.version)
      .join(&problem.testcase_version);
    if !src.is_dir() {
      return Err(Error::Download(format!(
        "no bundle at {}",
        src.to_string_lossy()
      )));
    }
    copy_tree(&src, dest)?;
    return Ok(());
  }
}

fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
  std::fs::create_dir_all(dst)?;
  for entry in std::fs::read_dir(src)? {
    let entry = entry?;
    let to = dst.join(entry.file_name());
    if entry.file_type()?.is_dir() {
      copy_tree(&entry.path(), &to)?;
    } else {
      std::fs::copy(entry.path(), &to)?;
    }
  }
  return Ok(());
}

/// Downloads problem bundles through an [`ArtifactSource`] and caches them
/// on disk, addressed by the full `(name, version, testcase_version)` key.
pub struct Fetcher {
  cache_dir: PathBuf,
  source: Arc<dyn ArtifactSource>,
}

/// Marker file that commits a finished download. A crashed fetch leaves the
/// directory without it and is re-downloaded.
const COMPLETE_MARKER: &str = ".complete";

impl Fetcher {
  pub fn new(cache_dir: &Path, source: Arc<dyn ArtifactSource>) -> Self {
    return Self {
      cache_dir: cache_dir.to_path_buf(),
      source,
    };
  }

  pub fn from_global_config(source: Arc<dyn ArtifactSource>) -> Self {
    return Self::new(Path::new(&CONFIG.cache_dir), source);
  }

  pub async fn fetch(&self, problem: &Problem) -> Result<ProblemFiles, Error> {
    let dir = self
      .cache_dir
      .join(key_component(&problem.name)?)
      .join(key_component(&problem.version)?)
      .join(key_component(&problem.testcase_version)?);
    let marker = dir.join(COMPLETE_MARKER);

    if marker.is_file() {
      log::debug!("bundle cache hit: {:?}", problem);
    } else {
      if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
      }
      std::fs::create_dir_all(&dir)?;
      self.source.download(problem, &dir).await?;
      std::fs::write(&marker, b"")?;
    }

    return Ok(ProblemFiles {
      base: dir,
      problem: problem.clone(),
    });
  }
}

fn key_component(s: &str) -> Result<&str, Error> {
  if s.is_empty() || s == "." || s == ".." || s.contains(['/', '\\']) {
    return Err(Error::InvalidKey(s.to_string()));
  }
  return Ok(s);
}

/// A fetched problem bundle on disk.
#[derive(Debug, Clone)]
pub struct ProblemFiles {
  base: PathBuf,
  pub problem: Problem,
}

impl ProblemFiles {
  /// Wrap an already materialized bundle directory.
  pub fn new(base: &Path, problem: Problem) -> Self {
    return Self {
      base: base.to_path_buf(),
      problem,
    };
  }

  pub fn info_toml_path(&self) -> PathBuf {
    return self.base.join("info.toml");
  }

  pub fn in_file_path(&self, name: &str) -> PathBuf {
    return self.base.join("in").join(format!("{}.in", name));
  }

  pub fn out_file_path(&self, name: &str) -> PathBuf {
    return self.base.join("out").join(format!("{}.out", name));
  }

  /// Path of the checker source the bundle's `info.toml` declares.
  pub fn checker_path(&self, info: &Info) -> PathBuf {
    return self.base.join(&info.checker);
  }

  pub fn include_dir(&self) -> PathBuf {
    return self.base.join("include");
  }
}
