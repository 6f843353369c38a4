use serde::{Deserialize, Serialize};
use std::{collections::HashSet, time};

use crate::{lang::LangCfg, ARGS};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
/// Judge worker config.
pub struct Cfg {
  /// Database connection string.
  ///
  /// A filesystem path for the worker, or `:memory:` for tests.
  pub database_url: String,

  /// Directory holding fetched problem bundles.
  pub cache_dir: String,

  /// Root directory the default artifact source downloads from.
  pub storage_root: String,

  pub lang: HashSet<LangCfg>,

  pub judge: JudgeCfg,
}

impl Default for Cfg {
  // Set default values for config
  fn default() -> Self {
    return Self {
      database_url: "./judge.db".to_string(),
      cache_dir: "./cache/problems".to_string(),
      storage_root: "./problems".to_string(),
      lang: HashSet::from([
        LangCfg::new(
          "cpp",
          "main.cpp",
          &[
            "g++",
            "-O2",
            "-std=c++20",
            "-DONLINE_JUDGE",
            "-I./include",
            "-o",
            "main",
            "main.cpp",
          ],
          &["./main"],
        ),
        LangCfg::new(
          "c",
          "main.c",
          &[
            "gcc",
            "-O2",
            "-std=c17",
            "-DONLINE_JUDGE",
            "-I./include",
            "-o",
            "main",
            "main.c",
          ],
          &["./main"],
        ),
        // Fixed language for checkers and hack generators.
        LangCfg::new(
          "checker",
          "checker.cpp",
          &[
            "g++",
            "-O2",
            "-std=c++20",
            "-I./include",
            "-o",
            "checker",
            "checker.cpp",
          ],
          &["./checker"],
        ),
      ]),
      judge: JudgeCfg {
        image: "arbiter-judge-image".to_string(),
        timeout_multiplier: 1.0,
        env: vec![
          "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string(),
          "ONLINE_JUDGE=arbiter".to_string(),
        ],
        compile_time_limit: time::Duration::from_secs(30),
        memory_limit: 1024 * 1024 * 1024, // 1 GiB
        process_limit: 16,
        stdout_limit: 64 * 1024 * 1024, // 64 MiB
        stderr_limit: 16 * 1024,        // 16 KiB
        lease_interval: time::Duration::from_secs(60),
      },
    };
  }
}

/// Judge config.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JudgeCfg {
  /// Base sandbox image.
  pub image: String,

  /// Multiplier applied to every per-problem time limit.
  pub timeout_multiplier: f64,

  /// Environment variables inside the sandbox.
  pub env: Vec<String>,

  /// Time limit for compiling checkers, generators and user sources.
  pub compile_time_limit: time::Duration,

  /// Memory limit for sandboxed commands, in bytes.
  pub memory_limit: u64,

  /// Process count limit.
  pub process_limit: u64,

  /// Stdout capture limit, in bytes.
  pub stdout_limit: u64,

  /// Stderr capture limit, in bytes.
  pub stderr_limit: u64,

  /// Task lease length. A worker touches its lease after half of this.
  pub lease_interval: time::Duration,
}

impl Cfg {
  /// Create and load the config.
  pub fn load(search_paths: &Vec<String>) -> Self {
    let mut builder = config::Config::builder()
      .add_source(config::File::with_name("/etc/arbiter/judge").required(false));

    for p in search_paths {
      builder = builder.add_source(config::File::with_name(p.as_str()).required(false));
    }

    builder = builder.add_source(config::Environment::with_prefix("JUDGE"));

    let mut cfg = builder.build().unwrap().try_deserialize::<Self>().unwrap();

    // Flat environment names from the deployment contract.
    if let Ok(url) = std::env::var("DATABASE_URL") {
      cfg.database_url = url;
    }
    if let Ok(image) = std::env::var("JUDGE_IMAGE") {
      cfg.judge.image = image;
    }
    if let Ok(mult) = std::env::var("JUDGE_TIMEOUT_MULTIPLIER") {
      cfg.judge.timeout_multiplier = mult.parse().unwrap();
    }

    return cfg;
  }
}

lazy_static! {
  /// Global config.
  pub static ref CONFIG: Cfg = Cfg::load(&ARGS.config_search_path);
}
