use std::{path::Path, time};

use serde::Deserialize;

/// Parsed `info.toml` problem descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct Info {
  /// Time limit in seconds.
  pub timelimit: f64,

  /// Checker source path, relative to the bundle root.
  #[serde(default = "default_checker")]
  pub checker: String,

  #[serde(default)]
  pub tests: Vec<TestEntry>,
}

fn default_checker() -> String {
  return "checker.cpp".to_string();
}

/// One `[[tests]]` group.
#[derive(Debug, Clone, Deserialize)]
pub struct TestEntry {
  pub name: String,
  pub number: usize,
}

impl Info {
  pub fn parse(path: &Path) -> Result<Self, super::Error> {
    let text = std::fs::read_to_string(path)?;
    return Ok(toml::from_str(&text)?);
  }

  /// Ordered testcase names.
  ///
  /// A group `{ name = "example.in", number = 2 }` expands to
  /// `example_00`, `example_01`.
  pub fn test_case_names(&self) -> Vec<String> {
    let mut names = vec![];
    for test in &self.tests {
      let stem = test.name.strip_suffix(".in").unwrap_or(&test.name);
      for i in 0..test.number {
        names.push(format!("{}_{:02}", stem, i));
      }
    }
    return names;
  }

  /// Per-problem time limit, before the worker's timeout multiplier.
  pub fn time_limit(&self) -> time::Duration {
    return time::Duration::from_secs_f64(self.timelimit);
  }
}
