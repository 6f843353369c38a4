use serde::{Deserialize, Serialize};
use std::{
  borrow::Borrow,
  fmt::Display,
  hash::{Hash, Hasher},
  str::FromStr,
};
use thiserror::Error;

use crate::CONFIG;

/// Programming language config.
///
/// The registry itself lives in `CONFIG.lang`; a `LangCfg` is obtained by
/// parsing a language tag with [`FromStr`].
#[derive(Debug, Serialize, Deserialize, Clone, Eq)]
pub struct LangCfg {
  name: String,

  compile_cmd: Vec<String>,

  run_cmd: Vec<String>,

  /// Name of the source file inside the sandbox.
  source: String,
}

impl LangCfg {
  pub fn new(name: &str, source: &str, compile_cmd: &[&str], run_cmd: &[&str]) -> Self {
    return Self {
      name: name.to_string(),
      source: source.to_string(),
      compile_cmd: compile_cmd.iter().map(|&s| s.to_string()).collect(),
      run_cmd: run_cmd.iter().map(|&s| s.to_string()).collect(),
    };
  }

  pub fn name(&self) -> &str {
    return &self.name;
  }

  pub fn compile_cmd(&self) -> &Vec<String> {
    return &self.compile_cmd;
  }

  pub fn run_cmd(&self) -> &Vec<String> {
    return &self.run_cmd;
  }

  pub fn source(&self) -> &str {
    return &self.source;
  }
}

impl PartialEq for LangCfg {
  fn eq(&self, other: &LangCfg) -> bool {
    self.name == other.name
  }
}

impl Hash for LangCfg {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.name.hash(state);
  }
}

impl Borrow<str> for LangCfg {
  fn borrow(&self) -> &str {
    &self.name
  }
}

/// Error when parsing a language name which not in global settings.
#[derive(Error, Debug, Clone)]
#[error("invalid lang: {lang}")]
pub struct InvalidLangError {
  pub lang: String,
}

impl FromStr for LangCfg {
  type Err = InvalidLangError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match CONFIG.lang.get(s) {
      Some(x) => Ok(x.clone()),
      None => Err(Self::Err {
        lang: s.to_string(),
      }),
    }
  }
}

impl Display for LangCfg {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", &self.name)
  }
}
