#[cfg(test)]
mod test;

pub mod args;
pub mod db;
pub mod etc;
pub mod judge;
pub mod lang;
pub mod sandbox;
pub mod storage;
pub mod verdict;

pub use crate::etc::CONFIG;

#[macro_use]
extern crate lazy_static;
extern crate log;

#[cfg(not(test))]
lazy_static! {
  /// Parsed command line args.
  pub static ref ARGS: args::Args = <args::Args as clap::Parser>::parse();
}

#[cfg(test)]
lazy_static! {
  /// Test builds must not parse the harness argv.
  pub static ref ARGS: args::Args = args::Args::default();
}
