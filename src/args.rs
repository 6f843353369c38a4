use clap::Parser;
use shadow_rs::shadow;

shadow!(build);

// Command line args
#[derive(Parser, Default)]
#[clap(version = build::CLAP_LONG_VERSION)]
#[clap(about = "Judge worker of the arbiter online judge.", long_about = None)]
pub struct Args {
  #[clap(short, long, value_parser)]
  pub config_search_path: Vec<String>,

  /// Drain at most one leased task and exit instead of looping.
  #[clap(long)]
  pub oneshot: bool,
}
