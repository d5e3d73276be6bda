use std::path::PathBuf;

use clap::Parser;
use tracing::Level;
use zktracer_hub::Fork;

pub const VERSION_STRING: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(
    name = "zktracer-replay",
    author,
    version = VERSION_STRING,
    about = "Replays a recorded EVM event stream through the Hub and reports its row counts.",
    long_about = None
)]
pub struct Options {
    #[arg(
        long,
        env = "ZKTRACER_INPUT",
        value_name = "PATH",
        help = "JSON file holding the recorded events, in the order the engine emitted them."
    )]
    pub input: PathBuf,
    #[arg(
        long,
        default_value_t = Fork::Cancun,
        value_parser = clap::value_parser!(Fork),
        help = "Fork whose rules apply. Supported: cancun, prague, osaka."
    )]
    pub fork: Fork,
    #[arg(
        long,
        value_name = "PATH",
        help = "Writes every materialized row to this file, one JSON object per line."
    )]
    pub rows: Option<PathBuf>,
    #[arg(long = "log-level", default_value_t = Level::INFO, value_name = "LOG_LEVEL")]
    pub log_level: Level,
}
