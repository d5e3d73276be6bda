mod cli;
mod events;
mod run;

use clap::Parser;
use tracing_subscriber::{EnvFilter, filter::Directive};

fn main() {
    let opts = cli::Options::parse();

    let log_filter = EnvFilter::builder()
        .with_default_directive(Directive::from(opts.log_level))
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    if let Err(err) = run::replay(&opts) {
        tracing::error!("{err:?}");
        std::process::exit(1);
    }
}
