mod cli;
mod config;
mod model;
mod onboard;
mod reconcile;
mod storage;

use std::{io, process};

use tracing_subscriber::EnvFilter;

use config::Config;

fn main() {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    });

    init_logging(&config);

    if let Err(e) = cli::run(&config) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Logs go to stderr; stdout carries command output. `RUST_LOG` takes
/// precedence over the config file's `log` key.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();
}
