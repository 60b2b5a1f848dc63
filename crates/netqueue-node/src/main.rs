//! netqueue node
//!
//! One binary for every position in a queue tree:
//!
//! ```bash
//! netqueue-node server --port 8080
//! netqueue-node dispatch --parent-port 8080 --port 8081
//! netqueue-node client --port 8081
//! ```
//!
//! Set `RUST_LOG` to adjust logging; the default is `info`.

mod cli;
mod roles;

use std::{
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    if let Err(err) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!(error = %err, "Ctrl-C handler not installed");
    }

    match roles::run(cli, &stop) {
        Ok(()) => {
            info!("stopped");
            ExitCode::SUCCESS
        },
        Err(err) => {
            error!(error = %err, "node failed");
            ExitCode::FAILURE
        },
    }
}
