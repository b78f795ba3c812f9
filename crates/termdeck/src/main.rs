//! termdeck: play every audio file in a directory, controlled by single keys.
//!
//! The foreground loop reads keys in raw mode and drives a
//! `termdeck_engine::engine::Player`, which decodes with Symphonia and plays
//! through CPAL on its own renderer thread.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use termdeck::cli::Args;
use termdeck::config::PlayerConfig;
use termdeck::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_file.as_deref())?;

    if args.list_devices {
        return runtime::list_devices();
    }

    let config = PlayerConfig::from_args(&args)?;
    runtime::run(config)
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,termdeck=info,termdeck_engine=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log_file {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("create log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}
