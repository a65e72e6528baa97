//! ## urverk-cli
//! **Batch runner for scenario files**
//!
//! `urverk run <scenario>` simulates to completion and exits non-zero on
//! any failure. `--write-output` additionally writes aggregated view
//! results; `--quiet`/`--verbose` select the log level.

use clap::Parser;

use urverk_telemetry::KernelLogger;

mod builtins;
mod commands;

use commands::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let level = match &cli.command {
        Commands::Run(args) => args.log_level(),
    };
    KernelLogger::init(level.as_deref());

    let outcome = match cli.command {
        Commands::Run(args) => commands::run(args),
    };
    match outcome {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}
