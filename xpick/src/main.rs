// Copyright 2024 xpick Authors
// SPDX-License-Identifier: Apache-2.0

//! xpick CLI entry point
//!
//! Prints the picked color on stdout. Exits 0 when a color was picked or
//! the picker was quit, 1 on errors, interruption or an unbound key.

use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use log::{debug, LevelFilter};
use signal_hook::consts::{SIGINT, SIGTERM};
use simple_logger::SimpleLogger;

use xpick::config::{self, Config, ConfigError, Parsed};
use xpick::RunState;

fn main() -> ExitCode {
    let config = match Config::parse_from(std::env::args_os()) {
        Ok(Parsed::Run(config)) => config,
        Ok(Parsed::Help(text)) | Ok(Parsed::Version(text)) => {
            print!("{text}");
            return ExitCode::SUCCESS;
        }
        Err(ConfigError::Usage(message)) => {
            eprint!("{message}");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("xpick: {e}");
            eprintln!("{}", config::usage());
            return ExitCode::FAILURE;
        }
    };

    match run(&config) {
        Ok(RunState::Finished) => ExitCode::SUCCESS,
        Ok(state) => {
            debug!("Exiting with state {state:?}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("xpick: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> anyhow::Result<RunState> {
    // Initialize logging
    let log_level = if config.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    SimpleLogger::new()
        .with_level(log_level)
        .init()
        .context("Failed to initialize logging")?;

    debug!("Starting xpick with config: {config:?}");

    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop))
            .with_context(|| format!("Failed to register handler for signal {signal}"))?;
    }

    xpick::app::run(config, &stop).context("xpick failed")
}
