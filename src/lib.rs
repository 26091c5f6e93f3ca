// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Personal NixOS flake helper.
//!
//! Nixdot wraps the handful of external tools that day-to-day NixOS
//! maintenance actually consists of: rebuild in its various moods, flake
//! input updates, garbage collection, generation management, remote
//! deployment, and a swap utility that toggles store links into writable
//! copies and back. Everything external goes through one runner so that
//! dry-run mode means what it says.

#[cfg(not(unix))]
compile_error!("nixdot is Unix-only; build requires cfg(unix).");

pub mod cli;
pub mod commands;
pub mod config;
pub mod runner;
pub mod swap;
pub mod target;

pub use cli::Cli;
pub use commands::{CommandError, Context};
pub use config::Config;
pub use runner::{Invocation, Runner, RunnerError};
pub use swap::{SwapError, Swapper};
pub use target::{FlakeTarget, TargetError};

use anyhow::Result;
use clap::Parser;
use std::{env, ffi::OsString};

/// Entry point for the binary.
///
/// A leading legacy package-query flag short-circuits everything and
/// forwards the argument list to the legacy tool wholesale. Everything
/// else parses as a verb and dispatches.
pub fn run() -> Result<()> {
    let args: Vec<OsString> = env::args_os().skip(1).collect();
    if let Some(first) = args.first().and_then(|arg| arg.to_str()) {
        if commands::is_legacy_query_flag(first) {
            return Ok(commands::legacy_forward(&args)?);
        }
    }

    Cli::parse().run()
}
