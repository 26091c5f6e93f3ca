// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use nixdot::{CommandError, RunnerError};

use std::process::exit;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    let layer = fmt::layer().compact().with_target(false).without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry().with(layer).with(filter).init();

    if let Err(error) = nixdot::run() {
        error!("{error:?}");
        exit(exit_code(&error));
    }

    exit(0)
}

/// Map an error chain to a process exit code.
///
/// A failing subprocess surfaces its own exit code; every other failure
/// exits 1.
fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<CommandError>() {
        Some(CommandError::Runner(inner)) => inner.exit_code(),
        Some(_) => 1,
        None => match error.downcast_ref::<RunnerError>() {
            Some(inner) => inner.exit_code(),
            None => 1,
        },
    }
}
