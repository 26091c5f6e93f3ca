// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command execution.
//!
//! Every external tool nixdot touches is invoked through [`Runner`], which
//! makes it the one place where the dry-run flag and privilege elevation
//! are applied. Command procedures build [`Invocation`] values and hand
//! them over; no call site spawns a process on its own. That structure is
//! what makes the dry-run promise hold for every verb instead of most of
//! them.

use std::{
    ffi::OsString,
    fmt::{Display, Formatter, Result as FmtResult},
    process::Command,
};
use tracing::debug;

/// Privilege elevation wrapper prefixed onto elevated invocations.
pub const SUDO: &str = "sudo";

/// A single external tool invocation.
///
/// Elevation is a request recorded on the invocation. The runner only
/// prefixes [`SUDO`] when the current user is not already root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    elevate: bool,
}

impl Invocation {
    /// Construct new invocation of target program.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            elevate: false,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a listing of arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Request privilege elevation for this invocation.
    pub fn elevated(mut self) -> Self {
        self.elevate = true;
        self
    }

    /// Whether privilege elevation was requested.
    pub fn is_elevated(&self) -> bool {
        self.elevate
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Program and argument list as actually executed.
    fn command_line(&self) -> (OsString, Vec<OsString>) {
        if self.elevate && !is_root() {
            let mut args = vec![self.program.clone()];
            args.extend(self.args.iter().cloned());
            (OsString::from(SUDO), args)
        } else {
            (self.program.clone(), self.args.clone())
        }
    }
}

impl Display for Invocation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        if self.elevate {
            write!(fmt, "{SUDO} ")?;
        }
        write!(fmt, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(fmt, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Blocking executor for external invocations.
#[derive(Debug, Default, Clone, Copy)]
pub struct Runner {
    dry_run: bool,
}

impl Runner {
    /// Construct new runner.
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Whether this runner prints invocations instead of executing them.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run invocation interactively, inheriting stdio.
    ///
    /// Blocks until the child exits. Under dry-run the invocation is
    /// printed instead of executed.
    ///
    /// # Errors
    ///
    /// - Return [`RunnerError::Spawn`] if the program cannot be started.
    /// - Return [`RunnerError::CommandFailed`] if the child exits non-zero.
    pub fn status(&self, invocation: &Invocation) -> Result<()> {
        if self.dry_run {
            println!("{invocation}");
            return Ok(());
        }

        debug!("run: {invocation}");
        let (program, args) = invocation.command_line();
        let status = Command::new(&program)
            .args(args)
            .spawn()
            .map_err(|err| RunnerError::Spawn {
                source: err,
                program: invocation.program_name(),
            })?
            .wait()
            .map_err(|err| RunnerError::Spawn {
                source: err,
                program: invocation.program_name(),
            })?;

        if !status.success() {
            return Err(RunnerError::CommandFailed {
                program: invocation.program_name(),
                code: status.code(),
                message: String::new(),
            });
        }

        Ok(())
    }

    /// Run invocation silently, capturing its stdout.
    ///
    /// Under dry-run the invocation is printed instead of executed, and the
    /// captured output is empty.
    ///
    /// # Errors
    ///
    /// - Return [`RunnerError::Spawn`] if the program cannot be started.
    /// - Return [`RunnerError::CommandFailed`] if the child exits non-zero.
    pub fn capture(&self, invocation: &Invocation) -> Result<String> {
        if self.dry_run {
            println!("{invocation}");
            return Ok(String::new());
        }

        debug!("capture: {invocation}");
        let (program, args) = invocation.command_line();
        let output = Command::new(&program)
            .args(args)
            .output()
            .map_err(|err| RunnerError::Spawn {
                source: err,
                program: invocation.program_name(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
            let message = match chomp(stderr.as_str()) {
                detail if detail.is_empty() => String::new(),
                detail => format!(":\n{detail}"),
            };

            return Err(RunnerError::CommandFailed {
                program: invocation.program_name(),
                code: output.status.code(),
                message,
            });
        }

        let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
        Ok(chomp(stdout.as_str()).to_string())
    }
}

/// Check whether the effective user is already root.
///
/// Probes ownership of `/proc/self` rather than trusting environment
/// variables that elevation wrappers rewrite inconsistently.
pub fn is_root() -> bool {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata("/proc/self")
        .map(|meta| meta.uid() == 0)
        .unwrap_or(false)
}

// INVARIANT: Chomp trailing newlines.
fn chomp(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or(text.strip_suffix('\n'))
        .unwrap_or(text)
}

/// External command execution error types.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Program could not be started at all.
    #[error("failed to spawn {program:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: String,
    },

    /// Program ran but exited unsuccessfully.
    #[error("command {program:?} failed{message}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        message: String,
    },
}

impl RunnerError {
    /// Process exit code this error should surface as.
    ///
    /// A failing subprocess propagates its own exit code. Everything else,
    /// including signal death, collapses to 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CommandFailed { code, .. } => code.unwrap_or(1),
            Self::Spawn { .. } => 1,
        }
    }
}

/// Friendly result alias :3
type Result<T, E = RunnerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn missing_program() -> Invocation {
        Invocation::new("nixdot-test-program-that-does-not-exist")
    }

    #[test]
    fn dry_run_executes_nothing() -> anyhow::Result<()> {
        let runner = Runner::new(true);

        // Would fail to spawn if the runner actually executed anything.
        runner.status(&missing_program())?;
        let captured = runner.capture(&missing_program())?;
        assert_eq!(captured, "");

        Ok(())
    }

    #[test]
    fn capture_chomps_trailing_newline() -> anyhow::Result<()> {
        let runner = Runner::new(false);
        let output = runner.capture(&Invocation::new("echo").arg("hello"))?;
        assert_eq!(output, "hello");
        Ok(())
    }

    #[test]
    fn failing_child_reports_its_exit_code() {
        let runner = Runner::new(false);
        let result = runner.status(&Invocation::new("false"));
        match result {
            Err(error @ RunnerError::CommandFailed { .. }) => assert_eq!(error.exit_code(), 1),
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let runner = Runner::new(false);
        let result = runner.status(&missing_program());
        assert!(matches!(result, Err(RunnerError::Spawn { .. })));
    }

    #[test]
    fn elevation_shows_in_rendering() {
        let invocation = Invocation::new("nixos-rebuild")
            .args(["switch", "--flake", "/etc/dotfiles"])
            .elevated();

        assert!(invocation.is_elevated());
        assert_eq!(
            invocation.to_string(),
            "sudo nixos-rebuild switch --flake /etc/dotfiles"
        );
    }
}
