// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-verb command procedures.
//!
//! Each verb maps to exactly one invocation sequence built here and handed
//! to the [`Runner`]. Procedures stay thin: they resolve the flake target
//! when they need one, build invocation templates, and let the runner deal
//! with dry-run substitution and privilege elevation. Verbs that match no
//! known command fall through to an extension probe on `$PATH`.

pub mod generations;
pub mod push;

use crate::{
    config::Config,
    runner::{self, Invocation, Runner, RunnerError},
    swap::{InquireConfirm, SwapError, Swapper, STORE_PREFIX},
    target::{self, FlakeTarget, TargetError},
};

use std::{
    env,
    ffi::{OsStr, OsString},
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

/// System profile directory holding numbered generation links.
pub const SYSTEM_PROFILE: &str = "/nix/var/nix/profiles/system";

/// Entry point of the live system profile.
pub const CURRENT_SYSTEM: &str = "/run/current-system";

/// Runtime secret generations directory.
pub const SECRETS_DIR: &str = "/run/agenix.d";

/// Link naming the live secret generation.
pub const SECRETS_LINK: &str = "/run/agenix";

/// Executable name prefix probed for unknown verbs.
pub const EXTENSION_PREFIX: &str = "nixdot-";

/// Legacy package-query tool that leading query flags forward to.
pub const LEGACY_TOOL: &str = "nix-env";

/// Shared state threaded through every verb.
///
/// Carrying the runner and overrides in one place is what keeps the
/// dry-run flag from ever being consulted ad hoc at a call site.
#[derive(Debug)]
pub struct Context {
    pub runner: Runner,
    pub config: Config,
    pub flake_override: Option<PathBuf>,
    pub host_override: Option<String>,
}

impl Context {
    /// Resolve the flake target for verbs that need one.
    fn target(&self) -> Result<FlakeTarget> {
        Ok(target::resolve(self.flake_override.as_deref(), &self.config)?)
    }

    /// Host attribute to build, if any is known.
    fn host(&self) -> Option<&str> {
        self.host_override
            .as_deref()
            .or(self.config.settings.host.as_deref())
    }

    /// Flake reference with host attribute for rebuild-style verbs.
    fn flake_ref(&self) -> Result<OsString> {
        Ok(self.target()?.flake_ref(self.host()))
    }
}

/// Rebuild and switch into the configuration.
pub fn rebuild(ctx: &Context, args: &[String]) -> Result<()> {
    Ok(ctx
        .runner
        .status(&rebuild_invocation(&ctx.flake_ref()?, "switch", &[], args))?)
}

/// Quick-iteration rebuild: activate without a bootloader entry.
pub fn test(ctx: &Context, args: &[String]) -> Result<()> {
    Ok(ctx
        .runner
        .status(&rebuild_invocation(&ctx.flake_ref()?, "test", &["--fast"], args))?)
}

/// Switch back to the previous generation.
pub fn rollback(ctx: &Context) -> Result<()> {
    Ok(ctx
        .runner
        .status(&rebuild_invocation(&ctx.flake_ref()?, "switch", &["--rollback"], &[]))?)
}

/// Build a virtual machine running the configuration.
pub fn vm(ctx: &Context) -> Result<()> {
    Ok(ctx
        .runner
        .status(&rebuild_invocation(&ctx.flake_ref()?, "build-vm", &[], &[]))?)
}

/// Update flake inputs, either all of them or a named subset.
pub fn update(ctx: &Context, inputs: &[String]) -> Result<()> {
    Ok(ctx.runner.status(&update_invocation(&ctx.target()?, inputs))?)
}

/// Update all inputs, then rebuild and switch.
pub fn upgrade(ctx: &Context, args: &[String]) -> Result<()> {
    update(ctx, &[])?;
    rebuild(ctx, args)
}

/// Search nixpkgs for packages.
pub fn search(ctx: &Context, terms: &[String]) -> Result<()> {
    let invocation = Invocation::new("nix").args(["search", "nixpkgs"]).args(terms);
    Ok(ctx.runner.status(&invocation)?)
}

/// Show the flake's output layout.
pub fn show(ctx: &Context) -> Result<()> {
    let invocation = Invocation::new("nix")
        .args(["flake", "show"])
        .arg(ctx.target()?.to_os_string());
    Ok(ctx.runner.status(&invocation)?)
}

/// Evaluate the flake's checks.
pub fn check(ctx: &Context, args: &[String]) -> Result<()> {
    let invocation = Invocation::new("nix")
        .args(["flake", "check"])
        .arg(ctx.target()?.to_os_string())
        .args(args);
    Ok(ctx.runner.status(&invocation)?)
}

/// Collect garbage, with extra cleanup when already root.
///
/// The garbage collector itself runs as the invoking user. Only a root
/// invocation additionally removes stale runtime secret generations and
/// reactivates the system profile to prune old boot-loader entries.
#[instrument(skip(ctx), level = "debug")]
pub fn gc(ctx: &Context) -> Result<()> {
    ctx.runner
        .status(&Invocation::new("nix-collect-garbage").arg("-d"))?;

    if !runner::is_root() {
        return Ok(());
    }

    for stale in stale_secret_generations(Path::new(SECRETS_DIR), Path::new(SECRETS_LINK)) {
        ctx.runner
            .status(&Invocation::new("rm").arg("-rf").arg(stale))?;
    }

    let reactivate = format!("{SYSTEM_PROFILE}/bin/switch-to-configuration");
    Ok(ctx.runner.status(&Invocation::new(reactivate).arg("boot"))?)
}

/// Toggle paths between store links and writable copies.
pub fn swap(ctx: &Context, paths: &[PathBuf]) -> Result<()> {
    if ctx.runner.is_dry_run() {
        for path in paths {
            println!("swap {:?}", path.display());
        }
        return Ok(());
    }

    Swapper::new(STORE_PREFIX, InquireConfirm).swap_all(paths.iter().cloned())?;
    Ok(())
}

/// Print the effective configuration.
pub fn effective_config(ctx: &Context) -> Result<()> {
    print!("{}", ctx.config);
    Ok(())
}

/// Dispatch an unknown verb to an extension executable.
///
/// Probes `$PATH` for `nixdot-<verb>` and runs it with the remaining
/// arguments; its exit status becomes nixdot's own.
///
/// # Errors
///
/// - Return [`CommandError::UnknownCommand`] if no extension matches.
pub fn extension(ctx: &Context, argv: &[OsString]) -> Result<()> {
    let verb = argv
        .first()
        .map(|raw| raw.to_string_lossy().into_owned())
        .unwrap_or_default();

    let Some(executable) = find_extension(verb.as_str()) else {
        return Err(CommandError::UnknownCommand { verb });
    };

    info!("dispatching to extension {:?}", executable.display());
    Ok(ctx
        .runner
        .status(&Invocation::new(executable).args(argv[1..].iter().cloned()))?)
}

/// Forward the entire argument list to the legacy package-query tool.
pub fn legacy_forward(args: &[OsString]) -> Result<()> {
    Runner::new(false).status(&Invocation::new(LEGACY_TOOL).args(args.iter().cloned()))?;
    Ok(())
}

/// Check for a leading legacy package-query flag.
///
/// Matches the short flags the old dispatcher forwarded wholesale, in
/// leading position only, including combined forms like `-qaP`.
pub fn is_legacy_query_flag(arg: &str) -> bool {
    let mut chars = arg.chars();
    chars.next() == Some('-') && matches!(chars.next(), Some('i' | 'A' | 'q' | 'e' | 'p'))
}

fn rebuild_invocation(
    flake_ref: &OsStr,
    action: &str,
    inject: &[&str],
    trailing: &[String],
) -> Invocation {
    Invocation::new("nixos-rebuild")
        .arg(action)
        .args(inject.iter().copied())
        .arg("--flake")
        .arg(flake_ref)
        .args(trailing)
        .elevated()
}

fn update_invocation(target: &FlakeTarget, inputs: &[String]) -> Invocation {
    let mut invocation = Invocation::new("nix").args(["flake", "update"]);
    if inputs.is_empty() {
        invocation = invocation.arg("--recreate-lock-file");
    } else {
        for input in inputs {
            invocation = invocation.arg("--update-input").arg(input);
        }
    }

    invocation.arg("--flake").arg(target.to_os_string())
}

/// Secret generations that the live link no longer points at.
///
/// Best effort probing: a missing directory or unreadable live link means
/// nothing is reported stale.
fn stale_secret_generations(dir: &Path, live_link: &Path) -> Vec<PathBuf> {
    let Ok(live) = fs::read_link(live_link) else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path != &live)
        .collect()
}

fn find_extension(verb: &str) -> Option<PathBuf> {
    let name = format!("{EXTENSION_PREFIX}{verb}");
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(&name))
        .find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Command dispatch error types.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Verb matches no known command and no extension executable.
    #[error("unknown command {verb:?}")]
    UnknownCommand { verb: String },

    /// Operation is recognized but not implemented.
    #[error("{what} is not supported yet")]
    Unsupported { what: &'static str },

    /// No usable ssh public key for remote deployment.
    #[error("no ssh public key found under ~/.ssh")]
    NoPublicKey,

    /// Flake target resolution fails.
    #[error(transparent)]
    Target(#[from] TargetError),

    /// External tool invocation fails.
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// Store link swapping fails.
    #[error(transparent)]
    Swap(#[from] SwapError),
}

/// Friendly result alias :3
type Result<T, E = CommandError> = std::result::Result<T, E>;
