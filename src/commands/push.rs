// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote deployment.
//!
//! Pushing deploys the local configuration onto a remote machine in three
//! steps: temporarily install the operator's public key into the remote
//! root account, run the rebuild with the build forced local and the
//! target forced remote, then remove the key again.
//!
//! The removal is modeled as a lease: once the key is installed, a guard
//! owns its removal and performs it when dropped, on success and failure
//! alike. An interrupt handler keeps this process alive while a SIGINT
//! tears down the child, so the failing child status unwinds through the
//! guard instead of killing us before cleanup.

use super::{CommandError, Context, Result};
use crate::runner::{Invocation, Runner};

use std::{ffi::OsStr, fs};
use tracing::{info, warn};

/// Remote account the key is installed into and the deploy targets.
pub const REMOTE_USER: &str = "root";

/// Default rebuild action when none is requested.
pub const DEFAULT_ACTION: &str = "test";

/// Public key files probed under `~/.ssh`, in order.
const KEY_CANDIDATES: [&str; 2] = ["id_ed25519.pub", "id_rsa.pub"];

/// Deploy the configuration onto a remote host.
///
/// # Errors
///
/// - Return [`CommandError::NoPublicKey`] if no local public key exists.
/// - Return [`CommandError::Runner`] if any step fails; a failing key
///   installation aborts before the rebuild, and nothing is cleaned up
///   because nothing was installed.
pub fn push(ctx: &Context, target_host: &str, action: Option<&str>) -> Result<()> {
    let action = action.unwrap_or(DEFAULT_ACTION);
    let key = read_public_key()?;
    let host = ctx.host().unwrap_or(target_host);
    let flake_ref = ctx.target()?.flake_ref(Some(host));

    install_interrupt_guard();

    info!("installing temporary key for {REMOTE_USER}@{target_host}");
    ctx.runner.status(&install_key_invocation(target_host, key.as_str()))?;
    let _lease = KeyLease {
        runner: ctx.runner,
        host: target_host.to_string(),
        key,
    };

    Ok(ctx
        .runner
        .status(&deploy_invocation(flake_ref.as_os_str(), target_host, action))?)
}

/// Keep the process alive through an operator interrupt.
///
/// The child shares our foreground process group and dies on its own;
/// its failing status then propagates normally, and the key lease drops.
fn install_interrupt_guard() {
    let result = ctrlc::set_handler(|| {
        warn!("interrupted, waiting for cleanup before exit");
    });
    if let Err(error) = result {
        warn!("cannot install interrupt handler: {error}");
    }
}

fn read_public_key() -> Result<String> {
    let ssh_dir = dirs::home_dir()
        .map(|home| home.join(".ssh"))
        .ok_or(CommandError::NoPublicKey)?;

    for candidate in KEY_CANDIDATES {
        if let Ok(key) = fs::read_to_string(ssh_dir.join(candidate)) {
            return Ok(key.trim().to_string());
        }
    }

    Err(CommandError::NoPublicKey)
}

fn install_key_invocation(host: &str, key: &str) -> Invocation {
    let script =
        format!("mkdir -p .ssh && printf '%s\\n' '{key}' >> .ssh/authorized_keys");
    Invocation::new("ssh").arg(format!("{REMOTE_USER}@{host}")).arg(script)
}

fn remove_key_invocation(host: &str, key: &str) -> Invocation {
    let script = format!(
        "grep -vF '{key}' .ssh/authorized_keys > .ssh/authorized_keys.tmp \
         && mv .ssh/authorized_keys.tmp .ssh/authorized_keys"
    );
    Invocation::new("ssh").arg(format!("{REMOTE_USER}@{host}")).arg(script)
}

fn deploy_invocation(flake_ref: &OsStr, host: &str, action: &str) -> Invocation {
    Invocation::new("nixos-rebuild")
        .arg(action)
        .arg("--flake")
        .arg(flake_ref)
        .args(["--build-host", "localhost"])
        .arg("--target-host")
        .arg(format!("{REMOTE_USER}@{host}"))
}

/// Lease on the temporarily installed remote key.
///
/// Dropping the lease removes the key. Removal failure is reported, not
/// propagated; there is nothing sensible to do about it mid-unwind.
struct KeyLease {
    runner: Runner,
    host: String,
    key: String,
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        info!("removing temporary key from {REMOTE_USER}@{}", self.host);
        let invocation = remove_key_invocation(self.host.as_str(), self.key.as_str());
        if let Err(error) = self.runner.status(&invocation) {
            warn!("failed to remove temporary key from {}: {error}", self.host);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{env, fs::create_dir_all};

    #[sealed_test]
    fn public_key_is_read_and_trimmed() -> anyhow::Result<()> {
        let home = env::current_dir()?;
        env::set_var("HOME", &home);
        create_dir_all(home.join(".ssh"))?;
        fs::write(home.join(".ssh/id_ed25519.pub"), "ssh-ed25519 AAAA operator\n")?;

        assert_eq!(read_public_key()?, "ssh-ed25519 AAAA operator");

        Ok(())
    }

    #[sealed_test]
    fn missing_public_key_is_an_error() -> anyhow::Result<()> {
        let home = env::current_dir()?;
        env::set_var("HOME", &home);
        create_dir_all(home.join(".ssh"))?;

        let result = read_public_key();
        assert!(matches!(result, Err(CommandError::NoPublicKey)));

        Ok(())
    }

    #[test]
    fn key_installation_targets_remote_root() {
        let invocation = install_key_invocation("carbon", "ssh-ed25519 AAAA operator");
        let rendered = invocation.to_string();
        assert!(rendered.starts_with("ssh root@carbon "));
        assert!(rendered.contains("ssh-ed25519 AAAA operator"));
        assert!(rendered.contains(">> .ssh/authorized_keys"));
    }

    #[test]
    fn key_removal_filters_the_installed_key() {
        let invocation = remove_key_invocation("carbon", "ssh-ed25519 AAAA operator");
        let rendered = invocation.to_string();
        assert!(rendered.starts_with("ssh root@carbon "));
        assert!(rendered.contains("grep -vF 'ssh-ed25519 AAAA operator'"));
    }

    #[test]
    fn deploy_builds_local_and_targets_remote_root() {
        let invocation =
            deploy_invocation(OsStr::new("/etc/dotfiles#carbon"), "carbon", DEFAULT_ACTION);
        assert!(!invocation.is_elevated());
        assert_eq!(
            invocation.to_string(),
            "nixos-rebuild test --flake /etc/dotfiles#carbon \
             --build-host localhost --target-host root@carbon"
        );
    }

    #[test]
    fn dropped_lease_runs_removal_without_panicking() {
        let lease = KeyLease {
            runner: Runner::new(true),
            host: "carbon".into(),
            key: "ssh-ed25519 AAAA operator".into(),
        };
        drop(lease);
    }
}
