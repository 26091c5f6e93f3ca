// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Generation management sub-verbs.
//!
//! Generations are numbered past builds of the system profile. They can be
//! listed, diffed against the live system, and removed. Rolling back to a
//! specific generation is recognized but not implemented.

use super::{CommandError, Context, Result, CURRENT_SYSTEM, SYSTEM_PROFILE};
use crate::runner::Invocation;

use std::collections::BTreeSet;

/// List all generations of the system profile.
pub fn list(ctx: &Context) -> Result<()> {
    Ok(ctx.runner.status(&list_invocation())?)
}

/// Show store paths that differ between the live system and a generation.
///
/// Captures the referenced store paths of both and prints the signed set
/// difference, oriented from the named generation towards the live system.
pub fn diff(ctx: &Context, generation: &str) -> Result<()> {
    let named = ctx.runner.capture(&references_invocation(
        format!("{SYSTEM_PROFILE}-{generation}-link").as_str(),
    ))?;
    let current = ctx.runner.capture(&references_invocation(CURRENT_SYSTEM))?;

    for line in diff_lines(named.as_str(), current.as_str()) {
        println!("{line}");
    }

    Ok(())
}

/// Remove the named generations from the system profile.
pub fn remove(ctx: &Context, generations: &[String]) -> Result<()> {
    Ok(ctx.runner.status(&remove_invocation(generations))?)
}

/// Roll back to a specific generation.
pub fn rollback(_ctx: &Context, _generation: &str) -> Result<()> {
    Err(CommandError::Unsupported {
        what: "rollback to a specific generation",
    })
}

fn list_invocation() -> Invocation {
    Invocation::new("nix-env").args(["-p", SYSTEM_PROFILE, "--list-generations"])
}

fn references_invocation(path: &str) -> Invocation {
    Invocation::new("nix-store").args(["-q", "--references"]).arg(path)
}

fn remove_invocation(generations: &[String]) -> Invocation {
    Invocation::new("nix-env")
        .args(["-p", SYSTEM_PROFILE, "--delete-generations"])
        .args(generations)
        .elevated()
}

/// Signed set difference between two reference listings.
fn diff_lines(old: &str, new: &str) -> Vec<String> {
    let old: BTreeSet<&str> = old.lines().filter(|line| !line.is_empty()).collect();
    let new: BTreeSet<&str> = new.lines().filter(|line| !line.is_empty()).collect();

    let mut lines = Vec::new();
    for removed in old.difference(&new) {
        lines.push(format!("- {removed}"));
    }
    for added in new.difference(&old) {
        lines.push(format!("+ {added}"));
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn diff_reports_signed_set_difference() {
        let old = "/nix/store/aaa-pkg-1.0\n/nix/store/bbb-lib-2.1\n";
        let new = "/nix/store/bbb-lib-2.1\n/nix/store/ccc-pkg-1.1\n";

        let result = diff_lines(old, new);
        let expect = vec![
            "- /nix/store/aaa-pkg-1.0".to_string(),
            "+ /nix/store/ccc-pkg-1.1".to_string(),
        ];

        assert_eq!(result, expect);
    }

    #[test]
    fn diff_of_identical_listings_is_empty() {
        let refs = "/nix/store/aaa-pkg-1.0\n";
        assert!(diff_lines(refs, refs).is_empty());
    }

    #[test]
    fn removal_names_the_profile_and_requests_elevation() {
        let invocation = remove_invocation(&["12".into(), "13".into()]);
        assert!(invocation.is_elevated());
        assert_eq!(
            invocation.to_string(),
            "sudo nix-env -p /nix/var/nix/profiles/system --delete-generations 12 13"
        );
    }

    #[test]
    fn listing_names_the_system_profile() {
        assert_eq!(
            list_invocation().to_string(),
            "nix-env -p /nix/var/nix/profiles/system --list-generations"
        );
    }
}
