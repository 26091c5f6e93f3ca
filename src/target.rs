// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Flake target resolution.
//!
//! Determine the configuration directory that rebuild-style verbs act on.
//! Resolution happens once per invocation, entirely through read-only
//! filesystem probes:
//!
//! 1. An explicit `--flake` argument is used verbatim.
//! 2. The `$NIXDOT_FLAKE` environment variable is used verbatim.
//! 3. A `flake` entry in the configuration file is used verbatim.
//! 4. Otherwise the ordered candidate listing is scanned, and the first
//!    directory containing a flake entry point wins.
//!
//! Overrides skip the entry-point probe on purpose. Existence only matters
//! once a command actually hands the path to an external tool, and that
//! tool produces the better diagnostic.

use crate::config::Config;

use std::{
    env,
    ffi::OsString,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Environment variable consulted before the candidate scan.
pub const ENV_FLAKE: &str = "NIXDOT_FLAKE";

/// Entry-point file a candidate directory must contain.
pub const FLAKE_ENTRY: &str = "flake.nix";

/// Directory holding the declarative system configuration.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct FlakeTarget(PathBuf);

impl FlakeTarget {
    /// Construct new flake target.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Treat flake target as [`Path`] slice.
    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }

    /// Convert flake target to [`OsString`].
    pub fn to_os_string(&self) -> OsString {
        OsString::from(self.0.to_string_lossy().into_owned())
    }

    /// Render flake target as a flake reference with optional host attribute.
    pub fn flake_ref(&self, host: Option<&str>) -> OsString {
        match host {
            Some(host) => OsString::from(format!("{}#{}", self.0.to_string_lossy(), host)),
            None => self.to_os_string(),
        }
    }
}

impl Display for FlakeTarget {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_path().to_string_lossy().as_ref())
    }
}

/// Resolve the active flake target.
///
/// # Errors
///
/// - Return [`TargetError::NotFound`] if no override is given and no
///   candidate directory contains a flake entry point.
pub fn resolve(explicit: Option<&Path>, config: &Config) -> Result<FlakeTarget> {
    if let Some(path) = explicit {
        debug!("flake target pinned by argument: {:?}", path.display());
        return Ok(FlakeTarget::new(path));
    }

    if let Some(path) = env::var_os(ENV_FLAKE) {
        debug!("flake target pinned by ${ENV_FLAKE}");
        return Ok(FlakeTarget::new(PathBuf::from(path)));
    }

    if let Some(path) = &config.settings.flake {
        debug!("flake target pinned by configuration: {:?}", path.display());
        return Ok(FlakeTarget::new(path));
    }

    let candidates = config.candidates();
    for candidate in &candidates {
        if candidate.join(FLAKE_ENTRY).is_file() {
            debug!("flake target found at {:?}", candidate.display());
            return Ok(FlakeTarget::new(candidate));
        }
    }

    Err(TargetError::NotFound { candidates })
}

/// Flake target resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// No candidate directory contains a flake entry point.
    #[error("no flake configuration found in {candidates:?}, set ${ENV_FLAKE} or pass --flake")]
    NotFound { candidates: Vec<PathBuf> },
}

/// Friendly result alias :3
type Result<T, E = TargetError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::{create_dir_all, write};

    fn config_with_candidates(candidates: &[&str]) -> Config {
        Config {
            settings: Settings {
                candidates: Some(candidates.iter().map(PathBuf::from).collect()),
                ..Default::default()
            },
        }
    }

    #[sealed_test]
    fn explicit_override_skips_probing() -> anyhow::Result<()> {
        let config = config_with_candidates(&["missing"]);
        let result = resolve(Some(Path::new("/nowhere/special")), &config)?;
        assert_eq!(result, FlakeTarget::new("/nowhere/special"));
        Ok(())
    }

    #[sealed_test(env = [("NIXDOT_FLAKE", "/from/environment")])]
    fn environment_override_skips_probing() -> anyhow::Result<()> {
        let config = config_with_candidates(&["missing"]);
        let result = resolve(None, &config)?;
        assert_eq!(result, FlakeTarget::new("/from/environment"));
        Ok(())
    }

    #[sealed_test(env = [("NIXDOT_FLAKE", "/from/environment")])]
    fn explicit_override_beats_environment() -> anyhow::Result<()> {
        let config = Config::default();
        let result = resolve(Some(Path::new("/from/argument")), &config)?;
        assert_eq!(result, FlakeTarget::new("/from/argument"));
        Ok(())
    }

    #[sealed_test]
    fn first_candidate_with_entry_point_wins() -> anyhow::Result<()> {
        create_dir_all("first")?;
        create_dir_all("second")?;
        write("second/flake.nix", "{ }")?;

        let config = config_with_candidates(&["first", "second"]);
        let result = resolve(None, &config)?;
        assert_eq!(result, FlakeTarget::new("second"));
        Ok(())
    }

    #[sealed_test]
    fn no_candidate_qualifies() {
        let config = config_with_candidates(&["first", "second"]);
        let result = resolve(None, &config);
        assert!(matches!(result, Err(TargetError::NotFound { .. })));
    }

    #[test]
    fn flake_ref_with_host_attribute() {
        let target = FlakeTarget::new("/etc/dotfiles");
        assert_eq!(target.flake_ref(Some("carbon")), "/etc/dotfiles#carbon");
        assert_eq!(target.flake_ref(None), "/etc/dotfiles");
    }
}
