// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for the optional configuration file that nixdot reads
//! at startup to seed flake resolution and rebuild defaults. The file lives
//! at `$XDG_CONFIG_HOME/nixdot/config.toml`, and every field is optional.
//! A missing file just means nixdot runs with its built-in defaults.
//!
//! # General Layout
//!
//! The configuration file carries a single settings section. The settings
//! section can pin an explicit flake directory, name a default host
//! attribute for rebuilds, and replace the ordered candidate list that the
//! flake resolver scans when nothing pins the flake directly.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::PathBuf,
    str::FromStr,
};
use tracing::debug;

/// Ordered fallback directories scanned for a flake entry point.
pub const DEFAULT_CANDIDATES: [&str; 2] = ["/etc/nixos", "/etc/dotfiles"];

/// Top-level configuration file layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Settings for flake resolution and rebuilds.
    pub settings: Settings,
}

impl Config {
    /// Load configuration from its default path.
    ///
    /// A missing configuration file yields the default configuration. A
    /// present but malformed one is an error.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if the file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if parsing fails.
    /// - Return [`ConfigError::ShellExpansion`] if shell expansion fails.
    pub fn load() -> Result<Self> {
        let Some(path) = default_config_path() else {
            return Ok(Self::default());
        };

        if !path.is_file() {
            debug!("no configuration file at {:?}, using defaults", path.display());
            return Ok(Self::default());
        }

        read_to_string(&path)
            .map_err(|err| ConfigError::Read {
                source: err,
                config_path: path.clone(),
            })?
            .parse()
    }

    /// Candidate directories to scan, honoring any configured override.
    pub fn candidates(&self) -> Vec<PathBuf> {
        match &self.settings.candidates {
            Some(candidates) => candidates.clone(),
            None => DEFAULT_CANDIDATES.iter().map(PathBuf::from).collect(),
        }
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: Config = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on all path-valued fields.
        if let Some(flake) = config.settings.flake.take() {
            config.settings.flake = Some(expand_path(&flake)?);
        }
        if let Some(candidates) = config.settings.candidates.take() {
            config.settings.candidates = Some(
                candidates
                    .iter()
                    .map(expand_path)
                    .collect::<Result<Vec<_>>>()?,
            );
        }

        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Flake resolution and rebuild settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Explicit flake directory, bypassing the candidate scan.
    pub flake: Option<PathBuf>,

    /// Default host attribute for rebuild invocations.
    pub host: Option<String>,

    /// Replacement for the built-in candidate directory listing.
    pub candidates: Option<Vec<PathBuf>>,
}

/// Determine default absolute path to the configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/nixdot/config.toml`. Does
/// not check if the path returned actually exists.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|path| path.join("nixdot").join("config.toml"))
}

fn expand_path(path: &PathBuf) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration at {:?}", config_path.display())]
    Read {
        #[source]
        source: std::io::Error,
        config_path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("FLAKES", "/home/blah/flakes")])]
    fn deserialize_config() -> anyhow::Result<()> {
        let result: Config = r#"
            [settings]
            flake = "$FLAKES/desktop"
            host = "carbon"
            candidates = ["/etc/nixos", "$FLAKES/fallback"]
        "#
        .parse()?;

        let expect = Config {
            settings: Settings {
                flake: Some(PathBuf::from("/home/blah/flakes/desktop")),
                host: Some("carbon".into()),
                candidates: Some(vec![
                    PathBuf::from("/etc/nixos"),
                    PathBuf::from("/home/blah/flakes/fallback"),
                ]),
            },
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn serialize_config() {
        let result = Config {
            settings: Settings {
                flake: Some(PathBuf::from("/home/blah/flakes/desktop")),
                host: Some("carbon".into()),
                candidates: Some(vec![
                    PathBuf::from("/etc/nixos"),
                    PathBuf::from("/etc/dotfiles"),
                ]),
            },
        }
        .to_string();

        let expect = indoc! {r#"
            [settings]
            flake = "/home/blah/flakes/desktop"
            host = "carbon"
            candidates = [
                "/etc/nixos",
                "/etc/dotfiles",
            ]
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn default_candidates_when_unset() {
        let config = Config::default();
        let expect: Vec<PathBuf> = DEFAULT_CANDIDATES.iter().map(PathBuf::from).collect();
        assert_eq!(config.candidates(), expect);
    }
}
