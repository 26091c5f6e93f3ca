// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Store link swapping.
//!
//! Files managed by the system configuration end up as symbolic links into
//! the read-only content store. That is great for reproducibility, and
//! terrible for quick iteration: you cannot edit the linked file in place.
//! The swap utility toggles such a path between its two states:
//!
//! - __linked__: the path is a symbolic link into the store, no backup
//!   exists next to it.
//! - __materialized__: the path is a plain writable copy, and the original
//!   link has been renamed to a sibling backup path.
//!
//! The presence or absence of the backup sibling _is_ the state. Nothing is
//! recorded anywhere else, so the toggle is computed fresh from the
//! filesystem on every run and the operation is reversible at any time.
//!
//! # Directory Targets
//!
//! A directory target toggles in bulk. If any backup-marked file exists
//! anywhere beneath it, the whole directory counts as materialized and every
//! backup found is restored. Otherwise every symbolic link beneath it that
//! resolves into the content store is materialized; links pointing elsewhere
//! are left alone. Mixed states are deliberately not reconciled per link.
//!
//! # Data Loss
//!
//! Restoring discards any edits made to the materialized copy. That is the
//! entire point of the confirmation gate: the swap back is the one moment
//! where work can be thrown away, and the operator has to say so.

use glob::glob;
use ignore::WalkBuilder;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Path prefix of the immutable content store.
pub const STORE_PREFIX: &str = "/nix/store";

/// Marker suffix appended to a path to form its backup sibling.
pub const BACKUP_SUFFIX: &str = "bak";

/// Toggle paths between linked and materialized state.
#[derive(Debug)]
pub struct Swapper<P>
where
    P: ConfirmPrompt,
{
    store_prefix: PathBuf,
    prompter: P,
}

impl<P> Swapper<P>
where
    P: ConfirmPrompt,
{
    /// Construct new swapper.
    ///
    /// Only symbolic links whose destination falls under `store_prefix` are
    /// swapped during directory walks.
    pub fn new(store_prefix: impl Into<PathBuf>, prompter: P) -> Self {
        Self {
            store_prefix: store_prefix.into(),
            prompter,
        }
    }

    /// Toggle each path in the batch.
    ///
    /// The batch aborts at the first invalid target; remaining paths are
    /// not attempted.
    ///
    /// # Errors
    ///
    /// - Return [`SwapError::InvalidTarget`] if a path is neither an
    ///   existing file, link, nor directory.
    pub fn swap_all(&self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Result<()> {
        for path in paths {
            self.swap(&path.into())?;
        }

        Ok(())
    }

    /// Toggle a single path between linked and materialized state.
    #[instrument(skip(self), level = "debug")]
    pub fn swap(&self, path: &Path) -> Result<()> {
        if path.is_dir() {
            return self.swap_dir(path);
        }

        if fs::symlink_metadata(path).is_ok() {
            return self.swap_file(path);
        }

        Err(SwapError::InvalidTarget {
            path: path.to_path_buf(),
        })
    }

    fn swap_file(&self, path: &Path) -> Result<()> {
        let backup = backup_path(path);
        if fs::symlink_metadata(&backup).is_ok() {
            self.restore(path, &backup)
        } else {
            self.materialize(path, &backup)
        }
    }

    fn swap_dir(&self, dir: &Path) -> Result<()> {
        let backups = find_backups(dir)?;

        // INVARIANT: Any backup beneath the directory means the whole
        // directory toggles as materialized, links are ignored.
        if !backups.is_empty() {
            info!("restoring {} backups under {:?}", backups.len(), dir.display());
            for backup in backups {
                let original = original_path(&backup);
                self.restore(&original, &backup)?;
            }
            return Ok(());
        }

        for link in find_links(dir)? {
            let destination = match fs::read_link(&link) {
                Ok(destination) => destination,
                Err(_) => continue,
            };

            if destination.starts_with(&self.store_prefix) {
                self.materialize(&link, &backup_path(&link))?;
            } else {
                debug!("leaving {:?} alone, destination outside store", link.display());
            }
        }

        Ok(())
    }

    /// Turn a linked path into a writable copy.
    ///
    /// The original file moves to the backup path verbatim, and the live
    /// path becomes an independent regular-file copy of its content. Store
    /// objects are read-only, so the copy is made user-writable.
    fn materialize(&self, path: &Path, backup: &Path) -> Result<()> {
        info!("swap {:?} for a writable copy", path.display());
        rename(path, backup)?;
        copy(backup, path)?;
        make_writable(path)?;

        Ok(())
    }

    /// Put the original link back, discarding the materialized copy.
    fn restore(&self, path: &Path, backup: &Path) -> Result<()> {
        let message = format!(
            "restore {:?} to its original link? edits to the copy will be lost",
            path.display()
        );
        if !self.prompter.confirm(message.as_str())? {
            info!("keeping {:?} as is", path.display());
            return Ok(());
        }

        info!("restore {:?} from {:?}", path.display(), backup.display());
        rename(backup, path)
    }
}

/// Confirmation gate for destructive restores.
pub trait ConfirmPrompt {
    /// Ask the operator to confirm; default answer is no.
    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Interactive confirmation through an inquire prompt.
#[derive(Debug, Default)]
pub struct InquireConfirm;

impl ConfirmPrompt for InquireConfirm {
    fn confirm(&self, message: &str) -> Result<bool> {
        Ok(inquire::Confirm::new(message)
            .with_default(false)
            .prompt()?)
    }
}

/// Backup sibling for a given path.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(".");
    raw.push(BACKUP_SUFFIX);
    PathBuf::from(raw)
}

fn original_path(backup: &Path) -> PathBuf {
    let raw = backup.to_string_lossy();
    match raw.strip_suffix(&format!(".{BACKUP_SUFFIX}")) {
        Some(original) => PathBuf::from(original),
        None => backup.to_path_buf(),
    }
}

fn find_backups(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/**/*.{}", dir.display(), BACKUP_SUFFIX);
    let mut backups = Vec::new();
    for entry in glob(pattern.as_str())? {
        backups.push(entry?);
    }

    Ok(backups)
}

fn find_links(dir: &Path) -> Result<Vec<PathBuf>> {
    let walker = WalkBuilder::new(dir)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .follow_links(false)
        .build();

    let mut links = Vec::new();
    for entry in walker {
        let entry = entry?;
        // The walk root is the directory itself, never a swap candidate.
        if entry.depth() == 0 {
            continue;
        }
        if entry.path_is_symlink() {
            links.push(entry.into_path());
        }
    }

    Ok(links)
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|err| SwapError::Rename {
        source: err,
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    })
}

fn copy(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).map_err(|err| SwapError::Copy {
        source: err,
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    })?;

    Ok(())
}

fn make_writable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(|err| SwapError::SetWritable {
        source: err,
        path: path.to_path_buf(),
    })?;
    let mut permissions = metadata.permissions();
    permissions.set_mode(permissions.mode() | 0o200);
    fs::set_permissions(path, permissions).map_err(|err| SwapError::SetWritable {
        source: err,
        path: path.to_path_buf(),
    })
}

/// Store link swapping error types.
#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    /// Target is neither an existing file, link, nor directory.
    #[error("swap target {:?} is neither a file nor a directory", path.display())]
    InvalidTarget { path: PathBuf },

    /// Path could not be renamed.
    #[error("failed to rename {:?} to {:?}", from.display(), to.display())]
    Rename {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Backup content could not be copied back to the live path.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Materialized copy could not be made writable.
    #[error("failed to make {:?} writable", path.display())]
    SetWritable {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Backup glob pattern was malformed.
    #[error(transparent)]
    BadPattern(#[from] glob::PatternError),

    /// Backup glob failed to read a directory entry.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    /// Directory walk failed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    /// Confirmation prompt failed.
    #[error(transparent)]
    Prompt(#[from] inquire::InquireError),
}

/// Friendly result alias :3
type Result<T, E = SwapError> = std::result::Result<T, E>;
