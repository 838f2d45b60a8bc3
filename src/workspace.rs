//! # Workspace
//!
//! The explicit context every operation runs against: the base directory that
//! relative paths resolve to, plus the in-memory stores behind versioning,
//! change detection and directory watching. Two workspaces never share state,
//! so each one acts as an isolated session. A single workspace can be shared
//! behind an `Arc`; every piece of mutable state sits behind its own lock.

use crate::changes::ChangeTracker;
use crate::config::Config;
use crate::error::{FileOpError, IoResultExt, Result};
use crate::permissions::{ensure_within_base, normalize_lexically};
use crate::versioning::VersionStore;
use crate::watcher::WatchRegistry;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

/// Caps applied to the in-memory stores and to chunked reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    pub max_versions_per_file: usize,
    pub max_versioned_files: usize,
    pub max_tracked_directories: usize,
    pub max_watch_events: usize,
    pub hash_chunk_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_versions_per_file: 50,
            max_versioned_files: 256,
            max_tracked_directories: 64,
            max_watch_events: 10_000,
            hash_chunk_size: 8192,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct BaseDirChange {
    pub message: String,
    pub old_working_directory: PathBuf,
    pub new_working_directory: PathBuf,
    pub created: bool,
}

pub struct Workspace {
    base_dir: RwLock<PathBuf>,
    allow_external_paths: bool,
    limits: Limits,
    versions: Mutex<VersionStore>,
    tracker: Mutex<ChangeTracker>,
    watchers: Mutex<WatchRegistry>,
}

impl Workspace {
    /// Creates a workspace rooted at `base_dir` with default limits.
    /// A relative `base_dir` is taken relative to the process working directory.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self::with_limits(base_dir, Limits::default())
    }

    pub fn with_limits(base_dir: impl AsRef<Path>, limits: Limits) -> Self {
        Self {
            base_dir: RwLock::new(absolute_normalized(base_dir.as_ref())),
            allow_external_paths: true,
            versions: Mutex::new(VersionStore::new(
                limits.max_versions_per_file,
                limits.max_versioned_files,
            )),
            tracker: Mutex::new(ChangeTracker::new(limits.max_tracked_directories)),
            watchers: Mutex::new(WatchRegistry::new(limits.max_watch_events)),
            limits,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let limits = Limits {
            max_versions_per_file: config.max_versions_per_file,
            max_versioned_files: config.max_versioned_files,
            max_tracked_directories: config.max_tracked_directories,
            max_watch_events: config.max_watch_events,
            hash_chunk_size: config.hash_chunk_size,
        };
        Self::with_limits(&config.data_directory, limits)
            .allow_external_paths(config.allow_external_paths)
    }

    /// When `false`, paths passed with `use_base_dir = false` must also stay
    /// inside the base directory.
    pub fn allow_external_paths(mut self, allow: bool) -> Self {
        self.allow_external_paths = allow;
        self
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn base_dir(&self) -> PathBuf {
        self.base_dir
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switches the base directory, creating it when it does not exist yet.
    pub fn set_base_dir(&self, new_directory: &str) -> Result<BaseDirChange> {
        let new_path = absolute_normalized(Path::new(new_directory));

        let created = if new_path.exists() {
            if !new_path.is_dir() {
                return Err(FileOpError::InvalidArgument(format!(
                    "The path {} exists but is not a directory",
                    new_path.display()
                )));
            }
            false
        } else {
            fs::create_dir_all(&new_path).with_path("create directory", &new_path)?;
            true
        };

        let mut guard = self.base_dir.write().unwrap_or_else(PoisonError::into_inner);
        let old_working_directory = std::mem::replace(&mut *guard, new_path.clone());
        drop(guard);

        let message = if created {
            format!("Created new working directory: {}", new_path.display())
        } else {
            format!("Using existing directory: {}", new_path.display())
        };
        tracing::info!(
            old = %old_working_directory.display(),
            new = %new_path.display(),
            "base directory changed"
        );

        Ok(BaseDirChange {
            message,
            old_working_directory,
            new_working_directory: new_path,
            created,
        })
    }

    /// Resolves a caller-supplied path.
    ///
    /// With `use_base_dir` the path is joined onto the base directory and must
    /// stay inside it. Otherwise it is taken as given, relative to the process
    /// working directory, and only contained when external paths are disallowed.
    pub fn resolve(&self, path: &str, use_base_dir: bool) -> Result<PathBuf> {
        if path.contains('\0') {
            return Err(FileOpError::InvalidArgument(format!(
                "Path contains a NUL byte: {path:?}"
            )));
        }

        let base = self.base_dir();
        if use_base_dir {
            let joined = normalize_lexically(&base.join(path));
            ensure_within_base(&joined, &base)?;
            Ok(joined)
        } else {
            let resolved = absolute_normalized(Path::new(path));
            if !self.allow_external_paths {
                ensure_within_base(&resolved, &base)?;
            }
            Ok(resolved)
        }
    }

    pub(crate) fn versions(&self) -> MutexGuard<'_, VersionStore> {
        self.versions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn tracker(&self) -> MutexGuard<'_, ChangeTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn watchers(&self) -> MutexGuard<'_, WatchRegistry> {
        self.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("base_dir", &self.base_dir())
            .field("allow_external_paths", &self.allow_external_paths)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// The process working directory as a string.
pub fn current_working_directory() -> Result<String> {
    let cwd = std::env::current_dir()
        .map_err(|e| FileOpError::io("Failed to read the current working directory", e))?;
    Ok(cwd.to_string_lossy().into_owned())
}

fn absolute_normalized(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    normalize_lexically(&absolute)
}
