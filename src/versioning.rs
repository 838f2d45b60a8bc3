//! In-memory version snapshots of text files.

use crate::diff::unified_diff;
use crate::error::{FileOpError, IoResultExt, Result};
use crate::file_ops::create_parent_dirs;
use crate::workspace::Workspace;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

#[derive(Debug, PartialEq, Eq)]
pub struct SavedVersion {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub evicted: Vec<String>,
    /// A file whose whole history was dropped to make room for this one.
    pub evicted_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct History {
    versions: Vec<Version>,
    last_saved: u64,
}

/// Versions per file, oldest first. Each file keeps at most `max_per_file`,
/// and at most `max_files` files are tracked; the file saved to longest ago
/// loses its history first.
#[derive(Debug)]
pub struct VersionStore {
    max_per_file: usize,
    max_files: usize,
    next_sequence: u64,
    files: HashMap<PathBuf, History>,
}

impl VersionStore {
    pub fn new(max_per_file: usize, max_files: usize) -> Self {
        Self {
            max_per_file: max_per_file.max(1),
            max_files: max_files.max(1),
            next_sequence: 0,
            files: HashMap::new(),
        }
    }

    fn make_room_for(&mut self, path: &Path) -> Option<PathBuf> {
        if self.files.contains_key(path) || self.files.len() < self.max_files {
            return None;
        }
        let oldest = self
            .files
            .iter()
            .min_by_key(|(_, history)| history.last_saved)
            .map(|(path, _)| path.clone())?;
        self.files.remove(&oldest);
        Some(oldest)
    }

    /// Stores `content` under `name`, or under a timestamp label when no name
    /// is given. An explicit name that already exists is replaced and becomes
    /// the newest version; a generated label gets a numeric suffix instead.
    pub fn save(
        &mut self,
        path: &Path,
        name: Option<&str>,
        content: String,
        now: DateTime<Utc>,
    ) -> SavedVersion {
        let evicted_file = self.make_room_for(path);
        self.next_sequence += 1;
        let history = self.files.entry(path.to_path_buf()).or_default();
        history.last_saved = self.next_sequence;
        let versions = &mut history.versions;

        let name = match name.filter(|n| !n.is_empty()) {
            Some(name) => {
                versions.retain(|v| v.name != name);
                name.to_string()
            }
            None => {
                let base = now.with_timezone(&Local).format("%Y%m%d_%H%M%S").to_string();
                let mut candidate = base.clone();
                let mut suffix = 2;
                while versions.iter().any(|v| v.name == candidate) {
                    candidate = format!("{base}_{suffix}");
                    suffix += 1;
                }
                candidate
            }
        };

        versions.push(Version {
            name: name.clone(),
            timestamp: now,
            content,
        });

        let overflow = versions.len().saturating_sub(self.max_per_file);
        let evicted = versions.drain(..overflow).map(|v| v.name).collect();

        SavedVersion {
            name,
            timestamp: now,
            evicted,
            evicted_file,
        }
    }

    pub fn get(&self, path: &Path, name: &str) -> Option<&Version> {
        self.files.get(path)?.versions.iter().find(|v| v.name == name)
    }

    /// All versions of a file, newest first.
    pub fn list(&self, path: &Path) -> Vec<&Version> {
        self.files
            .get(path)
            .map(|history| history.versions.iter().rev().collect())
            .unwrap_or_default()
    }

    pub fn names(&self, path: &Path) -> Vec<String> {
        self.list(path).into_iter().map(|v| v.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionAction {
    Save,
    Restore,
    List,
    Compare,
}

impl FromStr for VersionAction {
    type Err = FileOpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "save" => Ok(VersionAction::Save),
            "restore" => Ok(VersionAction::Restore),
            "list" => Ok(VersionAction::List),
            "compare" => Ok(VersionAction::Compare),
            other => Err(FileOpError::InvalidArgument(format!(
                "Invalid action: {other}. Must be one of: 'save', 'restore', 'list', 'compare'"
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VersioningReport {
    pub file_path: String,
    pub action: VersionAction,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evicted_versions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions: Option<Vec<VersionInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_version: Option<String>,
}

impl VersioningReport {
    fn new(path: &Path, action: VersionAction, result: String) -> Self {
        Self {
            file_path: path.display().to_string(),
            action,
            result,
            version_name: None,
            timestamp: None,
            evicted_versions: Vec::new(),
            versions: None,
            diff: None,
            from_version: None,
            to_version: None,
        }
    }
}

/// Saves, restores, lists or compares in-memory versions of a file.
///
/// Versions are keyed by the resolved path and live as long as the workspace.
/// Only `save` needs the file to exist; `restore` recreates a deleted file.
pub fn file_versioning(
    workspace: &Workspace,
    file_path: &str,
    action: &str,
    version_name: Option<&str>,
    restore_version: Option<&str>,
    list_all: bool,
    use_base_dir: bool,
) -> Result<VersioningReport> {
    let action: VersionAction = action.parse()?;
    let full_path = workspace.resolve(file_path, use_base_dir)?;

    match action {
        VersionAction::Save => {
            if !full_path.is_file() {
                return Err(FileOpError::not_found("File", &full_path));
            }
            let bytes = fs::read(&full_path).with_path("read", &full_path)?;
            let content = String::from_utf8_lossy(&bytes).into_owned();
            let saved = workspace
                .versions()
                .save(&full_path, version_name, content, Utc::now());

            if let Some(evicted_file) = &saved.evicted_file {
                tracing::debug!(path = %evicted_file.display(), "dropped version history");
            }
            if !saved.evicted.is_empty() {
                tracing::debug!(
                    path = %full_path.display(),
                    evicted = ?saved.evicted,
                    "evicted old versions"
                );
            }
            let mut report = VersioningReport::new(
                &full_path,
                action,
                format!("Version '{}' saved successfully", saved.name),
            );
            report.version_name = Some(saved.name);
            report.timestamp = Some(saved.timestamp);
            report.evicted_versions = saved.evicted;
            Ok(report)
        }
        VersionAction::Restore => {
            let version = {
                let store = workspace.versions();
                match restore_version.and_then(|name| store.get(&full_path, name)) {
                    Some(version) => version.clone(),
                    None => {
                        return Err(FileOpError::NotFound(format!(
                            "Version '{}' not found. Available versions: {:?}",
                            restore_version.unwrap_or_default(),
                            store.names(&full_path)
                        )));
                    }
                }
            };

            create_parent_dirs(&full_path)?;
            fs::write(&full_path, &version.content).with_path("write", &full_path)?;
            tracing::info!(path = %full_path.display(), version = %version.name, "restored version");

            let mut report = VersioningReport::new(
                &full_path,
                action,
                format!("Version '{}' restored successfully", version.name),
            );
            report.version_name = Some(version.name);
            report.timestamp = Some(version.timestamp);
            Ok(report)
        }
        VersionAction::List => {
            let versions: Vec<VersionInfo> = workspace
                .versions()
                .list(&full_path)
                .into_iter()
                .map(|v| VersionInfo {
                    name: v.name.clone(),
                    timestamp: v.timestamp,
                    content: list_all.then(|| v.content.clone()),
                })
                .collect();
            let mut report = VersioningReport::new(
                &full_path,
                action,
                format!("{} versions found", versions.len()),
            );
            report.versions = Some(versions);
            Ok(report)
        }
        VersionAction::Compare => {
            let (previous, latest) = {
                let store = workspace.versions();
                let versions = store.list(&full_path);
                if versions.len() < 2 {
                    return Err(FileOpError::InvalidArgument(format!(
                        "Need at least two versions to compare. Only {} versions available.",
                        versions.len()
                    )));
                }
                (versions[1].clone(), versions[0].clone())
            };

            let diff = unified_diff(
                &previous.content,
                &latest.content,
                &format!("Version: {}", previous.name),
                &format!("Version: {}", latest.name),
            );
            let mut report = VersioningReport::new(
                &full_path,
                action,
                format!(
                    "Compared versions '{}' and '{}'",
                    previous.name, latest.name
                ),
            );
            report.diff = Some(diff);
            report.from_version = Some(previous.name);
            report.to_version = Some(latest.name);
            Ok(report)
        }
    }
}
