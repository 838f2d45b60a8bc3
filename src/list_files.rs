use crate::error::{FileOpError, IoResultExt, Result};
use crate::permissions::mode_bits;
use crate::workspace::Workspace;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
    Symlink,
    Unknown,
}

impl EntryType {
    fn of(file_type: fs::FileType) -> Self {
        if file_type.is_symlink() {
            EntryType::Symlink
        } else if file_type.is_dir() {
            EntryType::Directory
        } else if file_type.is_file() {
            EntryType::File
        } else {
            EntryType::Unknown
        }
    }
}

/// One listing entry. When metadata cannot be read, only `error` is filled in.
#[derive(Debug, Serialize, Clone)]
pub struct EntryInfo {
    /// File name for flat listings, path relative to the start directory for trees.
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modification_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EntryInfo {
    fn from_path(display: String, path: &Path) -> Self {
        match fs::symlink_metadata(path) {
            Ok(metadata) => EntryInfo {
                path: display,
                entry_type: EntryType::of(metadata.file_type()),
                size: Some(metadata.len()),
                creation_time: metadata.created().ok().map(DateTime::from),
                modification_time: metadata.modified().ok().map(DateTime::from),
                error: None,
            },
            Err(e) => {
                tracing::warn!("Could not retrieve metadata for {}: {e}", path.display());
                EntryInfo {
                    path: display,
                    entry_type: EntryType::Unknown,
                    size: None,
                    creation_time: None,
                    modification_time: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Lists the direct children of a directory with their metadata, sorted by name.
pub fn list_files_with_metadata(
    workspace: &Workspace,
    directory_path: &str,
    use_base_dir: bool,
) -> Result<Vec<EntryInfo>> {
    let full_path = workspace.resolve(directory_path, use_base_dir)?;
    if !full_path.is_dir() {
        tracing::debug!(path = %full_path.display(), "directory not found");
        return Err(FileOpError::not_found("Directory", &full_path));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(&full_path).with_path("list", &full_path)? {
        let entry = entry.with_path("list", &full_path)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push(EntryInfo::from_path(name, &entry.path()));
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Lists everything below a directory, recursively, with paths relative to it.
pub fn list_folder_tree(
    workspace: &Workspace,
    directory_path: &str,
    use_base_dir: bool,
) -> Result<Vec<EntryInfo>> {
    let full_path = workspace.resolve(directory_path, use_base_dir)?;
    if !full_path.is_dir() {
        return Err(FileOpError::not_found("Directory", &full_path));
    }

    let mut tree = Vec::new();
    for entry in WalkDir::new(&full_path).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let display = e
                    .path()
                    .and_then(|p| p.strip_prefix(&full_path).ok())
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default();
                tree.push(EntryInfo {
                    path: display,
                    entry_type: EntryType::Unknown,
                    size: None,
                    creation_time: None,
                    modification_time: None,
                    error: Some(e.to_string()),
                });
                continue;
            }
        };
        let relative = entry
            .path()
            .strip_prefix(&full_path)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();
        tree.push(EntryInfo::from_path(relative, entry.path()));
    }
    Ok(tree)
}

#[derive(Debug, Serialize)]
pub struct FileMetadata {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub size_human: String,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    pub is_file: bool,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub extension: String,
    /// The last three octal digits of the mode, e.g. `644`.
    pub permissions: String,
    /// The complete mode including the file type bits, e.g. `0o100644`.
    pub permissions_full: String,
    pub owner: String,
    pub group: String,
}

pub fn get_file_metadata(
    workspace: &Workspace,
    file_path: &str,
    use_base_dir: bool,
) -> Result<FileMetadata> {
    let full_path = workspace.resolve(file_path, use_base_dir)?;
    if !full_path.exists() {
        return Err(FileOpError::not_found("Path", &full_path));
    }

    let metadata = fs::metadata(&full_path).with_path("read metadata of", &full_path)?;
    let is_symlink = fs::symlink_metadata(&full_path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    let mode = mode_bits(&metadata);
    let (owner, group) = owner_and_group(&metadata);

    let extension = if metadata.is_file() {
        full_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        String::new()
    };

    Ok(FileMetadata {
        name: full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: full_path.display().to_string(),
        size: metadata.len(),
        size_human: format_size(metadata.len()),
        created: metadata.created().ok().map(DateTime::from),
        modified: metadata.modified().ok().map(DateTime::from),
        accessed: metadata.accessed().ok().map(DateTime::from),
        is_file: metadata.is_file(),
        is_dir: metadata.is_dir(),
        is_symlink,
        extension,
        permissions: format!("{:03o}", mode & 0o777),
        permissions_full: format!("{mode:#o}"),
        owner,
        group,
    })
}

#[cfg(unix)]
fn owner_and_group(metadata: &fs::Metadata) -> (String, String) {
    use std::os::unix::fs::MetadataExt;

    let uid = metadata.uid();
    let gid = metadata.gid();
    let owner = user_name(uid).unwrap_or_else(|| uid.to_string());
    let group = group_name(gid).unwrap_or_else(|| gid.to_string());
    (owner, group)
}

#[cfg(unix)]
fn user_name(uid: u32) -> Option<String> {
    use nix::unistd::{Uid, User};
    User::from_uid(Uid::from_raw(uid)).ok().flatten().map(|user| user.name)
}

#[cfg(unix)]
fn group_name(gid: u32) -> Option<String> {
    use nix::unistd::{Gid, Group};
    Group::from_gid(Gid::from_raw(gid)).ok().flatten().map(|group| group.name)
}

#[cfg(not(unix))]
fn owner_and_group(_metadata: &fs::Metadata) -> (String, String) {
    ("N/A".to_string(), "N/A".to_string())
}

/// Formats a byte count with binary units, e.g. `2.50 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

#[derive(Debug, Serialize)]
pub struct DiskUsageFormatted {
    pub total_space: String,
    pub used_space: String,
    pub free_space: String,
    pub usage_percent: String,
}

#[derive(Debug, Serialize)]
pub struct DiskUsage {
    pub path: String,
    pub total_space: u64,
    pub used_space: u64,
    pub free_space: u64,
    pub usage_percent: f64,
    pub formatted: DiskUsageFormatted,
}

/// Space statistics for the filesystem holding `path` (the base directory when `None`).
pub fn get_disk_usage(
    workspace: &Workspace,
    path: Option<&str>,
    use_base_dir: bool,
) -> Result<DiskUsage> {
    let target = match path {
        Some(path) => workspace.resolve(path, use_base_dir)?,
        None if use_base_dir => workspace.base_dir(),
        None => std::env::current_dir()
            .map_err(|e| FileOpError::io("Failed to read the current working directory", e))?,
    };
    if !target.exists() {
        return Err(FileOpError::not_found("Path", &target));
    }

    let (total, used, free) = filesystem_stats(&target)?;
    // Same definition as `df`: the share of space available to unprivileged users.
    let usage_percent = if used + free == 0 {
        0.0
    } else {
        ((used as f64 / (used + free) as f64) * 1000.0).round() / 10.0
    };

    Ok(DiskUsage {
        path: target.display().to_string(),
        total_space: total,
        used_space: used,
        free_space: free,
        usage_percent,
        formatted: DiskUsageFormatted {
            total_space: format_size(total),
            used_space: format_size(used),
            free_space: format_size(free),
            usage_percent: format!("{usage_percent}%"),
        },
    })
}

#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
fn filesystem_stats(path: &Path) -> Result<(u64, u64, u64)> {
    let stats = nix::sys::statvfs::statvfs(path).map_err(|errno| {
        FileOpError::io(
            format!("Failed to stat filesystem of '{}'", path.display()),
            std::io::Error::from(errno),
        )
    })?;

    let fragment = stats.fragment_size() as u64;
    let total = stats.blocks() as u64 * fragment;
    let free_for_root = stats.blocks_free() as u64 * fragment;
    let available = stats.blocks_available() as u64 * fragment;
    Ok((total, total.saturating_sub(free_for_root), available))
}

#[cfg(not(unix))]
fn filesystem_stats(_path: &Path) -> Result<(u64, u64, u64)> {
    Err(FileOpError::io(
        "Disk usage is not supported on this platform",
        std::io::Error::from(std::io::ErrorKind::Unsupported),
    ))
}
