use crate::error::{FileOpError, Result};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file collected from a source path, with the name it should carry inside an archive.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct ExpandedFile {
    pub path: PathBuf,
    pub archive_name: String,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ExpansionResult {
    pub files: Vec<ExpandedFile>,
    pub not_found: Vec<PathBuf>,
    /// Files left out because an earlier source already claimed their archive name.
    pub name_conflicts: Vec<PathBuf>,
}

/// Archive names claimed so far, mapped to the file that claimed them.
#[derive(Default)]
struct Claimed {
    files: BTreeSet<ExpandedFile>,
    names: HashMap<String, PathBuf>,
    conflicts: Vec<PathBuf>,
}

impl Claimed {
    fn insert(&mut self, path: PathBuf, archive_name: String) {
        match self.names.get(&archive_name) {
            Some(owner) if *owner == path => {}
            Some(_) => self.conflicts.push(path),
            None => {
                self.names.insert(archive_name.clone(), path.clone());
                self.files.insert(ExpandedFile { path, archive_name });
            }
        }
    }
}

/// Expands files and directories into a flat, deduplicated file list.
///
/// A file keeps its base name. Files found under a directory are named
/// relative to that directory's parent, so the directory itself is the top
/// level entry. Missing sources are collected instead of aborting, and so are
/// files whose archive name an earlier source already uses.
pub fn expand_and_validate(paths: &[PathBuf]) -> ExpansionResult {
    let mut claimed = Claimed::default();
    let mut not_found = Vec::new();

    for path in paths {
        if path.is_dir() {
            expand_directory(path, &mut claimed);
        } else if path.is_file() {
            let archive_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            claimed.insert(path.clone(), archive_name);
        } else {
            not_found.push(path.clone());
        }
    }

    ExpansionResult {
        files: claimed.files.into_iter().collect(),
        not_found,
        name_conflicts: claimed.conflicts,
    }
}

fn expand_directory(dir_path: &Path, claimed: &mut Claimed) {
    let name_root = dir_path.parent().unwrap_or(dir_path);
    for entry in WalkDir::new(dir_path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(name_root) else {
            continue;
        };
        // Archive member names always use forward slashes.
        let archive_name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        claimed.insert(entry.path().to_path_buf(), archive_name);
    }
}

/// A file-name filter: either a shell glob (`*.txt`) or a regular expression.
#[derive(Debug, Clone)]
pub enum NamePattern {
    Glob(glob::Pattern),
    Regex(Regex),
}

impl NamePattern {
    pub fn new(pattern: &str, use_regex: bool) -> Result<Self> {
        if use_regex {
            Ok(NamePattern::Regex(Regex::new(pattern)?))
        } else {
            Ok(NamePattern::Glob(glob::Pattern::new(pattern)?))
        }
    }

    /// Glob patterns must match the whole name; regexes match anywhere in it.
    pub fn matches(&self, file_name: &str) -> bool {
        match self {
            NamePattern::Glob(glob) => glob.matches(file_name),
            NamePattern::Regex(regex) => regex.is_match(file_name),
        }
    }
}

/// How deep a directory scan goes. Depth 0 is the starting directory itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanDepth {
    pub recursive: bool,
    pub max_depth: Option<usize>,
}

impl ScanDepth {
    pub const RECURSIVE: ScanDepth = ScanDepth {
        recursive: true,
        max_depth: None,
    };

    fn walkdir_max_depth(&self) -> usize {
        if !self.recursive {
            return 1;
        }
        // Files directly inside the start directory are at walkdir depth 1.
        self.max_depth.map_or(usize::MAX, |depth| depth.saturating_add(1))
    }
}

/// Collects regular files under `root` whose names match `pattern`, sorted by path.
pub fn collect_matching_files(
    root: &Path,
    pattern: &NamePattern,
    depth: ScanDepth,
) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(FileOpError::not_found("Directory", root));
    }

    let mut matched = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(depth.walkdir_max_depth())
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {e}", root.display());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if pattern.matches(&file_name) {
            matched.push(entry.into_path());
        }
    }
    matched.sort();
    Ok(matched)
}
