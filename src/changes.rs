use crate::error::{FileOpError, Result};
use crate::path_expander::{NamePattern, ScanDepth, collect_matching_files};
use crate::workspace::Workspace;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

/// What a scan remembers about one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: Option<SystemTime>,
    pub len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        Some(Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub files: BTreeMap<PathBuf, FileStamp>,
    pub scanned_at: DateTime<Utc>,
    sequence: u64,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub changed_files: Vec<String>,
    pub new_files: Vec<String>,
    pub deleted_files: Vec<String>,
}

impl ChangeSet {
    pub fn total(&self) -> usize {
        self.changed_files.len() + self.new_files.len() + self.deleted_files.len()
    }

    /// A file counts as changed when its modification time or its size differs.
    pub fn between(old: &BTreeMap<PathBuf, FileStamp>, new: &BTreeMap<PathBuf, FileStamp>) -> Self {
        let mut changes = ChangeSet::default();
        for (path, stamp) in new {
            match old.get(path) {
                Some(previous) if previous != stamp => {
                    changes.changed_files.push(path.display().to_string())
                }
                Some(_) => {}
                None => changes.new_files.push(path.display().to_string()),
            }
        }
        changes.deleted_files = old
            .keys()
            .filter(|path| !new.contains_key(*path))
            .map(|path| path.display().to_string())
            .collect();
        changes
    }
}

/// Snapshots per directory. Holds at most `max_directories`; the directory
/// scanned longest ago is evicted first.
#[derive(Debug)]
pub struct ChangeTracker {
    max_directories: usize,
    next_sequence: u64,
    snapshots: HashMap<PathBuf, Snapshot>,
}

impl ChangeTracker {
    pub fn new(max_directories: usize) -> Self {
        Self {
            max_directories: max_directories.max(1),
            next_sequence: 0,
            snapshots: HashMap::new(),
        }
    }

    /// Records a snapshot, returning the directory that was evicted to make room.
    pub fn record(
        &mut self,
        directory: &Path,
        files: BTreeMap<PathBuf, FileStamp>,
        now: DateTime<Utc>,
    ) -> Option<PathBuf> {
        let mut evicted = None;
        if !self.snapshots.contains_key(directory) && self.snapshots.len() >= self.max_directories {
            evicted = self
                .snapshots
                .iter()
                .min_by_key(|(_, snapshot)| snapshot.sequence)
                .map(|(path, _)| path.clone());
            if let Some(path) = &evicted {
                self.snapshots.remove(path);
            }
        }

        self.next_sequence += 1;
        self.snapshots.insert(
            directory.to_path_buf(),
            Snapshot {
                files,
                scanned_at: now,
                sequence: self.next_sequence,
            },
        );
        evicted
    }

    pub fn get(&self, directory: &Path) -> Option<&Snapshot> {
        self.snapshots.get(directory)
    }

    pub fn remove(&mut self, directory: &Path) -> Option<Snapshot> {
        self.snapshots.remove(directory)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Scan,
    Check,
    Reset,
}

impl FromStr for ChangeAction {
    type Err = FileOpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scan" => Ok(ChangeAction::Scan),
            "check" => Ok(ChangeAction::Check),
            "reset" => Ok(ChangeAction::Reset),
            other => Err(FileOpError::InvalidArgument(format!(
                "Invalid action: {other}. Must be one of: 'scan', 'check', 'reset'"
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChangeReport {
    pub directory: String,
    pub action: ChangeAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_tracked: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracked_files: Option<Vec<String>>,
    #[serde(flatten)]
    pub changes: Option<ChangeSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_changes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_scan: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evicted_directory: Option<String>,
}

impl ChangeReport {
    fn new(directory: &Path, action: ChangeAction) -> Self {
        Self {
            directory: directory.display().to_string(),
            action,
            result: None,
            files_tracked: None,
            tracked_files: None,
            changes: None,
            total_changes: None,
            previous_scan: None,
            evicted_directory: None,
        }
    }
}

/// Scans a directory, checks it against the last scan, or forgets the scan.
#[allow(clippy::too_many_arguments)]
pub fn detect_file_changes(
    workspace: &Workspace,
    directory_path: &str,
    action: &str,
    pattern: &str,
    use_regex: bool,
    recursive: bool,
    max_depth: Option<usize>,
    use_base_dir: bool,
) -> Result<ChangeReport> {
    let action: ChangeAction = action.parse()?;
    let directory = workspace.resolve(directory_path, use_base_dir)?;
    if !directory.is_dir() {
        return Err(FileOpError::not_found("Directory", &directory));
    }
    let mut report = ChangeReport::new(&directory, action);

    match action {
        ChangeAction::Scan => {
            let files = collect_stamps(&directory, pattern, use_regex, recursive, max_depth)?;
            report.files_tracked = Some(files.len());
            report.tracked_files = Some(files.keys().map(|p| p.display().to_string()).collect());
            let evicted = workspace.tracker().record(&directory, files, Utc::now());
            if let Some(evicted) = evicted {
                tracing::debug!(evicted = %evicted.display(), "evicted change-tracking snapshot");
                report.evicted_directory = Some(evicted.display().to_string());
            }
        }
        ChangeAction::Check => {
            let previous = workspace.tracker().get(&directory).cloned().ok_or_else(|| {
                FileOpError::NotFound(format!(
                    "No previous scan found for {}. Perform a 'scan' action first.",
                    directory.display()
                ))
            })?;
            let current = collect_stamps(&directory, pattern, use_regex, recursive, max_depth)?;
            let changes = ChangeSet::between(&previous.files, &current);

            report.files_tracked = Some(current.len());
            report.total_changes = Some(changes.total());
            report.previous_scan = Some(previous.scanned_at);
            report.changes = Some(changes);
            workspace.tracker().record(&directory, current, Utc::now());
        }
        ChangeAction::Reset => {
            workspace.tracker().remove(&directory);
            report.result = Some(format!(
                "Tracking reset for directory: {}",
                directory.display()
            ));
        }
    }
    Ok(report)
}

fn collect_stamps(
    directory: &Path,
    pattern: &str,
    use_regex: bool,
    recursive: bool,
    max_depth: Option<usize>,
) -> Result<BTreeMap<PathBuf, FileStamp>> {
    let pattern = NamePattern::new(pattern, use_regex)?;
    let files = collect_matching_files(
        directory,
        &pattern,
        ScanDepth {
            recursive,
            max_depth,
        },
    )?;
    Ok(files
        .into_iter()
        .filter_map(|path| FileStamp::of(&path).map(|stamp| (path, stamp)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::Builder;

    fn setup_workspace() -> (tempfile::TempDir, Workspace) {
        let tmp_dir = Builder::new().prefix("test-changes-").tempdir().unwrap();
        let root = tmp_dir.path();
        fs::create_dir_all(root.join("watched/sub")).unwrap();
        fs::write(root.join("watched/a.txt"), "a").unwrap();
        fs::write(root.join("watched/b.txt"), "b").unwrap();
        fs::write(root.join("watched/sub/c.txt"), "c").unwrap();
        let workspace = Workspace::new(root);
        (tmp_dir, workspace)
    }

    fn run(ws: &Workspace, action: &str) -> Result<ChangeReport> {
        detect_file_changes(ws, "watched", action, "*", false, true, None, true)
    }

    #[test]
    fn test_scan_then_check_without_changes() {
        let (_tmp_dir, ws) = setup_workspace();
        let scan = run(&ws, "scan").unwrap();
        assert_eq!(scan.files_tracked, Some(3));

        let check = run(&ws, "check").unwrap();
        assert_eq!(check.total_changes, Some(0));
        assert_eq!(check.changes, Some(ChangeSet::default()));
    }

    #[test]
    fn test_check_reports_changed_new_and_deleted() {
        let (tmp_dir, ws) = setup_workspace();
        run(&ws, "scan").unwrap();

        let root = tmp_dir.path().join("watched");
        fs::write(root.join("a.txt"), "a but longer").unwrap();
        fs::write(root.join("sub/new.txt"), "n").unwrap();
        fs::remove_file(root.join("b.txt")).unwrap();

        let check = run(&ws, "check").unwrap();
        let changes = check.changes.unwrap();
        assert_eq!(changes.changed_files, vec![root.join("a.txt").display().to_string()]);
        assert_eq!(changes.new_files, vec![root.join("sub/new.txt").display().to_string()]);
        assert_eq!(changes.deleted_files, vec![root.join("b.txt").display().to_string()]);
        assert_eq!(check.total_changes, Some(3));

        // The check replaced the snapshot.
        let again = run(&ws, "check").unwrap();
        assert_eq!(again.total_changes, Some(0));
    }

    #[test]
    fn test_same_size_rewrite_is_detected_by_mtime() {
        let (tmp_dir, ws) = setup_workspace();
        run(&ws, "scan").unwrap();

        let path = tmp_dir.path().join("watched/a.txt");
        fs::write(&path, "z").unwrap();
        let later = SystemTime::now() + std::time::Duration::from_secs(10);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        let check = run(&ws, "check").unwrap();
        let changes = check.changes.unwrap();
        assert_eq!(changes.changed_files, vec![path.display().to_string()]);
        assert!(changes.new_files.is_empty());
        assert!(changes.deleted_files.is_empty());
        assert_eq!(check.total_changes, Some(1));
    }

    #[test]
    fn test_check_without_scan_and_reset() {
        let (_tmp_dir, ws) = setup_workspace();
        let err = run(&ws, "check").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        run(&ws, "scan").unwrap();
        run(&ws, "reset").unwrap();
        assert_eq!(run(&ws, "check").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_scan_respects_depth_and_pattern() {
        let (_tmp_dir, ws) = setup_workspace();
        let report =
            detect_file_changes(&ws, "watched", "scan", "*.txt", false, true, Some(0), true)
                .unwrap();
        assert_eq!(report.files_tracked, Some(2));

        let report =
            detect_file_changes(&ws, "watched", "scan", "^c", true, true, None, true).unwrap();
        assert_eq!(report.files_tracked, Some(1));
    }

    #[test]
    fn test_tracker_evicts_oldest_scan() {
        let mut tracker = ChangeTracker::new(2);
        let now = Utc::now();
        assert_eq!(tracker.record(Path::new("/a"), BTreeMap::new(), now), None);
        assert_eq!(tracker.record(Path::new("/b"), BTreeMap::new(), now), None);
        tracker.record(Path::new("/a"), BTreeMap::new(), now);

        let evicted = tracker.record(Path::new("/c"), BTreeMap::new(), now);
        assert_eq!(evicted, Some(PathBuf::from("/b")));
        assert_eq!(tracker.len(), 2);
        assert!(tracker.get(Path::new("/a")).is_some());
    }
}
