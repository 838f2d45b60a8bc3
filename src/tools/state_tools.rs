//! Tools backed by the workspace's in-memory stores: file versions, directory
//! snapshots and live watchers.

use crate::changes;
use crate::error::Result;
use crate::tools::{
    FunctionDescription, Tool, default_true, describe, object_schema, parse_args, to_json,
};
use crate::versioning::{self, VersionAction};
use crate::watcher;
use crate::workspace::Workspace;
use async_trait::async_trait;
use console::style;
use serde::Deserialize;
use serde_json::{Value, json};

fn default_version_action() -> String {
    "save".to_string()
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct VersioningArgs {
    file_path: String,
    #[serde(default = "default_version_action")]
    action: String,
    #[serde(default)]
    version_name: Option<String>,
    #[serde(default)]
    restore_version: Option<String>,
    #[serde(default)]
    list_all: bool,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

pub struct FileVersioningTool;

#[async_trait]
impl Tool for FileVersioningTool {
    fn name(&self) -> &'static str {
        "file_versioning"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            r#"Keeps in-memory versions of a file for the lifetime of the agent.
- save: store the current content, optionally under version_name (default: a timestamp)
- restore: write the version named restore_version back to the file
- list: show stored versions, with content when list_all is true
- compare: diff the two most recent versions
Only a limited number of versions per file is kept; the oldest are dropped first."#,
            object_schema(
                json!({
                    "file_path": { "type": "string", "description": "File to version." },
                    "action": { "type": "string", "enum": ["save", "restore", "list", "compare"] },
                    "version_name": { "type": "string", "description": "Label for save." },
                    "restore_version": { "type": "string", "description": "Version to restore." },
                    "list_all": { "type": "boolean", "description": "Include content when listing." }
                }),
                &["file_path"],
            ),
        )
    }

    fn preview(&self, args: &Value, workspace: &Workspace) -> Result<String> {
        let args: VersioningArgs = parse_args(args)?;
        let path = workspace.resolve(&args.file_path, args.use_data_dir)?;
        let detail = match (args.action.as_str(), &args.restore_version) {
            ("restore", Some(version)) => format!(" to version {}", style(version).yellow()),
            ("save", Some(label)) => format!(" as {}", style(label).green()),
            _ => String::new(),
        };
        Ok(format!(
            "{} {}{}",
            style(&args.action).bold(),
            path.display(),
            detail
        ))
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: VersioningArgs = parse_args(args)?;
        to_json(versioning::file_versioning(
            workspace,
            &args.file_path,
            &args.action,
            args.version_name.as_deref(),
            args.restore_version.as_deref(),
            args.list_all,
            args.use_data_dir,
        )?)
    }

    /// Restoring overwrites the current file content.
    fn is_safe_for_auto_execute(&self, args: &Value, _workspace: &Workspace) -> Result<bool> {
        let args: VersioningArgs = parse_args(args)?;
        let action: VersionAction = args.action.parse()?;
        Ok(action != VersionAction::Restore)
    }
}

fn default_change_action() -> String {
    "scan".to_string()
}

fn default_pattern() -> String {
    "*".to_string()
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct ChangesArgs {
    directory_path: String,
    #[serde(default = "default_change_action")]
    action: String,
    #[serde(default = "default_pattern")]
    pattern: String,
    #[serde(default)]
    use_regex: bool,
    #[serde(default = "default_true")]
    recursive: bool,
    #[serde(default)]
    max_depth: Option<usize>,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

pub struct DetectChangesTool;

#[async_trait]
impl Tool for DetectChangesTool {
    fn name(&self) -> &'static str {
        "detect_file_changes"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Records a snapshot of a directory (scan), reports files that were changed, added or deleted since that snapshot (check), or discards it (reset). A file counts as changed when its size or modification time differs.",
            object_schema(
                json!({
                    "directory_path": { "type": "string", "description": "Directory to track." },
                    "action": { "type": "string", "enum": ["scan", "check", "reset"] },
                    "pattern": { "type": "string", "description": "Glob (default \"*\") or regex for file names." },
                    "use_regex": { "type": "boolean" },
                    "recursive": { "type": "boolean", "description": "Default true." },
                    "max_depth": { "type": "integer", "minimum": 0 }
                }),
                &["directory_path"],
            ),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: ChangesArgs = parse_args(args)?;
        to_json(changes::detect_file_changes(
            workspace,
            &args.directory_path,
            &args.action,
            &args.pattern,
            args.use_regex,
            args.recursive,
            args.max_depth,
            args.use_data_dir,
        )?)
    }
}

fn default_watch_action() -> String {
    "start".to_string()
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct WatchArgs {
    #[serde(default)]
    directory_path: String,
    #[serde(default = "default_watch_action")]
    action: String,
    #[serde(default)]
    observer_id: Option<String>,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

pub struct WatchDirectoryTool;

#[async_trait]
impl Tool for WatchDirectoryTool {
    fn name(&self) -> &'static str {
        "watch_directory"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            r#"Watches a directory tree for file events in the background.
- start: begin watching directory_path; returns the observer_id
- events: return the events collected so far by observer_id
- stop: stop observer_id and return its remaining events
- list: show all active observers"#,
            object_schema(
                json!({
                    "directory_path": { "type": "string", "description": "Directory to watch (start only)." },
                    "action": { "type": "string", "enum": ["start", "events", "stop", "list"] },
                    "observer_id": { "type": "string", "description": "Observer to query or stop. Optional custom id for start." }
                }),
                &[],
            ),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: WatchArgs = parse_args(args)?;
        to_json(watcher::watch_directory(
            workspace,
            &args.directory_path,
            &args.action,
            args.observer_id.as_deref(),
            args.use_data_dir,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::Builder;

    fn setup_workspace() -> (tempfile::TempDir, Workspace) {
        let tmp_dir = Builder::new().prefix("test-state-tools-").tempdir().unwrap();
        fs::write(tmp_dir.path().join("notes.txt"), "first").unwrap();
        let workspace = Workspace::new(tmp_dir.path());
        (tmp_dir, workspace)
    }

    #[tokio::test]
    async fn test_versioning_save_restore() {
        let (tmp_dir, ws) = setup_workspace();
        let saved = FileVersioningTool
            .execute(&json!({"file_path": "notes.txt", "version_name": "v1"}), &ws)
            .await
            .unwrap();
        assert_eq!(saved["version_name"], "v1");

        fs::write(tmp_dir.path().join("notes.txt"), "second").unwrap();

        let restore = json!({"file_path": "notes.txt", "action": "restore", "restore_version": "v1"});
        assert!(!FileVersioningTool.is_safe_for_auto_execute(&restore, &ws).unwrap());
        FileVersioningTool.execute(&restore, &ws).await.unwrap();
        assert_eq!(
            fs::read_to_string(tmp_dir.path().join("notes.txt")).unwrap(),
            "first"
        );
    }

    #[tokio::test]
    async fn test_detect_changes_defaults_to_scan() {
        let (tmp_dir, ws) = setup_workspace();
        let scanned = DetectChangesTool
            .execute(&json!({"directory_path": ""}), &ws)
            .await
            .unwrap();
        assert_eq!(scanned["files_tracked"], 1);

        fs::write(tmp_dir.path().join("new.txt"), "x").unwrap();
        let checked = DetectChangesTool
            .execute(&json!({"directory_path": "", "action": "check"}), &ws)
            .await
            .unwrap();
        assert_eq!(checked["total_changes"], 1);
        let new_file = checked["new_files"][0].as_str().unwrap();
        assert!(new_file.ends_with("new.txt"));
    }

    #[tokio::test]
    async fn test_watch_unknown_observer() {
        let (_tmp_dir, ws) = setup_workspace();
        let err = WatchDirectoryTool
            .execute(&json!({"action": "events", "observer_id": "nope"}), &ws)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = WatchDirectoryTool
            .execute(&json!({"action": "stop"}), &ws)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let listed = WatchDirectoryTool
            .execute(&json!({"action": "list"}), &ws)
            .await
            .unwrap();
        assert_eq!(listed["active_observers"], 0);
    }
}
