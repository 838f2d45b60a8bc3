use crate::batch::{self, BatchOperation, BatchRequest, RecursiveOperation};
use crate::error::Result;
use crate::tools::{
    FunctionDescription, Tool, default_true, describe, object_schema, parse_args, to_json,
};
use crate::workspace::Workspace;
use async_trait::async_trait;
use console::style;
use serde::Deserialize;
use serde_json::{Value, json};

pub struct BatchProcessTool;

#[async_trait]
impl Tool for BatchProcessTool {
    fn name(&self) -> &'static str {
        "batch_process_files"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            r#"Applies one operation to every file in a directory whose name matches a pattern. Runs as a dry run unless dry_run is false.

Operations and their operation_args:
- copy, move: "destination" (directory)
- delete
- rename: "rename_pattern" with {index} (1-based), {name} (stem) and {ext} placeholders, e.g. "photo_{index}"
- hash: "algorithm" (md5, sha1, sha256, sha512; default md5)
- transform: "transform_function" (uppercase, lowercase, replace); replace also needs "search_text" and "replace_text"

Files whose destination already exists, or is already taken by an earlier file in the same batch, are skipped."#,
            object_schema(
                json!({
                    "directory_path": { "type": "string", "description": "Directory to process." },
                    "operation": {
                        "type": "string",
                        "enum": ["copy", "move", "delete", "rename", "hash", "transform"]
                    },
                    "pattern": { "type": "string", "description": "Glob (default \"*\") or regex matched against file names." },
                    "recursive": { "type": "boolean", "description": "Include subdirectories. Default true." },
                    "use_regex": { "type": "boolean", "description": "Treat pattern as a regex. Default false." },
                    "max_files": { "type": "integer", "minimum": 0, "description": "Process at most this many files." },
                    "dry_run": { "type": "boolean", "description": "Only plan, change nothing. Default true." },
                    "operation_args": {
                        "type": "object",
                        "properties": {
                            "destination": { "type": "string" },
                            "rename_pattern": { "type": "string" },
                            "algorithm": { "type": "string" },
                            "transform_function": { "type": "string" },
                            "search_text": { "type": "string" },
                            "replace_text": { "type": "string" }
                        },
                        "additionalProperties": false
                    }
                }),
                &["directory_path", "operation"],
            ),
        )
    }

    fn preview(&self, args: &Value, workspace: &Workspace) -> Result<String> {
        let mut request: BatchRequest = parse_args(args)?;
        request.dry_run = true;
        let report = batch::batch_process_files(workspace, &request)?;

        let mut lines = vec![format!(
            "{} on {} matching file(s):",
            style(&report.operation).bold(),
            report.total_matches
        )];
        for result in &report.processed_files {
            let target = result
                .plan
                .destination
                .as_deref()
                .or(result.plan.hash.as_deref())
                .unwrap_or("");
            lines.push(format!(
                "  {:?} {} {}",
                result.status,
                result.plan.original_path,
                style(target).green()
            ));
        }
        Ok(lines.join("\n"))
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let request: BatchRequest = parse_args(args)?;
        to_json(batch::batch_process_files(workspace, &request)?)
    }

    fn is_safe_for_auto_execute(&self, args: &Value, workspace: &Workspace) -> Result<bool> {
        let request: BatchRequest = parse_args(args)?;
        if request.dry_run {
            return Ok(true);
        }
        let operation = BatchOperation::parse(
            workspace,
            &request.operation,
            &request.operation_args,
            request.use_base_dir,
        )?;
        Ok(!operation.is_mutating())
    }
}

fn default_pattern() -> String {
    "*".to_string()
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RecursiveArgs {
    directory_path: String,
    operation: String,
    #[serde(default = "default_pattern")]
    pattern: String,
    #[serde(default)]
    use_regex: bool,
    #[serde(default)]
    max_depth: Option<usize>,
    #[serde(default = "default_true")]
    dry_run: bool,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

pub struct RecursiveOperationTool;

#[async_trait]
impl Tool for RecursiveOperationTool {
    fn name(&self) -> &'static str {
        "recursive_file_operation"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Walks a directory tree and counts, lists, deletes or backs up (as <file>.bak) every file whose name matches. Depth 0 is the directory itself. Dry run by default.",
            object_schema(
                json!({
                    "directory_path": { "type": "string", "description": "Directory to walk." },
                    "operation": { "type": "string", "enum": ["count", "list", "delete", "backup"] },
                    "pattern": { "type": "string", "description": "Glob (default \"*\") or regex." },
                    "use_regex": { "type": "boolean" },
                    "max_depth": { "type": "integer", "minimum": 0 },
                    "dry_run": { "type": "boolean", "description": "Default true." }
                }),
                &["directory_path", "operation"],
            ),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: RecursiveArgs = parse_args(args)?;
        to_json(batch::recursive_file_operation(
            workspace,
            &args.directory_path,
            &args.operation,
            &args.pattern,
            args.use_regex,
            args.max_depth,
            args.dry_run,
            args.use_data_dir,
        )?)
    }

    fn is_safe_for_auto_execute(&self, args: &Value, _workspace: &Workspace) -> Result<bool> {
        let args: RecursiveArgs = parse_args(args)?;
        let operation: RecursiveOperation = args.operation.parse()?;
        Ok(args.dry_run
            || matches!(
                operation,
                RecursiveOperation::Count | RecursiveOperation::List
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::Builder;

    fn setup_workspace() -> (tempfile::TempDir, Workspace) {
        let tmp_dir = Builder::new().prefix("test-batch-tools-").tempdir().unwrap();
        fs::write(tmp_dir.path().join("a.txt"), "a").unwrap();
        fs::write(tmp_dir.path().join("b.txt"), "b").unwrap();
        let workspace = Workspace::new(tmp_dir.path());
        (tmp_dir, workspace)
    }

    #[test]
    fn test_safety_depends_on_dry_run_and_operation() {
        let (_tmp_dir, ws) = setup_workspace();
        let dry = json!({"directory_path": "", "operation": "delete"});
        assert!(BatchProcessTool.is_safe_for_auto_execute(&dry, &ws).unwrap());

        let real = json!({"directory_path": "", "operation": "delete", "dry_run": false});
        assert!(!BatchProcessTool.is_safe_for_auto_execute(&real, &ws).unwrap());

        let hash = json!({"directory_path": "", "operation": "hash", "dry_run": false});
        assert!(BatchProcessTool.is_safe_for_auto_execute(&hash, &ws).unwrap());

        let count = json!({"directory_path": "", "operation": "count", "dry_run": false});
        assert!(RecursiveOperationTool.is_safe_for_auto_execute(&count, &ws).unwrap());
    }

    #[tokio::test]
    async fn test_batch_preview_does_not_mutate() {
        let (tmp_dir, ws) = setup_workspace();
        let args = json!({
            "directory_path": "",
            "operation": "delete",
            "pattern": "*.txt",
            "dry_run": false
        });
        let preview = BatchProcessTool.preview(&args, &ws).unwrap();
        assert!(preview.contains("2 matching file(s)"));
        assert!(tmp_dir.path().join("a.txt").exists());

        let report = BatchProcessTool.execute(&args, &ws).await.unwrap();
        assert_eq!(report["total_processed"], 2);
        assert!(!tmp_dir.path().join("a.txt").exists());
    }
}
