use crate::diff::colored_diff;
use crate::error::Result;
use crate::file_ops;
use crate::tools::{FunctionDescription, Tool, default_true, describe, object_schema, parse_args};
use crate::workspace::{Workspace, current_working_directory};
use async_trait::async_trait;
use console::style;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fs;

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct FilePathArgs {
    file_path: String,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct FileContentArgs {
    file_path: String,
    content: String,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct FolderArgs {
    folder_path: String,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RenameArgs {
    old_path: String,
    new_path: String,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct CopyArgs {
    source_path: String,
    destination_path: String,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

fn file_path_schema(description: &str) -> Value {
    object_schema(
        json!({ "file_path": { "type": "string", "description": description } }),
        &["file_path"],
    )
}

fn file_content_schema(path_description: &str, content_description: &str) -> Value {
    object_schema(
        json!({
            "file_path": { "type": "string", "description": path_description },
            "content": { "type": "string", "description": content_description }
        }),
        &["file_path", "content"],
    )
}

fn folder_schema() -> Value {
    object_schema(
        json!({ "folder_path": { "type": "string", "description": "Path to the folder." } }),
        &["folder_path"],
    )
}

fn added_lines(content: &str) -> String {
    content
        .lines()
        .map(|line| style(format!("+ {line}")).green().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Reads a UTF-8 text file and returns its full content.",
            file_path_schema("Path to the file to read."),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: FilePathArgs = parse_args(args)?;
        let content = file_ops::read_file(workspace, &args.file_path, args.use_data_dir)?;
        Ok(Value::String(content))
    }
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_to_file"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Writes content to a file, creating parent directories and overwriting any existing content.",
            file_content_schema("Path to the file to write.", "The complete new content."),
        )
    }

    fn preview(&self, args: &Value, workspace: &Workspace) -> Result<String> {
        let args: FileContentArgs = parse_args(args)?;
        let path = workspace.resolve(&args.file_path, args.use_data_dir)?;
        match fs::read_to_string(&path) {
            Ok(old) => Ok(format!(
                "Overwrite {}:\n{}",
                style(path.display()).bold(),
                colored_diff(&old, &args.content)
            )),
            Err(_) => Ok(format!(
                "Write new file {}:\n{}",
                style(path.display()).bold(),
                added_lines(&args.content)
            )),
        }
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: FileContentArgs = parse_args(args)?;
        let message =
            file_ops::write_to_file(workspace, &args.file_path, &args.content, args.use_data_dir)?;
        Ok(Value::String(message))
    }

    fn is_safe_for_auto_execute(&self, args: &Value, workspace: &Workspace) -> Result<bool> {
        let args: FileContentArgs = parse_args(args)?;
        Ok(!workspace.resolve(&args.file_path, args.use_data_dir)?.exists())
    }
}

pub struct CreateFileTool;

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &'static str {
        "create_new_file"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Creates a new file with optional initial content. Fails if anything already exists at the path.",
            object_schema(
                json!({
                    "file_path": { "type": "string", "description": "Path of the file to create." },
                    "content": { "type": "string", "description": "Initial content. Defaults to empty." }
                }),
                &["file_path"],
            ),
        )
    }

    fn preview(&self, args: &Value, workspace: &Workspace) -> Result<String> {
        let args: FileContentArgs = parse_args(args)?;
        let path = workspace.resolve(&args.file_path, args.use_data_dir)?;
        Ok(format!(
            "Create {}:\n{}",
            style(path.display()).bold(),
            added_lines(&args.content)
        ))
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: FileContentArgs = parse_args(args)?;
        let message =
            file_ops::create_new_file(workspace, &args.file_path, &args.content, args.use_data_dir)?;
        Ok(Value::String(message))
    }
}

pub struct CreateFolderTool;

#[async_trait]
impl Tool for CreateFolderTool {
    fn name(&self) -> &'static str {
        "create_new_folder"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Creates a folder and any missing parent folders.",
            folder_schema(),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: FolderArgs = parse_args(args)?;
        let message = file_ops::create_new_folder(workspace, &args.folder_path, args.use_data_dir)?;
        Ok(Value::String(message))
    }
}

pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &'static str {
        "delete_file"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Deletes a single file.",
            file_path_schema("Path to the file to delete."),
        )
    }

    fn preview(&self, args: &Value, workspace: &Workspace) -> Result<String> {
        let args: FilePathArgs = parse_args(args)?;
        let path = workspace.resolve(&args.file_path, args.use_data_dir)?;
        Ok(style(format!("Delete file {}", path.display())).red().to_string())
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: FilePathArgs = parse_args(args)?;
        let message = file_ops::delete_file(workspace, &args.file_path, args.use_data_dir)?;
        Ok(Value::String(message))
    }

    fn is_safe_for_auto_execute(&self, _args: &Value, _workspace: &Workspace) -> Result<bool> {
        Ok(false)
    }
}

pub struct DeleteFolderTool;

#[async_trait]
impl Tool for DeleteFolderTool {
    fn name(&self) -> &'static str {
        "delete_folder"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Deletes a folder and everything inside it. The base directory itself cannot be deleted.",
            folder_schema(),
        )
    }

    fn preview(&self, args: &Value, workspace: &Workspace) -> Result<String> {
        let args: FolderArgs = parse_args(args)?;
        let path = workspace.resolve(&args.folder_path, args.use_data_dir)?;
        Ok(style(format!("Recursively delete folder {}", path.display()))
            .red()
            .to_string())
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: FolderArgs = parse_args(args)?;
        let message = file_ops::delete_folder(workspace, &args.folder_path, args.use_data_dir)?;
        Ok(Value::String(message))
    }

    fn is_safe_for_auto_execute(&self, _args: &Value, _workspace: &Workspace) -> Result<bool> {
        Ok(false)
    }
}

pub struct AppendFileTool;

#[async_trait]
impl Tool for AppendFileTool {
    fn name(&self) -> &'static str {
        "append_to_file"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Appends content to the end of an existing file.",
            file_content_schema("Path to an existing file.", "Text to append."),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: FileContentArgs = parse_args(args)?;
        let message =
            file_ops::append_to_file(workspace, &args.file_path, &args.content, args.use_data_dir)?;
        Ok(Value::String(message))
    }
}

pub struct RenameFileTool;

#[async_trait]
impl Tool for RenameFileTool {
    fn name(&self) -> &'static str {
        "rename_file"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Renames or moves a file. Fails if the destination already exists.",
            object_schema(
                json!({
                    "old_path": { "type": "string", "description": "Current path of the file." },
                    "new_path": { "type": "string", "description": "New path of the file." }
                }),
                &["old_path", "new_path"],
            ),
        )
    }

    fn preview(&self, args: &Value, workspace: &Workspace) -> Result<String> {
        let args: RenameArgs = parse_args(args)?;
        let old = workspace.resolve(&args.old_path, args.use_data_dir)?;
        let new = workspace.resolve(&args.new_path, args.use_data_dir)?;
        Ok(format!(
            "Move {} -> {}",
            style(old.display()).red(),
            style(new.display()).green()
        ))
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: RenameArgs = parse_args(args)?;
        let message =
            file_ops::rename_file(workspace, &args.old_path, &args.new_path, args.use_data_dir)?;
        Ok(Value::String(message))
    }

    fn is_safe_for_auto_execute(&self, _args: &Value, _workspace: &Workspace) -> Result<bool> {
        Ok(false)
    }
}

pub struct CopyFileTool;

#[async_trait]
impl Tool for CopyFileTool {
    fn name(&self) -> &'static str {
        "copy_file"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Copies a file. Fails if the destination already exists.",
            object_schema(
                json!({
                    "source_path": { "type": "string", "description": "File to copy." },
                    "destination_path": { "type": "string", "description": "Path of the copy." }
                }),
                &["source_path", "destination_path"],
            ),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: CopyArgs = parse_args(args)?;
        let message = file_ops::copy_file(
            workspace,
            &args.source_path,
            &args.destination_path,
            args.use_data_dir,
        )?;
        Ok(Value::String(message))
    }
}

/// Which predicate a [`PathCheckTool`] evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathCheck {
    FileExists,
    IsFile,
    IsDirectory,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct PathCheckArgs {
    #[serde(alias = "file_path")]
    path: String,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

/// Answers a yes/no question about a path.
pub struct PathCheckTool(pub PathCheck);

#[async_trait]
impl Tool for PathCheckTool {
    fn name(&self) -> &'static str {
        match self.0 {
            PathCheck::FileExists => "check_file_exists",
            PathCheck::IsFile => "check_is_file",
            PathCheck::IsDirectory => "check_is_directory",
        }
    }

    fn schema(&self) -> FunctionDescription {
        let (description, key) = match self.0 {
            PathCheck::FileExists => ("Returns true if a file exists at the path.", "file_path"),
            PathCheck::IsFile => ("Returns true if the path is a regular file.", "path"),
            PathCheck::IsDirectory => ("Returns true if the path is a directory.", "path"),
        };
        let mut properties = serde_json::Map::new();
        properties.insert(
            key.to_string(),
            json!({ "type": "string", "description": "The path to check." }),
        );
        describe(
            self.name(),
            description,
            object_schema(Value::Object(properties), &[key]),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: PathCheckArgs = parse_args(args)?;
        let answer = match self.0 {
            PathCheck::FileExists => {
                file_ops::check_file_exists(workspace, &args.path, args.use_data_dir)?
            }
            PathCheck::IsFile => file_ops::check_is_file(workspace, &args.path, args.use_data_dir)?,
            PathCheck::IsDirectory => {
                file_ops::check_is_directory(workspace, &args.path, args.use_data_dir)?
            }
        };
        Ok(Value::Bool(answer))
    }
}

pub struct GetWorkingDirectoryTool;

#[async_trait]
impl Tool for GetWorkingDirectoryTool {
    fn name(&self) -> &'static str {
        "get_current_working_directory"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Returns the working directory of the process. This is not the base directory.",
            json!({ "type": "object", "properties": {}, "additionalProperties": false }),
        )
    }

    async fn execute(&self, _args: &Value, _workspace: &Workspace) -> Result<Value> {
        Ok(Value::String(current_working_directory()?))
    }
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct SetDirectoryArgs {
    new_directory: String,
}

pub struct SetWorkingDirectoryTool;

#[async_trait]
impl Tool for SetWorkingDirectoryTool {
    fn name(&self) -> &'static str {
        "set_working_directory"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Changes the base directory that relative paths resolve against. The directory is created if it does not exist.",
            json!({
                "type": "object",
                "properties": {
                    "new_directory": {
                        "type": "string",
                        "description": "The new base directory, preferably absolute."
                    }
                },
                "required": ["new_directory"],
                "additionalProperties": false
            }),
        )
    }

    fn preview(&self, args: &Value, workspace: &Workspace) -> Result<String> {
        let args: SetDirectoryArgs = parse_args(args)?;
        Ok(format!(
            "Change base directory {} -> {}",
            workspace.base_dir().display(),
            style(&args.new_directory).bold()
        ))
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: SetDirectoryArgs = parse_args(args)?;
        let change = workspace.set_base_dir(&args.new_directory)?;
        crate::tools::to_json(change)
    }

    /// Moving the base directory widens or narrows what every later call may touch.
    fn is_safe_for_auto_execute(&self, args: &Value, _workspace: &Workspace) -> Result<bool> {
        parse_args::<SetDirectoryArgs>(args)?;
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::Builder;

    fn setup_workspace() -> (tempfile::TempDir, Workspace) {
        let tmp_dir = Builder::new().prefix("test-file-tools-").tempdir().unwrap();
        let workspace = Workspace::new(tmp_dir.path());
        (tmp_dir, workspace)
    }

    #[tokio::test]
    async fn test_create_append_read() {
        let (_tmp_dir, ws) = setup_workspace();
        CreateFileTool
            .execute(&json!({"file_path": "data/a.txt", "content": "hello"}), &ws)
            .await
            .unwrap();
        AppendFileTool
            .execute(&json!({"file_path": "data/a.txt", "content": " world"}), &ws)
            .await
            .unwrap();
        let content = ReadFileTool
            .execute(&json!({"file_path": "data/a.txt"}), &ws)
            .await
            .unwrap();
        assert_eq!(content, json!("hello world"));
    }

    #[tokio::test]
    async fn test_write_is_unsafe_only_when_overwriting() {
        let (tmp_dir, ws) = setup_workspace();
        let args = json!({"file_path": "notes.txt", "content": "new\n"});
        assert!(WriteFileTool.is_safe_for_auto_execute(&args, &ws).unwrap());

        fs::write(tmp_dir.path().join("notes.txt"), "old\n").unwrap();
        assert!(!WriteFileTool.is_safe_for_auto_execute(&args, &ws).unwrap());
        let preview = WriteFileTool.preview(&args, &ws).unwrap();
        assert!(preview.contains("Overwrite"));
        assert!(console::strip_ansi_codes(&preview).contains("+ new"));
    }

    #[tokio::test]
    async fn test_path_checks() {
        let (tmp_dir, ws) = setup_workspace();
        fs::create_dir(tmp_dir.path().join("dir")).unwrap();
        fs::write(tmp_dir.path().join("file.txt"), "x").unwrap();

        let exists = PathCheckTool(PathCheck::FileExists)
            .execute(&json!({"file_path": "file.txt"}), &ws)
            .await
            .unwrap();
        assert_eq!(exists, json!(true));

        let is_dir = PathCheckTool(PathCheck::IsDirectory)
            .execute(&json!({"path": "file.txt"}), &ws)
            .await
            .unwrap();
        assert_eq!(is_dir, json!(false));

        let is_dir = PathCheckTool(PathCheck::IsDirectory)
            .execute(&json!({"path": "dir"}), &ws)
            .await
            .unwrap();
        assert_eq!(is_dir, json!(true));
    }

    #[tokio::test]
    async fn test_set_working_directory() {
        let (tmp_dir, ws) = setup_workspace();
        let target = tmp_dir.path().join("elsewhere");
        let result = SetWorkingDirectoryTool
            .execute(&json!({"new_directory": target.to_str().unwrap()}), &ws)
            .await
            .unwrap();
        assert_eq!(result["created"], json!(true));
        assert_eq!(ws.base_dir(), target);
    }

    #[test]
    fn test_set_working_directory_needs_confirmation() {
        let (tmp_dir, ws) = setup_workspace();
        let inside = json!({"new_directory": tmp_dir.path().join("sub").to_str().unwrap()});
        assert!(!SetWorkingDirectoryTool.is_safe_for_auto_execute(&inside, &ws).unwrap());
        let outside = json!({"new_directory": "/"});
        assert!(!SetWorkingDirectoryTool.is_safe_for_auto_execute(&outside, &ws).unwrap());
        assert!(GetWorkingDirectoryTool.is_safe_for_auto_execute(&json!({}), &ws).unwrap());
    }

    #[tokio::test]
    async fn test_arguments_must_match_schema() {
        let (tmp_dir, ws) = setup_workspace();
        let err = WriteFileTool
            .execute(&json!({"file_path": "a.txt"}), &ws)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = WriteFileTool
            .execute(&json!({"file_path": "a.txt", "contents": "typo"}), &ws)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!tmp_dir.path().join("a.txt").exists());

        WriteFileTool
            .execute(&json!({"file_path": "a.txt", "content": "", "use_data_dir": true}), &ws)
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(tmp_dir.path().join("a.txt")).unwrap(), "");
    }

    #[tokio::test]
    async fn test_missing_arguments_are_invalid() {
        let (_tmp_dir, ws) = setup_workspace();
        let err = CopyFileTool
            .execute(&json!({"source_path": "a"}), &ws)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
