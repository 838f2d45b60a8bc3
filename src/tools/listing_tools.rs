use crate::error::Result;
use crate::list_files;
use crate::permissions;
use crate::tools::{
    FunctionDescription, Tool, default_true, describe, object_schema, parse_args, to_json,
};
use crate::workspace::Workspace;
use async_trait::async_trait;
use console::style;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct DirectoryArgs {
    directory_path: String,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

fn directory_schema() -> Value {
    object_schema(
        json!({
            "directory_path": {
                "type": "string",
                "description": "Directory to list. Use an empty string for the base directory."
            }
        }),
        &["directory_path"],
    )
}

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &'static str {
        "list_files_with_metadata"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Lists the direct children of a directory with type, size, creation and modification time.",
            directory_schema(),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: DirectoryArgs = parse_args(args)?;
        to_json(list_files::list_files_with_metadata(
            workspace,
            &args.directory_path,
            args.use_data_dir,
        )?)
    }
}

pub struct FolderTreeTool;

#[async_trait]
impl Tool for FolderTreeTool {
    fn name(&self) -> &'static str {
        "list_folder_tree"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Recursively lists all files and folders below a directory, with paths relative to it.",
            directory_schema(),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: DirectoryArgs = parse_args(args)?;
        to_json(list_files::list_folder_tree(
            workspace,
            &args.directory_path,
            args.use_data_dir,
        )?)
    }
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct PathArgs {
    #[serde(alias = "file_path")]
    path: String,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

fn path_schema(key: &str, description: &str) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(
        key.to_string(),
        json!({ "type": "string", "description": description }),
    );
    object_schema(Value::Object(properties), &[key])
}

pub struct GetPermissionsTool;

#[async_trait]
impl Tool for GetPermissionsTool {
    fn name(&self) -> &'static str {
        "get_file_permissions"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Returns the permission bits of a file or directory as an octal string such as 0o644.",
            path_schema("path", "File or directory to inspect."),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: PathArgs = parse_args(args)?;
        let mode = permissions::get_file_permissions(workspace, &args.path, args.use_data_dir)?;
        Ok(Value::String(mode))
    }
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct SetPermissionsArgs {
    path: String,
    permissions_octal: String,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

pub struct SetPermissionsTool;

#[async_trait]
impl Tool for SetPermissionsTool {
    fn name(&self) -> &'static str {
        "set_file_permissions"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Sets the permission bits of a file or directory. Accepts 0o755, 0755 or 755.",
            object_schema(
                json!({
                    "path": { "type": "string", "description": "File or directory to change." },
                    "permissions_octal": { "type": "string", "description": "Octal mode, at most 0o7777." }
                }),
                &["path", "permissions_octal"],
            ),
        )
    }

    fn preview(&self, args: &Value, workspace: &Workspace) -> Result<String> {
        let args: SetPermissionsArgs = parse_args(args)?;
        let mode = permissions::parse_octal_mode(&args.permissions_octal)?;
        let path = workspace.resolve(&args.path, args.use_data_dir)?;
        let current = permissions::get_file_permissions(workspace, &args.path, args.use_data_dir)
            .unwrap_or_else(|_| "?".to_string());
        Ok(format!(
            "chmod {}: {} -> {}",
            style(path.display()).bold(),
            style(current).red(),
            style(format!("{mode:#o}")).green()
        ))
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: SetPermissionsArgs = parse_args(args)?;
        let message = permissions::set_file_permissions(
            workspace,
            &args.path,
            &args.permissions_octal,
            args.use_data_dir,
        )?;
        Ok(Value::String(message))
    }

    fn is_safe_for_auto_execute(&self, _args: &Value, _workspace: &Workspace) -> Result<bool> {
        Ok(false)
    }
}

pub struct FileMetadataTool;

#[async_trait]
impl Tool for FileMetadataTool {
    fn name(&self) -> &'static str {
        "get_file_metadata"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Returns detailed metadata of a file or directory: size, timestamps, type, extension, permissions, owner and group.",
            path_schema("file_path", "File or directory to inspect."),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: PathArgs = parse_args(args)?;
        to_json(list_files::get_file_metadata(
            workspace,
            &args.path,
            args.use_data_dir,
        )?)
    }
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct DiskUsageArgs {
    #[serde(default)]
    path: Option<String>,
    #[serde(default = "default_true")]
    use_data_dir: bool,
}

pub struct DiskUsageTool;

#[async_trait]
impl Tool for DiskUsageTool {
    fn name(&self) -> &'static str {
        "get_disk_usage"
    }

    fn schema(&self) -> FunctionDescription {
        describe(
            self.name(),
            "Reports total, used and free space of the filesystem holding a path. Defaults to the base directory.",
            object_schema(
                json!({
                    "path": { "type": "string", "description": "Optional path on the filesystem to inspect." }
                }),
                &[],
            ),
        )
    }

    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value> {
        let args: DiskUsageArgs = parse_args(args)?;
        to_json(list_files::get_disk_usage(
            workspace,
            args.path.as_deref(),
            args.use_data_dir,
        )?)
    }
}
