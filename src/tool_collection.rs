//! # Tool Collection
//!
//! The `ToolCollection` is the central hub for discovering, previewing, and executing tools.
//! It maintains a registry of all available tools and dispatches calls to the appropriate
//! implementation based on the tool name.

use crate::error::{FileOpError, Result};
use crate::tools::{
    FunctionDescription, Tool,
    archive_tools::{ExtractZipTool, ZipFilesTool},
    batch_tools::{BatchProcessTool, RecursiveOperationTool},
    content_tools::{CompareFilesTool, FileHashTool, SearchContentTool},
    file_tools::{
        AppendFileTool, CopyFileTool, CreateFileTool, CreateFolderTool, DeleteFileTool,
        DeleteFolderTool, GetWorkingDirectoryTool, PathCheck, PathCheckTool, ReadFileTool,
        RenameFileTool, SetWorkingDirectoryTool, WriteFileTool,
    },
    listing_tools::{
        DiskUsageTool, FileMetadataTool, FolderTreeTool, GetPermissionsTool, ListFilesTool,
        SetPermissionsTool,
    },
    state_tools::{DetectChangesTool, FileVersioningTool, WatchDirectoryTool},
};
use crate::workspace::Workspace;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// The outcome of one tool call. Failures are reported in `content` as
/// `{"error": {"kind": ..., "message": ...}}` rather than as a Rust error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    pub name: String,
    pub content: Value,
    pub is_error: bool,
}

/// A collection responsible for registering and dispatching tool calls.
pub struct ToolCollection {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolCollection {
    /// Creates a new, empty `ToolCollection`.
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// A collection with every file operation registered.
    pub fn with_default_tools() -> Self {
        let mut collection = Self::new();
        let tools: Vec<Box<dyn Tool>> = vec![
            Box::new(ReadFileTool),
            Box::new(WriteFileTool),
            Box::new(CreateFileTool),
            Box::new(AppendFileTool),
            Box::new(CreateFolderTool),
            Box::new(DeleteFileTool),
            Box::new(DeleteFolderTool),
            Box::new(RenameFileTool),
            Box::new(CopyFileTool),
            Box::new(PathCheckTool(PathCheck::FileExists)),
            Box::new(PathCheckTool(PathCheck::IsFile)),
            Box::new(PathCheckTool(PathCheck::IsDirectory)),
            Box::new(GetWorkingDirectoryTool),
            Box::new(SetWorkingDirectoryTool),
            Box::new(ListFilesTool),
            Box::new(FolderTreeTool),
            Box::new(GetPermissionsTool),
            Box::new(SetPermissionsTool),
            Box::new(FileMetadataTool),
            Box::new(DiskUsageTool),
            Box::new(SearchContentTool),
            Box::new(CompareFilesTool),
            Box::new(FileHashTool),
            Box::new(ZipFilesTool),
            Box::new(ExtractZipTool),
            Box::new(BatchProcessTool),
            Box::new(RecursiveOperationTool),
            Box::new(FileVersioningTool),
            Box::new(DetectChangesTool),
            Box::new(WatchDirectoryTool),
        ];
        for tool in tools {
            collection.register(tool);
        }
        collection
    }

    /// Registers a new tool with the collection, replacing one with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Gathers the schemas of all registered tools, sorted by name.
    pub fn get_all_schemas(&self) -> Vec<FunctionDescription> {
        self.tools.values().map(|tool| tool.schema()).collect()
    }

    fn lookup(&self, name: &str) -> Result<&dyn Tool> {
        self.tools
            .get(name)
            .map(|tool| tool.as_ref())
            .ok_or_else(|| FileOpError::NotFound(format!("Unknown tool: {name}")))
    }

    /// Generates a preview for a tool call.
    pub fn preview_tool_call(
        &self,
        name: &str,
        arguments: &str,
        workspace: &Workspace,
    ) -> Result<String> {
        let tool = self.lookup(name)?;
        let args = parse_arguments(arguments)?;
        tool.preview(&args, workspace)
    }

    /// Checks if a tool call is safe for automatic execution.
    pub fn is_safe_for_auto_execute(
        &self,
        name: &str,
        arguments: &str,
        workspace: &Workspace,
    ) -> Result<bool> {
        let tool = self.lookup(name)?;
        let args = parse_arguments(arguments)?;
        tool.is_safe_for_auto_execute(&args, workspace)
    }

    /// Executes a tool call.
    /// This function is designed to always succeed from the caller's perspective.
    /// Failures in tool lookup, argument parsing or execution are logged and
    /// returned as an error payload in the response.
    pub async fn execute_tool_call(
        &self,
        name: &str,
        arguments: &str,
        workspace: &Workspace,
    ) -> ToolResponse {
        let result = async {
            let tool = self.lookup(name)?;
            let args = parse_arguments(arguments)?;
            tool.execute(&args, workspace).await
        }
        .await;

        match result {
            Ok(content) => {
                tracing::debug!(tool = name, "tool call succeeded");
                ToolResponse {
                    name: name.to_string(),
                    content,
                    is_error: false,
                }
            }
            Err(e) => {
                tracing::warn!(tool = name, kind = ?e.kind(), "tool call failed: {e}");
                ToolResponse {
                    name: name.to_string(),
                    content: e.to_json(),
                    is_error: true,
                }
            }
        }
    }
}

impl Default for ToolCollection {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses the raw JSON argument string. An empty string stands for `{}`.
fn parse_arguments(arguments: &str) -> Result<Value> {
    if arguments.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(arguments).map_err(|e| {
        FileOpError::InvalidArgument(format!("Failed to parse JSON arguments: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashSet;
    use tempfile::Builder;

    #[test]
    fn test_default_tools_have_unique_schemas() {
        let collection = ToolCollection::with_default_tools();
        let schemas = collection.get_all_schemas();
        assert_eq!(schemas.len(), 30);

        let names: HashSet<_> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), schemas.len());
        for schema in &schemas {
            assert_eq!(schema.parameters["type"], "object");
        }
        let read = schemas.iter().find(|s| s.name == "read_file").unwrap();
        assert!(read.parameters["properties"]["use_data_dir"].is_object());
    }

    #[tokio::test]
    async fn test_unknown_tool_and_bad_json() {
        let tmp_dir = Builder::new().prefix("test-collection-").tempdir().unwrap();
        let ws = Workspace::new(tmp_dir.path());
        let collection = ToolCollection::with_default_tools();

        let response = collection.execute_tool_call("format_disk", "{}", &ws).await;
        assert!(response.is_error);
        assert_eq!(response.content["error"]["kind"], "not_found");

        let response = collection.execute_tool_call("read_file", "{oops", &ws).await;
        assert!(response.is_error);
        assert_eq!(response.content["error"]["kind"], "invalid_argument");

        let err = collection
            .preview_tool_call("write_to_file", "", &ws)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_empty_arguments_mean_empty_object() {
        let tmp_dir = Builder::new().prefix("test-collection-").tempdir().unwrap();
        let ws = Workspace::new(tmp_dir.path());
        let collection = ToolCollection::with_default_tools();

        let response = collection
            .execute_tool_call("get_current_working_directory", "", &ws)
            .await;
        assert!(!response.is_error);
    }
}
