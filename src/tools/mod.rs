//! # Tool Trait
//!
//! This module defines the `Tool` trait that every exposed file operation
//! implements, plus the helpers the individual tools share for argument
//! parsing and schema construction.

use crate::error::{FileOpError, Result};
use crate::workspace::Workspace;
use async_trait::async_trait;
use console::style;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

pub mod archive_tools;
pub mod batch_tools;
pub mod content_tools;
pub mod file_tools;
pub mod listing_tools;
pub mod state_tools;

/// The schema of one tool as handed to an orchestration layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDescription {
    pub name: String,
    pub description: String,
    /// JSON schema of the argument object.
    pub parameters: Value,
}

/// A trait representing a self-contained, executable tool.
///
/// This trait is designed to be object-safe, allowing for dynamic dispatch
/// via `Box<dyn Tool>`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the unique, static name of the tool.
    fn name(&self) -> &'static str;

    /// Returns the JSON schema for the tool's arguments.
    fn schema(&self) -> FunctionDescription;

    /// A human-readable, possibly colored, description of what a call would do.
    /// Validates the arguments but never touches the file system.
    fn preview(&self, args: &Value, _workspace: &Workspace) -> Result<String> {
        Ok(format!(
            "{} {}",
            style(self.name()).bold(),
            style(serde_json::to_string(args)?).dim()
        ))
    }

    /// Executes the tool and returns its JSON result.
    async fn execute(&self, args: &Value, workspace: &Workspace) -> Result<Value>;

    /// Whether the call may run without asking the user first. Calls that
    /// delete, overwrite, move or change permissions return `false`.
    fn is_safe_for_auto_execute(&self, _args: &Value, _workspace: &Workspace) -> Result<bool> {
        Ok(true)
    }
}

/// Deserializes tool arguments, reporting malformed input as `invalid_argument`.
pub(crate) fn parse_args<T: DeserializeOwned>(args: &Value) -> Result<T> {
    serde_json::from_value(args.clone())
        .map_err(|e| FileOpError::InvalidArgument(format!("Invalid arguments: {e}")))
}

pub(crate) fn to_json<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

pub(crate) fn default_true() -> bool {
    true
}

/// Builds an object schema and adds the shared `use_data_dir` flag.
pub(crate) fn object_schema(properties: Value, required: &[&str]) -> Value {
    let mut properties = properties;
    if let Some(map) = properties.as_object_mut() {
        map.insert(
            "use_data_dir".to_string(),
            json!({
                "type": "boolean",
                "description": "If true (default), paths are relative to the base directory and must stay inside it. If false, paths are used as given."
            }),
        );
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

pub(crate) fn describe(name: &str, description: &str, parameters: Value) -> FunctionDescription {
    FunctionDescription {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}
