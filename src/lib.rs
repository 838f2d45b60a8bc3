pub mod archive;
pub mod batch;
pub mod changes;
pub mod config;
pub mod diff;
pub mod error;
pub mod file_ops;
pub mod hashing;
pub mod list_files;
pub mod path_expander;
pub mod permissions;
pub mod search;
pub mod tool_collection;
pub mod tools;
pub mod versioning;
pub mod watcher;
pub mod workspace;

pub use config::Config;
pub use error::{ErrorKind, FileOpError, Result};
pub use tool_collection::{ToolCollection, ToolResponse};
pub use tools::{FunctionDescription, Tool};
pub use workspace::{Limits, Workspace};
