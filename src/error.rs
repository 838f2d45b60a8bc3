//! # Errors
//!
//! Every operation in the crate reports failure through [`FileOpError`]. Each
//! variant maps onto a coarse [`ErrorKind`] tag which is what tool callers see
//! in the `{"error": {...}}` payload.

use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FileOpError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    InvalidArgument,
    OutsideBaseDirectory,
    Failed,
}

#[derive(Debug, Error)]
pub enum FileOpError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Path '{}' resolves outside of the base directory '{}'", path.display(), base.display())]
    OutsideBaseDirectory { path: PathBuf, base: PathBuf },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Zip archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FileOpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FileOpError::NotFound(_) => ErrorKind::NotFound,
            FileOpError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            FileOpError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            FileOpError::InvalidArgument(_) | FileOpError::Regex(_) | FileOpError::Glob(_) => {
                ErrorKind::InvalidArgument
            }
            FileOpError::OutsideBaseDirectory { .. } => ErrorKind::OutsideBaseDirectory,
            FileOpError::Io { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => ErrorKind::NotFound,
                io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
                io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
                io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
                    ErrorKind::InvalidArgument
                }
                _ => ErrorKind::Failed,
            },
            FileOpError::Archive(zip::result::ZipError::FileNotFound) => ErrorKind::NotFound,
            FileOpError::Archive(zip::result::ZipError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            FileOpError::Archive(_) | FileOpError::Watch(_) | FileOpError::Json(_) => {
                ErrorKind::Failed
            }
        }
    }

    /// Wraps an I/O error with a short description of what was being done.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        FileOpError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn not_found(what: &str, path: &Path) -> Self {
        FileOpError::NotFound(format!("{what} not found: {}", path.display()))
    }

    pub fn already_exists(what: &str, path: &Path) -> Self {
        FileOpError::AlreadyExists(format!("{what} already exists: {}", path.display()))
    }

    /// The JSON shape returned to tool callers on failure.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}

/// Attaches a path-aware context to `std::io` results.
pub trait IoResultExt<T> {
    fn with_path(self, action: &str, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_path(self, action: &str, path: &Path) -> Result<T> {
        self.map_err(|e| FileOpError::io(format!("Failed to {action} '{}'", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_classified_by_kind() {
        let err = FileOpError::io("read", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let err = FileOpError::io("read", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = FileOpError::io("read", io::Error::other("disk on fire"));
        assert_eq!(err.kind(), ErrorKind::Failed);
    }

    #[test]
    fn test_error_json_shape() {
        let err = FileOpError::not_found("File", Path::new("/tmp/missing.txt"));
        let json = err.to_json();
        assert_eq!(json["error"]["kind"], "not_found");
        assert_eq!(json["error"]["message"], "File not found: /tmp/missing.txt");
    }

    #[test]
    fn test_regex_error_is_invalid_argument() {
        let err: FileOpError = regex::Regex::new("(").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
