//! # File Operations
//!
//! Read, write, create, append, rename, copy and delete for single files and
//! folders, plus existence and type checks. Each call resolves its path(s)
//! through the [`Workspace`] and returns a human-readable success message.
//! Nothing here is atomic: a failure halfway leaves whatever the OS left.

use crate::error::{FileOpError, IoResultExt, Result};
use crate::workspace::Workspace;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

pub fn read_file(workspace: &Workspace, file_path: &str, use_base_dir: bool) -> Result<String> {
    let full_path = workspace.resolve(file_path, use_base_dir)?;
    if !full_path.is_file() {
        tracing::debug!(path = %full_path.display(), "file not found");
        return Err(FileOpError::not_found("File", &full_path));
    }

    let bytes = fs::read(&full_path).with_path("read", &full_path)?;
    String::from_utf8(bytes).map_err(|_| {
        FileOpError::InvalidArgument(format!(
            "File is not valid UTF-8 text: {}",
            full_path.display()
        ))
    })
}

pub fn write_to_file(
    workspace: &Workspace,
    file_path: &str,
    content: &str,
    use_base_dir: bool,
) -> Result<String> {
    let full_path = workspace.resolve(file_path, use_base_dir)?;
    create_parent_dirs(&full_path)?;
    fs::write(&full_path, content).with_path("write to", &full_path)?;

    tracing::debug!(path = %full_path.display(), bytes = content.len(), "file written");
    Ok(format!("Successfully wrote to file: {}", full_path.display()))
}

pub fn create_new_file(
    workspace: &Workspace,
    file_path: &str,
    content: &str,
    use_base_dir: bool,
) -> Result<String> {
    let full_path = workspace.resolve(file_path, use_base_dir)?;
    if full_path.exists() {
        return Err(FileOpError::already_exists("File", &full_path));
    }
    create_parent_dirs(&full_path)?;

    // `create_new` closes the gap between the existence check and the write.
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&full_path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => FileOpError::already_exists("File", &full_path),
            _ => FileOpError::io(format!("Failed to create '{}'", full_path.display()), e),
        })?;
    file.write_all(content.as_bytes())
        .with_path("write to", &full_path)?;

    Ok(format!("Successfully created new file: {}", full_path.display()))
}

pub fn create_new_folder(
    workspace: &Workspace,
    folder_path: &str,
    use_base_dir: bool,
) -> Result<String> {
    let full_path = workspace.resolve(folder_path, use_base_dir)?;
    if full_path.exists() && !full_path.is_dir() {
        return Err(FileOpError::already_exists(
            "A file with this name",
            &full_path,
        ));
    }
    fs::create_dir_all(&full_path).with_path("create folder", &full_path)?;
    Ok(format!("Successfully created folder: {}", full_path.display()))
}

pub fn delete_file(workspace: &Workspace, file_path: &str, use_base_dir: bool) -> Result<String> {
    let full_path = workspace.resolve(file_path, use_base_dir)?;
    if !full_path.is_file() {
        tracing::debug!(path = %full_path.display(), "delete requested for missing file");
        return Err(FileOpError::not_found("File", &full_path));
    }
    fs::remove_file(&full_path).with_path("delete", &full_path)?;

    tracing::info!(path = %full_path.display(), "file deleted");
    Ok(format!("Successfully deleted file: {}", full_path.display()))
}

pub fn delete_folder(
    workspace: &Workspace,
    folder_path: &str,
    use_base_dir: bool,
) -> Result<String> {
    let full_path = workspace.resolve(folder_path, use_base_dir)?;
    if !full_path.is_dir() {
        tracing::debug!(path = %full_path.display(), "delete requested for missing folder");
        return Err(FileOpError::not_found("Folder", &full_path));
    }
    if full_path == workspace.base_dir() {
        return Err(FileOpError::InvalidArgument(format!(
            "Refusing to delete the base directory itself: {}",
            full_path.display()
        )));
    }
    fs::remove_dir_all(&full_path).with_path("delete folder", &full_path)?;

    tracing::info!(path = %full_path.display(), "folder deleted");
    Ok(format!("Successfully deleted folder: {}", full_path.display()))
}

pub fn append_to_file(
    workspace: &Workspace,
    file_path: &str,
    content: &str,
    use_base_dir: bool,
) -> Result<String> {
    let full_path = workspace.resolve(file_path, use_base_dir)?;
    if !full_path.is_file() {
        return Err(FileOpError::not_found("File", &full_path));
    }

    let mut file = OpenOptions::new()
        .append(true)
        .open(&full_path)
        .with_path("open", &full_path)?;
    file.write_all(content.as_bytes())
        .with_path("append to", &full_path)?;

    Ok(format!("Successfully appended to file: {}", full_path.display()))
}

/// Renames or moves a file. The destination must not exist.
pub fn rename_file(
    workspace: &Workspace,
    old_path: &str,
    new_path: &str,
    use_base_dir: bool,
) -> Result<String> {
    let source = workspace.resolve(old_path, use_base_dir)?;
    let destination = workspace.resolve(new_path, use_base_dir)?;

    if !source.is_file() {
        return Err(FileOpError::not_found("Source file", &source));
    }
    if destination.exists() {
        return Err(FileOpError::already_exists("Destination file", &destination));
    }
    create_parent_dirs(&destination)?;
    move_file(&source, &destination)?;

    Ok(format!(
        "Successfully renamed/moved file from {} to {}",
        source.display(),
        destination.display()
    ))
}

/// Copies a file. The destination must not exist; the source is left as is.
pub fn copy_file(
    workspace: &Workspace,
    source_path: &str,
    destination_path: &str,
    use_base_dir: bool,
) -> Result<String> {
    let source = workspace.resolve(source_path, use_base_dir)?;
    let destination = workspace.resolve(destination_path, use_base_dir)?;

    if !source.is_file() {
        return Err(FileOpError::not_found("Source file", &source));
    }
    if destination.exists() {
        return Err(FileOpError::already_exists("Destination file", &destination));
    }
    create_parent_dirs(&destination)?;
    fs::copy(&source, &destination).with_path("copy", &source)?;

    Ok(format!(
        "Successfully copied file from {} to {}",
        source.display(),
        destination.display()
    ))
}

pub fn check_file_exists(workspace: &Workspace, file_path: &str, use_base_dir: bool) -> Result<bool> {
    Ok(workspace.resolve(file_path, use_base_dir)?.is_file())
}

pub fn check_is_directory(workspace: &Workspace, path: &str, use_base_dir: bool) -> Result<bool> {
    Ok(workspace.resolve(path, use_base_dir)?.is_dir())
}

pub fn check_is_file(workspace: &Workspace, path: &str, use_base_dir: bool) -> Result<bool> {
    Ok(workspace.resolve(path, use_base_dir)?.is_file())
}

pub(crate) fn create_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_path("create directory", parent)?;
    }
    Ok(())
}

/// `rename` when possible, copy + remove when the two paths sit on different devices.
pub(crate) fn move_file(source: &Path, destination: &Path) -> Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(source, destination).with_path("copy", source)?;
            fs::remove_file(source).with_path("remove", source)
        }
        Err(e) => Err(FileOpError::io(
            format!(
                "Failed to move '{}' to '{}'",
                source.display(),
                destination.display()
            ),
            e,
        )),
    }
}
