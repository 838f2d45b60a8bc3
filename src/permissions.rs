use crate::error::{FileOpError, IoResultExt, Result};
use crate::workspace::Workspace;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Folds `.` and `..` components without touching the filesystem.
///
/// A `..` that would climb above the root is dropped, matching how the OS
/// treats `/..`.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() && !path.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Symlinks followed by hand before a path counts as escaping.
const MAX_LINK_HOPS: usize = 40;

/// Checks that `path` lies inside `base`.
///
/// This is the single source of truth for containment. It handles two layers:
/// 1. A lexical check on the normalized path, which rejects `..` escapes
///    regardless of whether anything exists on disk.
/// 2. A canonical check on the nearest existing ancestor of the path, which
///    rejects symlinks inside the base that point somewhere else. Dangling
///    symlinks count as existing, and their targets are checked the same way.
///
/// # Arguments
/// * `path` - An absolute, already normalized path.
/// * `base` - The base directory it must stay within.
///
/// # Returns
/// * `Ok(())` if the path is inside the base directory.
/// * `Err(FileOpError::OutsideBaseDirectory)` otherwise.
pub fn ensure_within_base(path: &Path, base: &Path) -> Result<()> {
    let base = normalize_lexically(base);
    let outside = || FileOpError::OutsideBaseDirectory {
        path: path.to_path_buf(),
        base: base.clone(),
    };

    if !normalize_lexically(path).starts_with(&base) {
        return Err(outside());
    }

    // The base itself may not exist yet; the lexical check is all we can do then.
    let Ok(canonical_base) = base.canonicalize() else {
        return Ok(());
    };

    if !lands_within(path, &canonical_base, MAX_LINK_HOPS)? {
        return Err(outside());
    }
    Ok(())
}

/// Where `path` would land on disk, judged from its nearest ancestor that has
/// a directory entry. `symlink_metadata` is used so a dangling link is found
/// instead of being mistaken for a missing path.
fn lands_within(path: &Path, canonical_base: &Path, hops_left: usize) -> Result<bool> {
    let Some(ancestor) = path
        .ancestors()
        .find(|p| fs::symlink_metadata(p).is_ok())
    else {
        return Ok(true);
    };

    if let Ok(canonical) = ancestor.canonicalize() {
        return Ok(canonical.starts_with(canonical_base));
    }

    // Only a dangling symlink gets here.
    let link = fs::read_link(ancestor).with_path("resolve", ancestor)?;
    if hops_left == 0 {
        return Ok(false);
    }
    let parent = match ancestor.parent() {
        Some(parent) => parent.canonicalize().with_path("resolve", parent)?,
        None => PathBuf::from("/"),
    };
    let rest = path.strip_prefix(ancestor).unwrap_or(Path::new(""));
    let target = parent.join(link);
    let target = if rest.as_os_str().is_empty() {
        target
    } else {
        target.join(rest)
    };
    lands_within(&target, canonical_base, hops_left - 1)
}

/// Parses `0o755`, `0755` or `755` into a mode. Anything above `0o7777` is rejected.
pub fn parse_octal_mode(permissions_octal: &str) -> Result<u32> {
    let trimmed = permissions_octal.trim();
    let digits = trimmed
        .strip_prefix("0o")
        .or_else(|| trimmed.strip_prefix("0O"))
        .unwrap_or(trimmed);

    let invalid = || {
        FileOpError::InvalidArgument(format!(
            "Invalid octal permissions string: {permissions_octal}"
        ))
    };

    if digits.is_empty() {
        return Err(invalid());
    }
    let mode = u32::from_str_radix(digits, 8).map_err(|_| invalid())?;
    if mode > 0o7777 {
        return Err(invalid());
    }
    Ok(mode)
}

#[cfg(unix)]
pub(crate) fn mode_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
pub(crate) fn mode_bits(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}

/// Returns the permission bits of a file or directory as an octal string, e.g. `0o644`.
pub fn get_file_permissions(workspace: &Workspace, path: &str, use_base_dir: bool) -> Result<String> {
    let full_path = workspace.resolve(path, use_base_dir)?;
    if !full_path.exists() {
        return Err(FileOpError::not_found("Path", &full_path));
    }
    let metadata = fs::metadata(&full_path).with_path("read metadata of", &full_path)?;
    Ok(format!("{:#o}", mode_bits(&metadata) & 0o777))
}

/// Sets the permission bits of a file or directory from an octal string.
///
/// On platforms without POSIX modes only the read-only flag can be expressed:
/// it is set when the mode grants no write bit at all.
pub fn set_file_permissions(
    workspace: &Workspace,
    path: &str,
    permissions_octal: &str,
    use_base_dir: bool,
) -> Result<String> {
    let full_path = workspace.resolve(path, use_base_dir)?;
    if !full_path.exists() {
        return Err(FileOpError::not_found("Path", &full_path));
    }
    let mode = parse_octal_mode(permissions_octal)?;

    #[cfg(unix)]
    let permissions = {
        use std::os::unix::fs::PermissionsExt;
        fs::Permissions::from_mode(mode)
    };
    #[cfg(not(unix))]
    let permissions = {
        let mut permissions = fs::metadata(&full_path)
            .with_path("read metadata of", &full_path)?
            .permissions();
        permissions.set_readonly(mode & 0o222 == 0);
        permissions
    };

    fs::set_permissions(&full_path, permissions).with_path("set permissions on", &full_path)?;
    tracing::debug!(path = %full_path.display(), mode = format!("{mode:#o}"), "permissions updated");

    Ok(format!(
        "Successfully set permissions for {} to {permissions_octal}",
        full_path.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::Builder;

    // Helper to set up a temporary directory structure for tests.
    fn setup_test_dirs() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let tmp_dir = Builder::new().prefix("perm-test-").tempdir().unwrap();
        let accessible_dir = tmp_dir.path().join("accessible");
        let inaccessible_dir = tmp_dir.path().join("inaccessible");

        fs::create_dir_all(&accessible_dir).unwrap();
        fs::create_dir_all(&inaccessible_dir).unwrap();

        fs::write(accessible_dir.join("file.txt"), "content").unwrap();
        fs::write(inaccessible_dir.join("secret.txt"), "secret").unwrap();

        (tmp_dir, accessible_dir, inaccessible_dir)
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/base/./a/../b.txt")),
            PathBuf::from("/base/b.txt")
        );
        assert_eq!(normalize_lexically(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(
            normalize_lexically(Path::new("../x")),
            PathBuf::from("../x")
        );
    }

    #[test]
    fn test_existing_file_in_base() {
        let (_tmp_dir, accessible, _inaccessible) = setup_test_dirs();
        let path_to_check = accessible.join("file.txt");
        assert!(ensure_within_base(&path_to_check, &accessible).is_ok());
    }

    #[test]
    fn test_new_nested_file_in_base() {
        let (_tmp_dir, accessible, _inaccessible) = setup_test_dirs();
        let path_to_check = accessible.join("deeply/nested/new_file.txt");
        assert!(ensure_within_base(&path_to_check, &accessible).is_ok());
    }

    #[test]
    fn test_dot_dot_escape_is_rejected() {
        let (_tmp_dir, accessible, _inaccessible) = setup_test_dirs();
        let path_to_check = normalize_lexically(&accessible.join("../inaccessible/secret.txt"));

        let result = ensure_within_base(&path_to_check, &accessible);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::OutsideBaseDirectory);
    }

    #[test]
    fn test_sibling_with_common_prefix_is_rejected() {
        let (tmp_dir, accessible, _inaccessible) = setup_test_dirs();
        let sibling = tmp_dir.path().join("accessible-other/file.txt");
        assert!(ensure_within_base(&sibling, &accessible).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let (_tmp_dir, accessible, inaccessible) = setup_test_dirs();
        let link = accessible.join("link");
        std::os::unix::fs::symlink(&inaccessible, &link).unwrap();

        let result = ensure_within_base(&link.join("secret.txt"), &accessible);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("outside of the base"));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_escape_is_rejected() {
        let (tmp_dir, accessible, _inaccessible) = setup_test_dirs();
        let target = tmp_dir.path().join("outside/new.txt");
        let link = accessible.join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let err = ensure_within_base(&link, &accessible).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutsideBaseDirectory);

        // Relative targets and link chains are followed too.
        let relative = accessible.join("relative");
        std::os::unix::fs::symlink("../outside/other.txt", &relative).unwrap();
        assert!(ensure_within_base(&relative, &accessible).is_err());
        let chained = accessible.join("chained");
        std::os::unix::fs::symlink("link", &chained).unwrap();
        assert!(ensure_within_base(&chained, &accessible).is_err());

        let workspace = Workspace::new(&accessible);
        let err = crate::file_ops::write_to_file(&workspace, "link", "pwned", true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutsideBaseDirectory);
        assert!(!target.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_inside_base_is_allowed() {
        let (_tmp_dir, accessible, _inaccessible) = setup_test_dirs();
        let link = accessible.join("pending");
        std::os::unix::fs::symlink("not_yet/created.txt", &link).unwrap();
        assert!(ensure_within_base(&link, &accessible).is_ok());
    }

    #[test]
    fn test_parse_octal_mode() {
        assert_eq!(parse_octal_mode("0o755").unwrap(), 0o755);
        assert_eq!(parse_octal_mode("0644").unwrap(), 0o644);
        assert_eq!(parse_octal_mode("600").unwrap(), 0o600);
        assert!(parse_octal_mode("0o9").is_err());
        assert!(parse_octal_mode("").is_err());
        assert!(parse_octal_mode("77777").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_set_and_get_permissions() {
        let (tmp_dir, _accessible, _inaccessible) = setup_test_dirs();
        let workspace = Workspace::new(tmp_dir.path());

        let message =
            set_file_permissions(&workspace, "accessible/file.txt", "0o600", true).unwrap();
        assert!(message.contains("Successfully set permissions"));
        assert_eq!(
            get_file_permissions(&workspace, "accessible/file.txt", true).unwrap(),
            "0o600"
        );
    }

    #[test]
    fn test_set_permissions_rejects_bad_octal() {
        let (tmp_dir, _accessible, _inaccessible) = setup_test_dirs();
        let workspace = Workspace::new(tmp_dir.path());

        let err = set_file_permissions(&workspace, "accessible/file.txt", "rwx", true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_get_permissions_missing_path() {
        let (tmp_dir, _accessible, _inaccessible) = setup_test_dirs();
        let workspace = Workspace::new(tmp_dir.path());

        let err = get_file_permissions(&workspace, "nope.txt", true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
