//! Filesystem helpers for step actions

use rigging_core::FileMode;
use std::path::{Component, Path, PathBuf};

use crate::error::{RenderError, Result};

/// Join `dest` under `root`, refusing paths that climb out of it
///
/// Leading `/` is ignored so absolute-looking destinations stay in the root.
pub fn resolve_dest(root: &Path, dest: &str) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    for component in Path::new(dest).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                return Err(RenderError::InvalidDestination {
                    dest: dest.to_string(),
                });
            }
        }
    }
    Ok(path)
}

/// Write `contents` to `path` with `mode`, creating parent directories
pub async fn write_file(path: &Path, contents: &[u8], mode: FileMode) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    set_mode(path, mode).await
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: FileMode) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode.bits())).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: FileMode) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_dest() {
        let root = Path::new("/srv/out");
        assert_eq!(resolve_dest(root, "a/b.txt").unwrap(), root.join("a/b.txt"));
        assert_eq!(resolve_dest(root, "./a.txt").unwrap(), root.join("a.txt"));
        assert_eq!(resolve_dest(root, "/etc/x").unwrap(), root.join("etc/x"));
        assert!(matches!(
            resolve_dest(root, "../escape"),
            Err(RenderError::InvalidDestination { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/script.sh");
        write_file(&path, b"#!/bin/sh\n", FileMode(0o755)).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(std::fs::read(&path).unwrap(), b"#!/bin/sh\n");
    }
}
