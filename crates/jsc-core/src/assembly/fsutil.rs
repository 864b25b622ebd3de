//! Small filesystem helpers shared by the assembly modules.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// fsync a directory so renames and creations inside it are durable.
pub fn sync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

/// Remove a file, symlink or directory tree. Missing paths are fine.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Recursively copy `src` to `dst`, recreating symlinks instead of
/// following them. `dst` must not exist yet.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    if dst.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", dst.display()),
        ));
    }
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

pub fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_tree_keeps_symlinks() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("sub/file.txt"), "data").unwrap();
        std::os::unix::fs::symlink("sub/file.txt", src.join("link")).unwrap();

        let dst = tmp.path().join("dst");
        copy_tree(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("sub/file.txt")).unwrap(), "data");
        assert_eq!(
            fs::read_link(dst.join("link")).unwrap(),
            Path::new("sub/file.txt")
        );
        assert!(copy_tree(&src, &dst).is_err());
    }

    #[test]
    fn test_remove_path() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("d");
        fs::create_dir_all(dir.join("x")).unwrap();
        remove_path(&dir).unwrap();
        assert!(!dir.exists());
        remove_path(&dir).unwrap();

        std::os::unix::fs::symlink("/nonexistent", tmp.path().join("dangling")).unwrap();
        remove_path(&tmp.path().join("dangling")).unwrap();
        assert!(fs::symlink_metadata(tmp.path().join("dangling")).is_err());
    }
}
