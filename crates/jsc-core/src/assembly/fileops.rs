//! File operations behind the upload methods and the editing statements.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::server::HandlerError;

use super::fsutil::{copy_symlink, copy_tree};

/// Append a base64-encoded chunk to `path`, creating it if needed.
pub fn append_base64(path: &Path, content: &str) -> Result<(), HandlerError> {
    let bytes = STANDARD
        .decode(content)
        .map_err(|e| HandlerError::Internal(format!("chunk is not valid base64: {e}")))?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(HandlerError::io(format!("open {}", path.display())))?;
    file.write_all(&bytes)
        .map_err(HandlerError::io(format!("append to {}", path.display())))
}

pub fn symlink(path: &Path, target: &str) -> Result<(), HandlerError> {
    std::os::unix::fs::symlink(target, path)
        .map_err(HandlerError::io(format!("symlink {}", path.display())))
}

pub fn mkdir(path: &Path) -> Result<(), HandlerError> {
    fs::create_dir_all(path).map_err(HandlerError::io(format!("mkdir {}", path.display())))
}

/// `put` (truncate) or `append` text to a file whose parent must exist.
pub fn write_text(path: &Path, content: &str, append: bool) -> Result<(), HandlerError> {
    let parent_exists = path
        .parent()
        .is_none_or(|p| p.as_os_str().is_empty() || p.is_dir());
    if !parent_exists {
        return Err(HandlerError::recipe(format!(
            "path does not exist: {}",
            path.display()
        )));
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(HandlerError::io(format!("open {}", path.display())))?;
    file.write_all(content.as_bytes())
        .map_err(HandlerError::io(format!("write {}", path.display())))
}

fn read_text(path: &Path) -> Result<String, HandlerError> {
    fs::read_to_string(path).map_err(HandlerError::io(format!("read {}", path.display())))
}

fn write_back(path: &Path, content: &str) -> Result<(), HandlerError> {
    fs::write(path, content).map_err(HandlerError::io(format!("write {}", path.display())))
}

/// Replace occurrences of `needle`; all of them unless `count` is given.
/// Returns the number of replacements made.
pub fn replace(
    path: &Path,
    needle: &str,
    replacement: &str,
    count: Option<usize>,
) -> Result<usize, HandlerError> {
    if needle.is_empty() {
        return Err(HandlerError::recipe("search text must not be empty"));
    }
    let text = read_text(path)?;
    let found = text.matches(needle).count();
    let replaced = match count {
        Some(n) => text.replacen(needle, replacement, n),
        None => text.replace(needle, replacement),
    };
    write_back(path, &replaced)?;
    Ok(count.map_or(found, |n| n.min(found)))
}

/// Splice `insertion` right after the first occurrence of `needle`.
pub fn insert_after_first(path: &Path, needle: &str, insertion: &str) -> Result<(), HandlerError> {
    let mut text = read_text(path)?;
    let at = needle_position(needle, text.find(needle), path)? + needle.len();
    text.insert_str(at, insertion);
    write_back(path, &text)
}

/// Splice `insertion` right before the last occurrence of `needle`.
pub fn insert_before_last(path: &Path, needle: &str, insertion: &str) -> Result<(), HandlerError> {
    let mut text = read_text(path)?;
    let at = needle_position(needle, text.rfind(needle), path)?;
    text.insert_str(at, insertion);
    write_back(path, &text)
}

fn needle_position(
    needle: &str,
    found: Option<usize>,
    path: &Path,
) -> Result<usize, HandlerError> {
    if needle.is_empty() {
        return Err(HandlerError::recipe("needle must not be empty"));
    }
    found.ok_or_else(|| {
        HandlerError::recipe(format!("{needle:?} not found in {}", path.display()))
    })
}

/// Copy a file, a symlink or a whole directory tree to `dst`.
///
/// A file copied onto an existing directory lands inside it. A directory
/// destination must not exist yet.
pub fn install(src: &Path, dst: &Path) -> Result<(), HandlerError> {
    let meta = fs::symlink_metadata(src)
        .map_err(HandlerError::io(format!("install {}", src.display())))?;
    let target = if !meta.is_dir() && dst.is_dir() {
        match src.file_name() {
            Some(name) => dst.join(name),
            None => dst.to_path_buf(),
        }
    } else {
        dst.to_path_buf()
    };
    let result = if meta.is_dir() {
        copy_tree(src, &target)
    } else if meta.file_type().is_symlink() {
        copy_symlink(src, &target)
    } else {
        fs::copy(src, &target).map(|_| ())
    };
    result.map_err(|e: io::Error| {
        HandlerError::recipe(format!(
            "install {} to {}: {e}",
            src.display(),
            target.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_append_base64_chunks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Jumpstart-Recipe");
        append_base64(&path, &STANDARD.encode("name ")).unwrap();
        append_base64(&path, &STANDARD.encode("demo\n")).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "name demo\n");
        assert!(append_base64(&path, "***").is_err());
    }

    #[test]
    fn test_put_and_append() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.html");
        write_text(&path, "hello", false).unwrap();
        write_text(&path, " world", true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello world");
        write_text(&path, "bye", false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "bye");

        let err = write_text(&tmp.path().join("missing/x"), "x", false).unwrap_err();
        assert!(err.to_string().starts_with("path does not exist"));
    }

    #[test]
    fn test_replace_all_and_bounded() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("conf");
        fs::write(&path, "a a a").unwrap();
        assert_eq!(replace(&path, "a", "b", Some(2)).unwrap(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "b b a");
        assert_eq!(replace(&path, "b", "c", None).unwrap(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "c c a");
        assert_eq!(replace(&path, "zzz", "y", None).unwrap(), 0);
    }

    #[test]
    fn test_insert_and_rinsert() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("conf");
        fs::write(&path, "[x]\n[x]\n").unwrap();
        insert_after_first(&path, "[x]", " first").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[x] first\n[x]\n");
        insert_before_last(&path, "[x]", "last ").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[x] first\nlast [x]\n");

        let err = insert_after_first(&path, "[y]", "z").unwrap_err();
        assert!(matches!(err, HandlerError::Recipe(_)));
    }

    #[test]
    fn test_install_file_into_dir_and_tree() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("conf")).unwrap();
        fs::write(src.join("conf/site.conf"), "server {}").unwrap();
        std::os::unix::fs::symlink("site.conf", src.join("conf/default")).unwrap();
        let dst = tmp.path().join("etc");
        fs::create_dir_all(&dst).unwrap();

        install(&src.join("conf/site.conf"), &dst).unwrap();
        assert_eq!(fs::read_to_string(dst.join("site.conf")).unwrap(), "server {}");

        install(&src.join("conf"), &dst.join("nginx")).unwrap();
        assert_eq!(
            fs::read_link(dst.join("nginx/default")).unwrap(),
            Path::new("site.conf")
        );
        assert!(install(&src.join("conf"), &dst.join("nginx")).is_err());
    }
}
