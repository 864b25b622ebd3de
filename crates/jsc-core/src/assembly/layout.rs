//! Where everything lives on the assembly filesystem.
//!
//! ```text
//! <root>/app/env.json
//! <root>/app/state/
//! <root>/app/code/
//!     .jsc/lock
//!     .jsc/backups/{seq, seq.tmp, new-backup/, deleted-backup/, <id>@<time>/}
//!     .jsc/new-recipe/src/Jumpstart-Recipe   staging area of a deploy
//!     .jsc/recipe/                           committed deploy
//!     .pacman/
//! ```

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::recipe::RECIPE_FILE_NAME;
use crate::server::HandlerError;

/// Entries of the code directory that do not count as user content.
pub const ALLOW_LIST: [&str; 4] = ["lost+found", ".jsc", ".pacman", ".config"];

/// Paths of the assembly filesystem, rooted at `/` in production.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn env_file(&self) -> PathBuf {
        self.root.join("app/env.json")
    }

    pub fn code_dir(&self) -> PathBuf {
        self.root.join("app/code")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("app/state")
    }

    /// Executable started by `do_run`.
    pub fn init_script(&self) -> PathBuf {
        self.code_dir().join("init")
    }

    pub fn pacman_dir(&self) -> PathBuf {
        self.code_dir().join(".pacman")
    }

    /// Package database of the state dataset, dropped by a code clean.
    pub fn package_db_dir(&self) -> PathBuf {
        self.state_dir().join(".pacman/db")
    }

    pub fn jsc_dir(&self) -> PathBuf {
        self.code_dir().join(".jsc")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.jsc_dir().join("lock")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.jsc_dir().join("backups")
    }

    pub fn seq_file(&self) -> PathBuf {
        self.backups_dir().join("seq")
    }

    pub fn seq_tmp_file(&self) -> PathBuf {
        self.backups_dir().join("seq.tmp")
    }

    pub fn new_backup_dir(&self) -> PathBuf {
        self.backups_dir().join("new-backup")
    }

    pub fn deleted_backup_dir(&self) -> PathBuf {
        self.backups_dir().join("deleted-backup")
    }

    pub fn recipe_dir(&self) -> PathBuf {
        self.jsc_dir().join("recipe")
    }

    pub fn new_recipe_dir(&self) -> PathBuf {
        self.jsc_dir().join("new-recipe")
    }

    pub fn new_recipe_src(&self) -> PathBuf {
        self.new_recipe_dir().join("src")
    }

    pub fn new_recipe_script(&self) -> PathBuf {
        self.new_recipe_src().join(RECIPE_FILE_NAME)
    }

    /// Path as seen from inside the assembly, for messages.
    pub fn display(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) => format!("/{}", rel.display()),
            Err(_) => path.display().to_string(),
        }
    }

    /// Resolve a path written in a recipe statement.
    ///
    /// Absolute paths are taken relative to the assembly root; relative ones
    /// to the staged recipe source tree.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match path.strip_prefix("/") {
            Ok(rel) => self.root.join(rel),
            Err(_) => self.new_recipe_src().join(path),
        }
    }

    /// Destination of an uploaded recipe file, relative to the staging
    /// source tree. Absolute paths and `..` are refused.
    pub fn staging_path(&self, rel: &str) -> Result<PathBuf, HandlerError> {
        let path = Path::new(rel);
        let mut out = self.new_recipe_src();
        for component in path.components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(HandlerError::InvalidPath(rel.to_string()));
                }
            }
        }
        if out == self.new_recipe_src() {
            return Err(HandlerError::InvalidPath(rel.to_string()));
        }
        Ok(out)
    }

    /// True when the code directory holds nothing but allow-listed entries.
    /// A missing code directory is clean.
    pub fn is_code_dir_clean(&self) -> Result<bool, HandlerError> {
        let code_dir = self.code_dir();
        let entries = match fs::read_dir(&code_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(HandlerError::io(format!("list {}", code_dir.display()))(e)),
        };
        for entry in entries {
            let entry = entry.map_err(HandlerError::io("list code dir"))?;
            let name = entry.file_name();
            if !ALLOW_LIST.iter().any(|allowed| name == *allowed) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_resolve() {
        let layout = Layout::new("/srv/asm");
        assert_eq!(
            layout.resolve("/app/code/index.html"),
            PathBuf::from("/srv/asm/app/code/index.html")
        );
        assert_eq!(
            layout.resolve("conf/nginx.conf"),
            PathBuf::from("/srv/asm/app/code/.jsc/new-recipe/src/conf/nginx.conf")
        );
    }

    #[test]
    fn test_staging_path_rejects_escapes() {
        let layout = Layout::new("/srv/asm");
        assert!(layout.staging_path("../../etc/passwd").is_err());
        assert!(layout.staging_path("/etc/passwd").is_err());
        assert!(layout.staging_path("").is_err());
        assert_eq!(
            layout.staging_path("./a/b.txt").unwrap(),
            PathBuf::from("/srv/asm/app/code/.jsc/new-recipe/src/a/b.txt")
        );
    }

    #[test]
    fn test_display() {
        let layout = Layout::new("/srv/asm");
        assert_eq!(layout.display(&layout.code_dir()), "/app/code");
        assert_eq!(layout.display(Path::new("/elsewhere")), "/elsewhere");
    }

    #[test]
    fn test_clean_ignores_allow_list() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::new(tmp.path());
        assert!(layout.is_code_dir_clean().unwrap());

        fs::create_dir_all(layout.jsc_dir()).unwrap();
        fs::create_dir_all(layout.pacman_dir()).unwrap();
        fs::create_dir_all(layout.code_dir().join("lost+found")).unwrap();
        assert!(layout.is_code_dir_clean().unwrap());

        fs::write(layout.code_dir().join(".env"), "X=1").unwrap();
        assert!(!layout.is_code_dir_clean().unwrap());
    }
}
