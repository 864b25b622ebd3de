//! Operator side of a deploy.
//!
//! ```text
//! reset_check → (upload | remote clone) → read_new_recipe → run recipe → finalize
//! ```
//!
//! Local recipe directories are uploaded file by file into the remote
//! staging tree, honouring a `.jscignore` file of glob patterns.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::api::{FileAppendParams, FinalizeParams, ReadNewRecipeParams, SymlinkParams};
use crate::assembly::deploy::vcs_url;
use crate::recipe::{self, RecipeError, RecipeState};
use crate::rpc::{Client, ClientError};

/// Glob patterns of files to leave out of an upload.
pub const IGNORE_FILE: &str = ".jscignore";

/// Never uploaded, whatever `.jscignore` says.
const ALWAYS_SKIPPED: [&str; 3] = [".git", ".svn", IGNORE_FILE];

/// Raw bytes per `do_file_append` call.
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Recipe(#[from] RecipeError),

    #[error("recipe source {0:?} is neither a directory nor a repository url")]
    SourceNotFound(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern in {IGNORE_FILE}: {0}")]
    Ignore(#[from] globset::Error),

    #[error("failed to walk recipe directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Deploy the recipe at `source` (a local directory or a repository URL).
/// Returns the final recipe state as committed.
pub async fn deploy(
    client: &mut Client,
    source: &str,
    dev: bool,
) -> Result<RecipeState, DeployError> {
    client.deploy_reset_check().await?;

    let local = Path::new(source);
    let remote_path = if local.is_dir() {
        let files = upload(client, local).await?;
        info!(files, "recipe uploaded");
        ".".to_string()
    } else if vcs_url(source).is_some() {
        source.to_string()
    } else {
        return Err(DeployError::SourceNotFound(source.to_string()));
    };

    let text = client
        .deploy_read_new_recipe(&ReadNewRecipeParams {
            path: remote_path,
            dev,
        })
        .await?;
    let state = recipe::run(client, &text, dev).await?;
    client
        .deploy_finalize(&FinalizeParams {
            dev,
            state: state.clone(),
        })
        .await?;
    Ok(state)
}

/// One item of a recipe directory to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEntry {
    Dir(String),
    File { rel: String, path: PathBuf },
    Symlink { rel: String, target: String },
}

/// Compile `.jscignore` under `root`; a missing file ignores nothing.
pub fn load_ignore(root: &Path) -> Result<GlobSet, DeployError> {
    let path = root.join(IGNORE_FILE);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => return Err(DeployError::Read { path, source }),
    };
    let mut builder = GlobSetBuilder::new();
    for line in text.lines() {
        let pattern = line.trim().trim_end_matches('/');
        if pattern.is_empty() || pattern.starts_with('#') {
            continue;
        }
        let pattern = pattern.trim_start_matches('/');
        builder.add(Glob::new(pattern)?);
        if !pattern.contains('/') {
            builder.add(Glob::new(&format!("**/{pattern}"))?);
        }
    }
    Ok(builder.build()?)
}

/// Everything under `root` that would be uploaded, parents first.
pub fn collect(root: &Path) -> Result<Vec<UploadEntry>, DeployError> {
    let ignore = load_ignore(root)?;
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let skipped = e
                .file_name()
                .to_str()
                .is_some_and(|name| ALWAYS_SKIPPED.contains(&name));
            let ignored = e
                .path()
                .strip_prefix(root)
                .is_ok_and(|rel| ignore.is_match(rel));
            !skipped && !ignored
        });

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_type = entry.file_type();
        if file_type.is_dir() {
            entries.push(UploadEntry::Dir(rel));
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path()).map_err(|source| DeployError::Read {
                path: entry.path().to_path_buf(),
                source,
            })?;
            entries.push(UploadEntry::Symlink {
                rel,
                target: target.to_string_lossy().into_owned(),
            });
        } else if file_type.is_file() {
            entries.push(UploadEntry::File {
                rel,
                path: entry.into_path(),
            });
        }
    }
    Ok(entries)
}

/// Upload a local recipe directory into the remote staging tree. Returns
/// the number of files sent.
pub async fn upload(client: &mut Client, root: &Path) -> Result<usize, DeployError> {
    let mut files = 0;
    for entry in collect(root)? {
        match entry {
            UploadEntry::Dir(rel) => client.mkdir(&rel).await?,
            UploadEntry::Symlink { rel, target } => {
                client
                    .symlink(&SymlinkParams { path: rel, target })
                    .await?
            }
            UploadEntry::File { rel, path } => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|source| DeployError::Read { path, source })?;
                debug!(file = %rel, bytes = bytes.len(), "uploading");
                if bytes.is_empty() {
                    client
                        .file_append(&FileAppendParams {
                            path: rel,
                            content: String::new(),
                        })
                        .await?;
                } else {
                    for chunk in bytes.chunks(CHUNK_SIZE) {
                        client
                            .file_append(&FileAppendParams {
                                path: rel.clone(),
                                content: STANDARD.encode(chunk),
                            })
                            .await?;
                    }
                }
                files += 1;
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn rels(entries: &[UploadEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| match e {
                UploadEntry::Dir(rel) => format!("{rel}/"),
                UploadEntry::File { rel, .. } => rel.clone(),
                UploadEntry::Symlink { rel, target } => format!("{rel} -> {target}"),
            })
            .collect()
    }

    #[test]
    fn test_collect_honours_ignore_file() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(root.join("Jumpstart-Recipe"), "name demo\n").unwrap();
        fs::write(root.join(".jscignore"), "# comment\n*.log\nbuild/\n").unwrap();
        fs::create_dir_all(root.join("conf")).unwrap();
        fs::write(root.join("conf/site.conf"), "x").unwrap();
        fs::write(root.join("conf/debug.log"), "x").unwrap();
        fs::create_dir_all(root.join("build/out")).unwrap();
        fs::write(root.join("build/out/a.o"), "x").unwrap();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        std::os::unix::fs::symlink("conf/site.conf", root.join("default.conf")).unwrap();

        let entries = collect(root).unwrap();
        assert_eq!(
            rels(&entries),
            vec![
                "Jumpstart-Recipe".to_string(),
                "conf/".to_string(),
                "conf/site.conf".to_string(),
                "default.conf -> conf/site.conf".to_string(),
            ]
        );
    }

    #[test]
    fn test_no_ignore_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.log"), "x").unwrap();
        let entries = collect(tmp.path()).unwrap();
        assert_eq!(rels(&entries), vec!["a.log".to_string()]);
    }

    #[test]
    fn test_bad_pattern() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(IGNORE_FILE), "a[\n").unwrap();
        assert!(matches!(collect(tmp.path()), Err(DeployError::Ignore(_))));
    }
}
