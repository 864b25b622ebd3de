//! Workspace backups under `.jsc/backups`.
//!
//! Each backup is a directory `<id>@<UTC time>` holding `data.tar.gz`, a
//! `size` marker with the uncompressed tar size and a copy of the committed
//! recipe. Ids come from the `seq` counter and are never reused.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::api::{BackupEntry, BackupUsage};
use crate::server::{HandlerError, Wire};

use super::Layout;
use super::fsutil::{copy_tree, remove_path, sync_dir};
use super::recipe_dir::{NO_RECIPE, RecipeDir};
use super::status::filesystem_size;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SUTC";
const ARCHIVE: &str = "data.tar.gz";
const SIZE_MARKER: &str = "size";
const RECIPE_COPY: &str = "recipe";

/// Paths below the code directory that never go into an archive.
const EXCLUDED: [&str; 4] = ["lost+found", ".jsc", ".pacman/cache", ".pacman/db/sync"];

/// A backup directory found on disk.
#[derive(Debug, Clone)]
pub struct StoredBackup {
    pub id: u64,
    pub created: NaiveDateTime,
    pub path: PathBuf,
}

impl StoredBackup {
    pub fn entry(&self) -> BackupEntry {
        let recipe = self.recipe();
        BackupEntry {
            id: self.id,
            date: self.created.format("%Y-%m-%d").to_string(),
            time: self.created.format("%H:%M:%S").to_string(),
            zone: "UTC".to_string(),
            recipe_name: if recipe.exists() {
                recipe.name()
            } else {
                NO_RECIPE.to_string()
            },
        }
    }

    pub fn archive(&self) -> PathBuf {
        self.path.join(ARCHIVE)
    }

    pub fn recipe(&self) -> RecipeDir {
        RecipeDir::new(self.path.join(RECIPE_COPY))
    }

    /// Uncompressed size recorded at creation, 0 when unreadable.
    pub fn raw_size(&self) -> u64 {
        fs::read_to_string(self.path.join(SIZE_MARKER))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// `"<id>@<time>"` → `(id, time)`.
pub fn parse_dir_name(name: &str) -> Option<(u64, NaiveDateTime)> {
    let (id, time) = name.split_once('@')?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let id = id.parse().ok()?;
    let created = NaiveDateTime::parse_from_str(time, TIME_FORMAT).ok()?;
    Some((id, created))
}

/// Every backup, ordered by id. Staging directories are skipped.
pub fn list(layout: &Layout) -> Result<Vec<StoredBackup>, HandlerError> {
    let dir = layout.backups_dir();
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(HandlerError::io("list backups")(e)),
    };
    let mut backups = Vec::new();
    for entry in entries {
        let entry = entry.map_err(HandlerError::io("list backups"))?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if let Some((id, created)) = parse_dir_name(&name) {
            backups.push(StoredBackup {
                id,
                created,
                path: entry.path(),
            });
        }
    }
    backups.sort_by_key(|b| b.id);
    Ok(backups)
}

pub fn find(layout: &Layout, id: u64) -> Result<Option<StoredBackup>, HandlerError> {
    Ok(list(layout)?.into_iter().find(|b| b.id == id))
}

/// Listing with sizes for `do_backup_du`.
pub fn usage(layout: &Layout) -> Result<Vec<BackupUsage>, HandlerError> {
    let disk = filesystem_size(&layout.code_dir())?;
    let usage = list(layout)?
        .into_iter()
        .map(|backup| {
            let size = fs::metadata(backup.archive()).map(|m| m.len()).unwrap_or(0);
            let percent_of_disk = if disk == 0 {
                0.0
            } else {
                size as f64 / disk as f64 * 100.0
            };
            BackupUsage {
                raw_size: backup.raw_size(),
                entry: backup.entry(),
                size,
                percent_of_disk,
            }
        })
        .collect();
    Ok(usage)
}

/// Take a new backup of the workspace.
pub async fn create(layout: &Layout, wire: &mut Wire) -> Result<BackupEntry, HandlerError> {
    if layout.is_code_dir_clean()? {
        return Err(HandlerError::BackupIsClean(layout.display(&layout.code_dir())));
    }

    let staging = layout.new_backup_dir();
    match fs::create_dir(&staging) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(HandlerError::BackupConflict(
                "another backup is being created".to_string(),
            ));
        }
        Err(e) => return Err(HandlerError::io("create backup staging dir")(e)),
    }

    match fill_staging(layout, wire, &staging).await {
        Ok(entry) => Ok(entry),
        Err(e) => {
            if let Err(cleanup) = remove_path(&staging) {
                warn!(error = %cleanup, "failed to drop backup staging dir");
            }
            Err(e)
        }
    }
}

async fn fill_staging(
    layout: &Layout,
    wire: &mut Wire,
    staging: &Path,
) -> Result<BackupEntry, HandlerError> {
    let id = allocate_id(layout)?;
    wire.progress(format!("Creating backup {id}")).await?;

    wire.progress("Compressing").await?;
    let raw_size = write_archive(layout, &staging.join(ARCHIVE))?;
    fs::write(staging.join(SIZE_MARKER), raw_size.to_string())
        .map_err(HandlerError::io("write size marker"))?;

    let recipe = layout.recipe_dir();
    if recipe.is_dir() {
        wire.progress("Saving recipe").await?;
        copy_tree(&recipe, &staging.join(RECIPE_COPY)).map_err(HandlerError::io("copy recipe"))?;
    }

    wire.progress("Finishing up").await?;
    sync_dir(staging).map_err(HandlerError::io("sync backup"))?;
    let created = Utc::now().naive_utc();
    let name = format!("{id}@{}", created.format(TIME_FORMAT));
    let dest = layout.backups_dir().join(&name);
    fs::rename(staging, &dest).map_err(HandlerError::io("publish backup"))?;
    sync_dir(&layout.backups_dir()).map_err(HandlerError::io("sync backups dir"))?;

    info!(id, raw_size, "backup created");
    let stored = StoredBackup {
        id,
        created: parse_dir_name(&name).map_or(created, |(_, t)| t),
        path: dest,
    };
    Ok(stored.entry())
}

/// Reserve the next backup id.
///
/// The new value goes to an exclusively created temp file which is renamed
/// over the counter only if the counter did not move meanwhile.
fn allocate_id(layout: &Layout) -> Result<u64, HandlerError> {
    let seq = layout.seq_file();
    let tmp = layout.seq_tmp_file();
    let current = read_counter(&seq)?;

    let mut file = match OpenOptions::new().write(true).create_new(true).open(&tmp) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(HandlerError::BackupConflict(
                "backup counter is being updated by another session".to_string(),
            ));
        }
        Err(e) => return Err(HandlerError::io("create counter temp file")(e)),
    };
    let next = current + 1;
    file.write_all(next.to_string().as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(HandlerError::io("write counter temp file"))?;

    if read_counter(&seq)? != current {
        let _ = fs::remove_file(&tmp);
        return Err(HandlerError::BackupConflict(
            "backup counter advanced concurrently".to_string(),
        ));
    }
    fs::rename(&tmp, &seq).map_err(HandlerError::io("update backup counter"))?;
    sync_dir(&layout.backups_dir()).map_err(HandlerError::io("sync backups dir"))?;
    debug!(id = current, "backup id allocated");
    Ok(current)
}

fn read_counter(path: &Path) -> Result<u64, HandlerError> {
    let text = fs::read_to_string(path).map_err(HandlerError::io("read backup counter"))?;
    text.trim()
        .parse()
        .map_err(|e| HandlerError::Internal(format!("corrupt backup counter {text:?}: {e}")))
}

/// Counts bytes on their way into the compressor.
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Archive the workspace into `dest`; returns the uncompressed tar size.
fn write_archive(layout: &Layout, dest: &Path) -> Result<u64, HandlerError> {
    let root = layout.root();
    let code = layout.code_dir();
    let file = File::create(dest).map_err(HandlerError::io("create archive"))?;
    let counting = CountingWriter {
        inner: GzEncoder::new(file, Compression::default()),
        count: 0,
    };
    let mut builder = tar::Builder::new(counting);
    builder.follow_symlinks(false);

    let excluded: Vec<PathBuf> = EXCLUDED.iter().map(|rel| code.join(rel)).collect();
    let mut sources = vec![code.clone()];
    let recipe = layout.recipe_dir();
    if recipe.is_dir() {
        sources.push(recipe);
    }

    for (i, source) in sources.iter().enumerate() {
        let walker = WalkDir::new(source)
            .follow_links(false)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| i > 0 || !excluded.iter().any(|x| e.path() == x));
        for entry in walker {
            let entry = entry.map_err(|e| HandlerError::Internal(format!("walk workspace: {e}")))?;
            let file_type = entry.file_type();
            if !(file_type.is_file() || file_type.is_dir() || file_type.is_symlink()) {
                debug!(path = %entry.path().display(), "skipping special file");
                continue;
            }
            let name = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| HandlerError::Internal(format!("archive path: {e}")))?;
            builder
                .append_path_with_name(entry.path(), name)
                .map_err(HandlerError::io(format!("archive {}", layout.display(entry.path()))))?;
        }
    }

    let counting = builder
        .into_inner()
        .map_err(HandlerError::io("finish archive"))?;
    let raw_size = counting.count;
    let file = counting
        .inner
        .finish()
        .map_err(HandlerError::io("finish compression"))?;
    file.sync_all().map_err(HandlerError::io("sync archive"))?;
    Ok(raw_size)
}

/// Delete a backup. Its id stays burned.
pub fn remove(layout: &Layout, id: u64) -> Result<(), HandlerError> {
    let backup = find(layout, id)?.ok_or(HandlerError::BackupInvalidId(id))?;
    let doomed = layout.deleted_backup_dir();
    remove_path(&doomed).map_err(HandlerError::io("drop earlier deletion leftover"))?;
    fs::rename(&backup.path, &doomed).map_err(HandlerError::io("stage backup for deletion"))?;
    sync_dir(&layout.backups_dir()).map_err(HandlerError::io("sync backups dir"))?;
    fs::remove_dir_all(&doomed).map_err(HandlerError::io("delete backup"))?;
    info!(id, "backup removed");
    Ok(())
}

/// Unpack a backup over a clean workspace. A recipe saved with the backup
/// comes back as the pending new recipe.
pub async fn restore(layout: &Layout, wire: &mut Wire, id: u64) -> Result<(), HandlerError> {
    if !layout.is_code_dir_clean()? {
        return Err(HandlerError::RevertNotClean(layout.display(&layout.code_dir())));
    }
    let backup = find(layout, id)?.ok_or(HandlerError::RevertInvalidId(id))?;

    wire.progress(format!("Restoring backup {id}")).await?;
    extract(&backup.archive(), layout.root()).map_err(HandlerError::io("extract archive"))?;

    let saved = backup.recipe();
    if saved.exists() {
        wire.progress("Restaging recipe").await?;
        let staging = layout.new_recipe_dir();
        remove_path(&staging).map_err(HandlerError::io("drop staged recipe"))?;
        copy_tree(saved.path(), &staging).map_err(HandlerError::io("stage saved recipe"))?;
        sync_dir(&staging).map_err(HandlerError::io("sync staged recipe"))?;
        sync_dir(&layout.jsc_dir()).map_err(HandlerError::io("sync bookkeeping dir"))?;
    }

    let committed = RecipeDir::new(layout.recipe_dir());
    if committed.exists() {
        committed
            .set_synced(false)
            .map_err(HandlerError::io("reset sync flag"))?;
    }
    sync_dir(&layout.code_dir()).map_err(HandlerError::io("sync code dir"))?;
    info!(id, "backup restored");
    Ok(())
}

fn extract(archive: &Path, root: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(archive)?));
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    archive.unpack(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::workspace;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_dir_name() {
        let (id, created) = parse_dir_name("12@2016-01-05T13:14:15UTC").unwrap();
        assert_eq!(id, 12);
        assert_eq!(created.format("%Y-%m-%d %H:%M:%S").to_string(), "2016-01-05 13:14:15");
        assert!(parse_dir_name("new-backup").is_none());
        assert!(parse_dir_name("x@2016-01-05T13:14:15UTC").is_none());
        assert!(parse_dir_name("1@yesterday").is_none());
    }

    #[test]
    fn test_allocate_id_advances() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::new(tmp.path());
        workspace::init(&layout).unwrap();
        assert_eq!(allocate_id(&layout).unwrap(), 1);
        assert_eq!(allocate_id(&layout).unwrap(), 2);
        assert_eq!(fs::read_to_string(layout.seq_file()).unwrap(), "3");
    }

    #[test]
    fn test_allocate_id_detects_concurrent_update() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::new(tmp.path());
        workspace::init(&layout).unwrap();
        fs::write(layout.seq_tmp_file(), "2").unwrap();
        assert!(matches!(
            allocate_id(&layout),
            Err(HandlerError::BackupConflict(_))
        ));
        assert_eq!(fs::read_to_string(layout.seq_file()).unwrap(), "1");
    }

    #[test]
    fn test_archive_skips_excluded_paths() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::new(tmp.path());
        workspace::init(&layout).unwrap();
        let code = layout.code_dir();
        fs::write(code.join("index.html"), "hello").unwrap();
        fs::create_dir_all(code.join(".pacman/cache")).unwrap();
        fs::write(code.join(".pacman/cache/pkg.tar.xz"), "big").unwrap();
        fs::create_dir_all(code.join(".pacman/local")).unwrap();
        fs::create_dir_all(layout.recipe_dir().join("src")).unwrap();
        fs::write(layout.recipe_dir().join("is-dev"), "0").unwrap();

        let dest = tmp.path().join("out.tar.gz");
        let raw = write_archive(&layout, &dest).unwrap();
        assert!(raw > 0);
        assert_eq!(raw % 512, 0);

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&dest).unwrap()));
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| {
                let path = e.unwrap().path().unwrap().display().to_string();
                path.trim_end_matches('/').to_string()
            })
            .collect();
        names.sort();
        assert!(names.contains(&"app/code/index.html".to_string()));
        assert!(names.contains(&"app/code/.pacman/local".to_string()));
        assert!(names.contains(&"app/code/.jsc/recipe/is-dev".to_string()));
        assert!(!names.iter().any(|n| n.contains("cache")));
        assert!(!names.iter().any(|n| n.contains("backups")));
    }
}
