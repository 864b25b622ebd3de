//! Bookkeeping setup and workspace cleaning.

use std::fs;
use std::io;

use tracing::{debug, info};

use crate::api::CheckInit;
use crate::server::HandlerError;

use super::Layout;
use super::fsutil::{remove_path, sync_dir};
use super::layout::ALLOW_LIST;

/// Does the bookkeeping tree still need to be created?
pub fn check_init(layout: &Layout) -> CheckInit {
    let ready = layout.jsc_dir().is_dir()
        && layout.backups_dir().is_dir()
        && layout.seq_file().is_file();
    CheckInit { needs_init: !ready }
}

/// Create the bookkeeping tree and drop staging leftovers of an earlier
/// session that died midway.
pub fn init(layout: &Layout) -> Result<(), HandlerError> {
    let backups = layout.backups_dir();
    fs::create_dir_all(&backups).map_err(HandlerError::io("create bookkeeping directories"))?;

    let seq = layout.seq_file();
    if !seq.exists() {
        fs::write(&seq, "1").map_err(HandlerError::io("seed backup counter"))?;
        sync_dir(&backups).map_err(HandlerError::io("sync backups dir"))?;
        info!("backup counter seeded");
    }

    for leftover in [
        layout.new_recipe_dir(),
        layout.new_backup_dir(),
        layout.deleted_backup_dir(),
        layout.seq_tmp_file(),
    ] {
        if fs::symlink_metadata(&leftover).is_ok() {
            debug!(path = %leftover.display(), "purging leftover");
            remove_path(&leftover)
                .map_err(HandlerError::io(format!("purge {}", layout.display(&leftover))))?;
        }
    }
    Ok(())
}

/// Empty `app/state`, keeping `lost+found`.
pub fn clean_state(layout: &Layout) -> Result<(), HandlerError> {
    let state = layout.state_dir();
    remove_entries(&state, &["lost+found"])
        .map_err(HandlerError::io(format!("clean {}", layout.display(&state))))?;
    info!("state dataset cleaned");
    Ok(())
}

/// Drop everything deployed into the workspace: user content, the package
/// database and the staged and committed recipes. Backups survive.
pub fn clean_code(layout: &Layout) -> Result<(), HandlerError> {
    let code = layout.code_dir();
    remove_path(&layout.package_db_dir()).map_err(HandlerError::io("remove package database"))?;
    remove_entries(&code, &ALLOW_LIST)
        .map_err(HandlerError::io(format!("clean {}", layout.display(&code))))?;
    remove_path(&layout.recipe_dir()).map_err(HandlerError::io("remove committed recipe"))?;
    remove_path(&layout.new_recipe_dir()).map_err(HandlerError::io("remove staged recipe"))?;
    if code.is_dir() {
        sync_dir(&code).map_err(HandlerError::io("sync code dir"))?;
    }
    info!("code dataset cleaned");
    Ok(())
}

fn remove_entries(dir: &std::path::Path, keep: &[&str]) -> io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        if keep.iter().any(|k| entry.file_name() == *k) {
            continue;
        }
        remove_path(&entry.path())?;
    }
    Ok(())
}
