//! Exclusive session lock on `.jsc/lock`.
//!
//! The lock is an advisory `flock` held for the lifetime of the dispatcher
//! process. Its content names the holder so a refused session can say who
//! got there first.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info};

use crate::api::LockSessionParams;
use crate::server::HandlerError;

/// A held session lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl SessionLock {
    /// Take the lock without blocking and record `holder` in the file.
    pub fn acquire(path: &Path, holder: &LockSessionParams) -> Result<Self, HandlerError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(HandlerError::io(format!("open {}", path.display())))?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() != fs2::lock_contended_error().kind() {
                return Err(HandlerError::io(format!("lock {}", path.display()))(e));
            }
            let (hostname, since) = match read_holder(path) {
                Some(current) => (current.hostname, current.unix_epoch.to_string()),
                None => ("unknown".to_string(), "unknown".to_string()),
            };
            debug!(%hostname, %since, "session lock is taken");
            return Err(HandlerError::SessionLocked { hostname, since });
        }

        let content = serde_json::to_vec(holder)
            .map_err(|e| HandlerError::Internal(format!("encode lock holder: {e}")))?;
        file.set_len(0)
            .and_then(|()| file.seek(SeekFrom::Start(0)))
            .and_then(|_| file.write_all(&content))
            .and_then(|()| file.sync_all())
            .map_err(HandlerError::io(format!("write {}", path.display())))?;

        info!(hostname = %holder.hostname, "session lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Current holder as recorded in the file.
    pub fn holder(&self) -> Option<LockSessionParams> {
        read_holder(&self.path)
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn read_holder(path: &Path) -> Option<LockSessionParams> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}
