//! Backup methods.

use crate::api::{BackupEntry, BackupIdParams, BackupUsage, NoParams};
use crate::assembly::backup;
use crate::server::{Context, HandlerError};

pub async fn do_backup_new(ctx: &mut Context, _: NoParams) -> Result<BackupEntry, HandlerError> {
    ctx.assembly.require_session()?;
    let layout = ctx.assembly.layout().clone();
    backup::create(&layout, &mut ctx.wire).await
}

pub async fn do_backup_ls(ctx: &mut Context, _: NoParams) -> Result<Vec<BackupEntry>, HandlerError> {
    Ok(backup::list(ctx.assembly.layout())?
        .iter()
        .map(backup::StoredBackup::entry)
        .collect())
}

pub async fn do_backup_du(ctx: &mut Context, _: NoParams) -> Result<Vec<BackupUsage>, HandlerError> {
    backup::usage(ctx.assembly.layout())
}

pub async fn do_backup_rm(ctx: &mut Context, params: BackupIdParams) -> Result<(), HandlerError> {
    ctx.assembly.require_session()?;
    backup::remove(ctx.assembly.layout(), params.id)
}

/// Restore a backup, then sync the restored software list best-effort.
pub async fn do_revert(ctx: &mut Context, params: BackupIdParams) -> Result<(), HandlerError> {
    ctx.assembly.require_session()?;
    let layout = ctx.assembly.layout().clone();
    backup::restore(&layout, &mut ctx.wire, params.id).await?;
    ctx.assembly.sync_best_effort(&mut ctx.wire).await
}
