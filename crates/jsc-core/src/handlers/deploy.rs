//! Deploy phases and the recipe upload primitives.
//!
//! Uploads target the staging source tree only; paths are relative to it.

use tracing::debug;

use crate::api::{FileAppendParams, FinalizeParams, MkdirParams, NoParams, ReadNewRecipeParams, SymlinkParams};
use crate::assembly::{deploy, fileops};
use crate::server::{Context, HandlerError};

pub async fn do_deploy_reset_check(ctx: &mut Context, _: NoParams) -> Result<(), HandlerError> {
    ctx.assembly.require_session()?;
    deploy::reset_check(ctx.assembly.layout())
}

/// Returns the text of the staged recipe script.
pub async fn do_deploy_read_new_recipe(
    ctx: &mut Context,
    params: ReadNewRecipeParams,
) -> Result<String, HandlerError> {
    ctx.assembly.require_session()?;
    let layout = ctx.assembly.layout().clone();
    let tools = ctx.assembly.tools().clone();
    deploy::read_new_recipe(&layout, &tools, &mut ctx.wire, &params).await
}

pub async fn do_deploy_finalize(
    ctx: &mut Context,
    params: FinalizeParams,
) -> Result<(), HandlerError> {
    ctx.assembly.require_session()?;
    deploy::finalize(ctx.assembly.layout(), &params)?;
    ctx.wire.progress("Deploy finalized").await?;
    ctx.assembly.sync_best_effort(&mut ctx.wire).await
}

pub async fn do_file_append(ctx: &mut Context, params: FileAppendParams) -> Result<(), HandlerError> {
    ctx.assembly.require_session()?;
    let path = ctx.assembly.layout().staging_path(&params.path)?;
    debug!(path = %params.path, bytes = params.content.len(), "upload chunk");
    fileops::append_base64(&path, &params.content)
}

pub async fn do_symlink(ctx: &mut Context, params: SymlinkParams) -> Result<(), HandlerError> {
    ctx.assembly.require_session()?;
    let path = ctx.assembly.layout().staging_path(&params.path)?;
    fileops::symlink(&path, &params.target)
}

pub async fn do_mkdir(ctx: &mut Context, params: MkdirParams) -> Result<(), HandlerError> {
    ctx.assembly.require_session()?;
    let path = ctx.assembly.layout().staging_path(&params.path)?;
    fileops::mkdir(&path)
}
