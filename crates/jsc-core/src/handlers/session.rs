//! Session setup and administrative methods.

use serde_json::Value;
use tracing::info;

use crate::api::{CheckInit, CleanParams, LockSessionParams, NoParams, StatusReport};
use crate::assembly::{env, status, sync, workspace};
use crate::build_info;
use crate::server::{Context, HandlerError, interactive};

pub async fn do_assert_is_assembly(ctx: &mut Context, _: NoParams) -> Result<(), HandlerError> {
    if env::is_assembly(ctx.assembly.layout()) {
        Ok(())
    } else {
        Err(HandlerError::NotAssembly)
    }
}

pub async fn do_check_init(ctx: &mut Context, _: NoParams) -> Result<CheckInit, HandlerError> {
    Ok(workspace::check_init(ctx.assembly.layout()))
}

pub async fn do_init(ctx: &mut Context, _: NoParams) -> Result<(), HandlerError> {
    ctx.assembly.require_session()?;
    workspace::init(ctx.assembly.layout())
}

pub async fn do_lock_session(
    ctx: &mut Context,
    holder: LockSessionParams,
) -> Result<(), HandlerError> {
    ctx.assembly.lock_session(&holder)
}

pub async fn do_env(ctx: &mut Context, _: NoParams) -> Result<Value, HandlerError> {
    env::load_raw(ctx.assembly.layout())
}

pub async fn do_version(_: &mut Context, _: NoParams) -> Result<String, HandlerError> {
    Ok(build_info::version_string())
}

pub async fn do_status(ctx: &mut Context, _: NoParams) -> Result<StatusReport, HandlerError> {
    status::report(ctx.assembly.layout())
}

pub async fn do_sync(ctx: &mut Context, _: NoParams) -> Result<(), HandlerError> {
    ctx.assembly.require_session()?;
    sync::sync_software_list(ctx.assembly.layout(), ctx.assembly.http()).await
}

pub async fn do_clean(ctx: &mut Context, params: CleanParams) -> Result<(), HandlerError> {
    ctx.assembly.require_session()?;
    let (code, state) = params.datasets();
    let layout = ctx.assembly.layout().clone();
    if state {
        ctx.wire.progress("Cleaning state").await?;
        workspace::clean_state(&layout)?;
    }
    if code {
        ctx.wire.progress("Cleaning code").await?;
        workspace::clean_code(&layout)?;
        workspace::init(&layout)?;
        ctx.assembly.sync_best_effort(&mut ctx.wire).await?;
    }
    Ok(())
}

/// Start `app/code/init` interactively; the result is its exit code.
pub async fn do_run(ctx: &mut Context, _: NoParams) -> Result<i32, HandlerError> {
    ctx.assembly.require_session()?;
    let layout = ctx.assembly.layout();
    let init = layout.init_script();
    if !init.is_file() {
        return Err(HandlerError::Internal(format!(
            "{} does not exist",
            layout.display(&init)
        )));
    }
    let code_dir = layout.code_dir();
    let program = init.to_string_lossy().into_owned();
    let code = interactive::run(&mut ctx.wire, &program, &[], &code_dir).await?;
    info!(code, "init finished");
    Ok(code)
}
