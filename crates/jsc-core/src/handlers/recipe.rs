//! One handler per recipe statement.
//!
//! Each takes the statement's arguments plus the current recipe state and
//! returns the new state. Any failure is reported as a recipe runtime error.

use std::fs;

use tracing::info;

use crate::api::RecipeCallParams;
use crate::assembly::fileops;
use crate::assembly::fsutil::remove_path;
use crate::recipe::{GdEntry, PackageEntry, RecipeState};
use crate::server::{Context, HandlerError, interactive};
use crate::tools::git::{self, CloneOptions};
use crate::tools::package;

fn arg<'a>(params: &'a RecipeCallParams, index: usize, what: &str) -> Result<&'a str, HandlerError> {
    params
        .args
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| HandlerError::recipe(format!("missing {what}")))
}

fn option<'a>(params: &'a RecipeCallParams, name: &str) -> Option<&'a str> {
    params.options.get(name).and_then(|v| v.as_str())
}

pub async fn rc_name(ctx: &mut Context, params: RecipeCallParams) -> Result<RecipeState, HandlerError> {
    ctx.assembly.require_session()?;
    let name = arg(&params, 0, "recipe name")?.to_string();
    let mut state = params.state;
    state.name = Some(name);
    Ok(state)
}

pub async fn rc_package(
    ctx: &mut Context,
    params: RecipeCallParams,
) -> Result<RecipeState, HandlerError> {
    ctx.assembly.require_session()?;
    if params.args.is_empty() {
        return Err(HandlerError::recipe("missing package names"));
    }
    ctx.wire
        .progress(format!("Installing {}", params.args.join(" ")))
        .await?;
    let versions = package::install(ctx.assembly.tools(), &params.args)
        .await
        .map_err(HandlerError::into_recipe)?;
    let mut state = params.state;
    for (name, version) in versions {
        state
            .software_list
            .package
            .insert(name, PackageEntry { version });
    }
    Ok(state)
}

pub async fn rc_gd(ctx: &mut Context, params: RecipeCallParams) -> Result<RecipeState, HandlerError> {
    ctx.assembly.require_session()?;
    gd(ctx, params).await.map_err(HandlerError::into_recipe)
}

async fn gd(ctx: &mut Context, params: RecipeCallParams) -> Result<RecipeState, HandlerError> {
    let repo = arg(&params, 0, "repository")?.to_string();
    let path = arg(&params, 1, "checkout path")?.to_string();
    let dev = params.state.is_dev;
    let dst = ctx.assembly.layout().resolve(&path);

    let depth = if dev {
        option(&params, "depth")
            .map(|d| {
                d.parse::<u32>()
                    .map_err(|_| HandlerError::recipe(format!("invalid depth {d:?}")))
            })
            .transpose()?
    } else {
        Some(1)
    };
    let options = CloneOptions {
        depth,
        branch: option(&params, "branch").map(str::to_string),
        pkey: option(&params, "pkey").map(str::to_string),
    };

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(HandlerError::io("create checkout parent"))?;
    }
    ctx.wire.progress(format!("Cloning {repo}")).await?;
    let git_program = ctx.assembly.tools().git.clone();
    let mut checkout = git::clone(&git_program, &repo, &dst, &options).await?;
    if options.branch.is_none()
        && let Some(tagged) = git::checkout_latest_tag(&git_program, &dst).await?
    {
        checkout = tagged;
    }
    if !dev {
        remove_path(&dst.join(".git")).map_err(HandlerError::io("strip vcs metadata"))?;
    }

    info!(%repo, %path, commit = %checkout.commit, "checkout recorded");
    let mut state = params.state;
    state.software_list.gd.insert(
        path,
        GdEntry {
            repo,
            reference: checkout.reference,
            commit: checkout.commit,
        },
    );
    Ok(state)
}

/// Run a shell line interactively from the staged recipe sources.
pub async fn rc_run(ctx: &mut Context, params: RecipeCallParams) -> Result<RecipeState, HandlerError> {
    ctx.assembly.require_session()?;
    let line = arg(&params, 0, "command line")?;
    let layout = ctx.assembly.layout();
    let src = layout.new_recipe_src();
    let cwd = if src.is_dir() { src } else { layout.code_dir() };
    let shell = ctx.assembly.tools().shell.clone();
    let args = vec!["-c".to_string(), line.to_string()];

    let code = interactive::run(&mut ctx.wire, &shell, &args, &cwd)
        .await
        .map_err(HandlerError::into_recipe)?;
    if code != 0 {
        return Err(HandlerError::recipe(format!(
            "command exited with status {code}"
        )));
    }
    Ok(params.state)
}

pub async fn rc_install(
    ctx: &mut Context,
    params: RecipeCallParams,
) -> Result<RecipeState, HandlerError> {
    ctx.assembly.require_session()?;
    let layout = ctx.assembly.layout();
    let src = layout.resolve(arg(&params, 0, "source path")?);
    let dst = layout.resolve(arg(&params, 1, "destination path")?);
    fileops::install(&src, &dst).map_err(HandlerError::into_recipe)?;
    Ok(params.state)
}

pub async fn rc_append(
    ctx: &mut Context,
    params: RecipeCallParams,
) -> Result<RecipeState, HandlerError> {
    ctx.assembly.require_session()?;
    write(ctx, params, true)
}

pub async fn rc_put(ctx: &mut Context, params: RecipeCallParams) -> Result<RecipeState, HandlerError> {
    ctx.assembly.require_session()?;
    write(ctx, params, false)
}

fn write(ctx: &Context, params: RecipeCallParams, append: bool) -> Result<RecipeState, HandlerError> {
    let path = ctx.assembly.layout().resolve(arg(&params, 0, "file path")?);
    let content = arg(&params, 1, "content")?;
    fileops::write_text(&path, content, append).map_err(HandlerError::into_recipe)?;
    Ok(params.state)
}

/// Replace every occurrence, or the first `--count` ones when given.
pub async fn rc_replace(
    ctx: &mut Context,
    params: RecipeCallParams,
) -> Result<RecipeState, HandlerError> {
    ctx.assembly.require_session()?;
    let path = ctx.assembly.layout().resolve(arg(&params, 0, "file path")?);
    let needle = arg(&params, 1, "search text")?;
    let replacement = arg(&params, 2, "replacement")?;
    let count = option(&params, "count")
        .map(|c| {
            c.parse::<usize>()
                .map_err(|_| HandlerError::recipe(format!("invalid count {c:?}")))
        })
        .transpose()?;
    fileops::replace(&path, needle, replacement, count).map_err(HandlerError::into_recipe)?;
    Ok(params.state)
}

pub async fn rc_insert(
    ctx: &mut Context,
    params: RecipeCallParams,
) -> Result<RecipeState, HandlerError> {
    ctx.assembly.require_session()?;
    let path = ctx.assembly.layout().resolve(arg(&params, 0, "file path")?);
    let needle = arg(&params, 1, "needle")?;
    let insertion = arg(&params, 2, "insertion")?;
    fileops::insert_after_first(&path, needle, insertion).map_err(HandlerError::into_recipe)?;
    Ok(params.state)
}

pub async fn rc_rinsert(
    ctx: &mut Context,
    params: RecipeCallParams,
) -> Result<RecipeState, HandlerError> {
    ctx.assembly.require_session()?;
    let path = ctx.assembly.layout().resolve(arg(&params, 0, "file path")?);
    let needle = arg(&params, 1, "needle")?;
    let insertion = arg(&params, 2, "insertion")?;
    fileops::insert_before_last(&path, needle, insertion).map_err(HandlerError::into_recipe)?;
    Ok(params.state)
}
