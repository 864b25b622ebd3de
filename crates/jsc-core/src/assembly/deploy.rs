//! Server side of a deploy: reset, fetch and finalize.
//!
//! Staging lives in `.jsc/new-recipe` until finalize renames it over
//! `.jsc/recipe`; at most one of the two describes a complete deploy.

use std::fs;
use std::io;

use chrono::Local;
use tracing::info;

use jsc_config::ToolsConfig;

use crate::api::{FinalizeParams, ReadNewRecipeParams};
use crate::server::{HandlerError, Wire};
use crate::tools::git::{self, CloneOptions};

use super::Layout;
use super::fsutil::{remove_path, sync_dir};
use super::recipe_dir::RecipeDir;

/// Verify the workspace is clean and prepare an empty staging tree.
pub fn reset_check(layout: &Layout) -> Result<(), HandlerError> {
    if !layout.is_code_dir_clean()? {
        return Err(HandlerError::DeployNotClean);
    }
    remove_path(&layout.recipe_dir()).map_err(HandlerError::io("remove committed recipe"))?;
    remove_path(&layout.new_recipe_dir()).map_err(HandlerError::io("remove staged recipe"))?;
    fs::create_dir_all(layout.new_recipe_src()).map_err(HandlerError::io("create staging dir"))?;
    Ok(())
}

/// Clone URL for a recipe location, or `None` for an uploaded local path.
pub fn vcs_url(path: &str) -> Option<String> {
    if let Some(repo) = path.strip_prefix("github:") {
        let repo = repo.trim_end_matches(".git");
        return Some(format!("https://github.com/{repo}.git"));
    }
    const SCHEMES: [&str; 5] = ["git@", "git://", "http://", "https://", "ssh://"];
    if SCHEMES.iter().any(|s| path.starts_with(s)) || path.ends_with(".git") {
        return Some(path.to_string());
    }
    None
}

/// Make sure the staging tree holds a recipe and return its text.
///
/// A VCS location is cloned into staging first; anything else must have
/// been uploaded already.
pub async fn read_new_recipe(
    layout: &Layout,
    tools: &ToolsConfig,
    wire: &mut Wire,
    params: &ReadNewRecipeParams,
) -> Result<String, HandlerError> {
    if let Some(url) = vcs_url(&params.path) {
        let src = layout.new_recipe_src();
        remove_path(&src).map_err(HandlerError::io("clear staging src"))?;
        fs::create_dir_all(layout.new_recipe_dir())
            .map_err(HandlerError::io("create staging dir"))?;
        wire.progress(format!("Fetching recipe from {url}")).await?;
        let options = CloneOptions {
            depth: (!params.dev).then_some(1),
            ..Default::default()
        };
        git::clone(&tools.git, &url, &src, &options)
            .await
            .map_err(|e| HandlerError::RecipeFetch {
                url: url.clone(),
                message: e.to_string(),
            })?;
        if !params.dev {
            remove_path(&src.join(".git")).map_err(HandlerError::io("strip vcs metadata"))?;
        }
        sync_dir(&layout.new_recipe_dir()).map_err(HandlerError::io("sync staging dir"))?;
    }

    match fs::read_to_string(layout.new_recipe_script()) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(HandlerError::NoRecipe),
        Err(e) => Err(HandlerError::io("read recipe")(e)),
    }
}

/// Record the deploy in staging and commit it.
pub fn finalize(layout: &Layout, params: &FinalizeParams) -> Result<(), HandlerError> {
    if !layout.new_recipe_script().is_file() {
        return Err(HandlerError::NoRecipe);
    }
    let staging = RecipeDir::new(layout.new_recipe_dir());
    staging
        .write_deploy(&params.state, params.dev, Local::now())
        .map_err(HandlerError::io("record deploy"))?;

    let jsc = layout.jsc_dir();
    sync_dir(&layout.code_dir()).map_err(HandlerError::io("sync code dir"))?;
    sync_dir(&jsc).map_err(HandlerError::io("sync bookkeeping dir"))?;

    let committed = layout.recipe_dir();
    remove_path(&committed).map_err(HandlerError::io("remove previous recipe"))?;
    fs::rename(staging.path(), &committed).map_err(HandlerError::io("commit recipe"))?;
    sync_dir(&jsc).map_err(HandlerError::io("sync bookkeeping dir"))?;

    info!(
        name = params.state.name.as_deref().unwrap_or("<unnamed>"),
        dev = params.dev,
        "deploy finalized"
    );
    Ok(())
}
