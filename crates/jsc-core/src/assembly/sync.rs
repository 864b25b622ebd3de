//! Software list synchronization with the platform index.

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, info};

use crate::recipe::SoftwareList;
use crate::server::HandlerError;

use super::recipe_dir::RecipeDir;
use super::{Layout, env};

/// Post the deployed software list to the sync URL from `app/env.json`.
///
/// Without a deploy an empty list is posted. An already synced recipe and
/// an environment without a sync URL are no-ops.
pub async fn sync_software_list(
    layout: &Layout,
    http: &reqwest::Client,
) -> Result<(), HandlerError> {
    let container = env::load(layout)?.ident.container;
    let Some(url) = container.software_list_sync_url else {
        debug!("no software list sync url, skipping sync");
        return Ok(());
    };

    let recipe = RecipeDir::new(layout.recipe_dir());
    let body = if recipe.exists() {
        if recipe.is_synced() {
            debug!("software list already synced");
            return Ok(());
        }
        recipe
            .software_list_raw()
            .map_err(|_| HandlerError::SyncNoRecipe)?
    } else {
        serde_json::to_string(&SoftwareList::default())
            .map_err(|e| HandlerError::Internal(format!("encode software list: {e}")))?
    };

    let session_key = container.session_key.unwrap_or_default();
    let response = http
        .post(&url)
        .header(AUTHORIZATION, format!("Session-Key {session_key}"))
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .map_err(HandlerError::SyncHttp)?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(HandlerError::SyncRejected(status.as_u16()));
    }
    if recipe.exists() {
        recipe
            .set_synced(true)
            .map_err(HandlerError::io("mark software list synced"))?;
    }
    info!(%url, "software list synced");
    Ok(())
}
