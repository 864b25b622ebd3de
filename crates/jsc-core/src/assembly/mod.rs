//! The remote assembly: filesystem layout, session lock and the state
//! machines behind the `do_*` methods.

pub mod backup;
pub mod deploy;
pub mod env;
pub mod fileops;
pub mod fsutil;
pub mod layout;
pub mod lock;
pub mod recipe_dir;
pub mod status;
pub mod sync;
pub mod workspace;

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use jsc_config::{AppConfig, ToolsConfig};

use crate::api::LockSessionParams;
use crate::server::{HandlerError, Wire};

pub use layout::Layout;
pub use lock::SessionLock;
pub use recipe_dir::RecipeDir;

const SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the handlers need besides the wire.
pub struct Assembly {
    layout: Layout,
    tools: ToolsConfig,
    session: Option<SessionLock>,
    http: reqwest::Client,
}

impl Assembly {
    pub fn new(root: impl Into<PathBuf>, tools: ToolsConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(SYNC_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            layout: Layout::new(root),
            tools,
            session: None,
            http,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.assembly.root.clone(), config.tools.clone())
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn tools(&self) -> &ToolsConfig {
        &self.tools
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Take the session lock for the rest of this process. Locking again
    /// from the same session is a no-op.
    pub fn lock_session(&mut self, holder: &LockSessionParams) -> Result<(), HandlerError> {
        if self.holds_session() {
            debug!("session lock already held by this process");
            return Ok(());
        }
        std::fs::create_dir_all(self.layout.jsc_dir())
            .map_err(HandlerError::io("create bookkeeping directory"))?;
        self.session = Some(SessionLock::acquire(&self.layout.lock_file(), holder)?);
        Ok(())
    }

    pub fn holds_session(&self) -> bool {
        self.session.is_some()
    }

    /// Gate for every method that changes the workspace.
    pub fn require_session(&self) -> Result<(), HandlerError> {
        if self.holds_session() {
            Ok(())
        } else {
            Err(HandlerError::NotLocked)
        }
    }

    /// Sync the software list, downgrading any failure to a warning sent to
    /// the operator.
    pub async fn sync_best_effort(&self, wire: &mut Wire) -> Result<(), HandlerError> {
        if let Err(err) = sync::sync_software_list(&self.layout, &self.http).await {
            warn!(error = %err, "software list sync failed");
            wire.warn(format!("Warning: software list sync failed: {err}"))
                .await?;
        }
        Ok(())
    }
}
