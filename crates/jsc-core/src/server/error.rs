//! Handler and dispatcher errors.

use std::io;

use crate::protocol::{ErrorCode, FrameError, RpcError};

/// Failure of a single remote method.
///
/// Most variants become an error response and the dispatcher carries on.
/// The [fatal](HandlerError::is_fatal) ones end the session instead.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("invalid params: {0}")]
    InvalidParams(#[source] serde_json::Error),

    #[error("invalid path {0:?}")]
    InvalidPath(String),

    #[error(
        "Deploying a recipe requires your code base to be empty. Use the command clean and try again."
    )]
    DeployNotClean,

    #[error("Restoring a backup requires {0} to be clean. Use the command clean and try again.")]
    RevertNotClean(String),

    #[error("backup id {0} does not exist")]
    RevertInvalidId(u64),

    #[error("Your code dir [{0}] is clean, there's nothing to backup.")]
    BackupIsClean(String),

    #[error("backup id {0} does not exist")]
    BackupInvalidId(u64),

    #[error("backup bookkeeping changed concurrently: {0}")]
    BackupConflict(String),

    #[error("There is no recipe script to execute")]
    NoRecipe,

    #[error("failed to fetch recipe from {url}: {message}")]
    RecipeFetch { url: String, message: String },

    #[error("You tried to connect to a non-assembly container")]
    NotAssembly,

    #[error("File lock is already acquired by [{hostname}] since [{since}]")]
    SessionLocked { hostname: String, since: String },

    #[error("This session does not hold the assembly lock")]
    NotLocked,

    #[error("no deployed recipe to sync")]
    SyncNoRecipe,

    #[error("software list rejected by the server (HTTP {0})")]
    SyncRejected(u16),

    #[error("an error occurred communicating with the server: {0}")]
    SyncHttp(#[source] reqwest::Error),

    #[error("{0}")]
    Recipe(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Internal(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("operator disconnected")]
    Disconnected,

    #[error(transparent)]
    Wire(#[from] FrameError),
}

impl HandlerError {
    /// Adapter for `map_err` on I/O results.
    pub fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> HandlerError {
        let context = context.into();
        move |source| HandlerError::Io { context, source }
    }

    pub fn recipe(message: impl Into<String>) -> Self {
        HandlerError::Recipe(message.into())
    }

    /// Error code carried by the response.
    pub fn code(&self) -> ErrorCode {
        match self {
            HandlerError::InvalidParams(_) | HandlerError::InvalidPath(_) => {
                ErrorCode::InvalidParams
            }
            HandlerError::DeployNotClean => ErrorCode::DeployNotClean,
            HandlerError::RevertNotClean(_) => ErrorCode::RevertNotClean,
            HandlerError::RevertInvalidId(_) => ErrorCode::RevertInvalidId,
            HandlerError::BackupIsClean(_) => ErrorCode::BackupIsClean,
            HandlerError::BackupInvalidId(_) => ErrorCode::BackupInvalidId,
            HandlerError::BackupConflict(_) => ErrorCode::BackupConflict,
            HandlerError::NoRecipe | HandlerError::RecipeFetch { .. } => {
                ErrorCode::DeployNoNewRecipe
            }
            HandlerError::NotAssembly => ErrorCode::NotAssembly,
            HandlerError::SessionLocked { .. } | HandlerError::NotLocked => {
                ErrorCode::SessionLocked
            }
            HandlerError::SyncNoRecipe => ErrorCode::SyncNoRecipe,
            HandlerError::SyncRejected(_) => ErrorCode::SyncServerFailed,
            HandlerError::SyncHttp(_) => ErrorCode::SyncHttpError,
            HandlerError::Recipe(_) => ErrorCode::RecipeRuntime,
            HandlerError::Io { .. }
            | HandlerError::Internal(_)
            | HandlerError::ProtocolViolation(_)
            | HandlerError::Disconnected
            | HandlerError::Wire(_) => ErrorCode::InternalError,
        }
    }

    /// The session cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HandlerError::ProtocolViolation(_) | HandlerError::Disconnected | HandlerError::Wire(_)
        )
    }

    /// Re-tag an ordinary failure of a recipe command as a recipe runtime
    /// error. Param and session errors keep their code.
    pub fn into_recipe(self) -> Self {
        match self {
            HandlerError::Recipe(_)
            | HandlerError::InvalidParams(_)
            | HandlerError::NotLocked
            | HandlerError::ProtocolViolation(_)
            | HandlerError::Disconnected
            | HandlerError::Wire(_) => self,
            other => HandlerError::Recipe(other.to_string()),
        }
    }
}

impl From<&HandlerError> for RpcError {
    fn from(err: &HandlerError) -> Self {
        RpcError::new(err.code(), err.to_string())
    }
}

/// Errors that end the dispatcher loop.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("wire error: {0}")]
    Wire(#[from] FrameError),

    #[error("method {method} aborted the session: {source}")]
    Handler {
        method: String,
        #[source]
        source: HandlerError,
    },
}
