//! Wire-level error object and the numeric error code table.

use serde::{Deserialize, Serialize};

/// Error codes carried in `Response.error.code`.
///
/// JSON-RPC reserved codes for protocol faults, small negative integers
/// grouped by subsystem for everything the handlers report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    DeployNotClean,
    RevertNotClean,
    RevertInvalidId,
    SyncNoRecipe,
    SyncServerFailed,
    SyncHttpError,
    DeployNoNewRecipe,
    RecipeRuntime,
    NotAssembly,
    BackupIsClean,
    BackupInvalidId,
    BackupConflict,
    SessionLocked,
}

impl ErrorCode {
    const TABLE: [(ErrorCode, i64); 18] = [
        (ErrorCode::ParseError, -32700),
        (ErrorCode::InvalidRequest, -32600),
        (ErrorCode::MethodNotFound, -32601),
        (ErrorCode::InvalidParams, -32602),
        (ErrorCode::InternalError, -32603),
        (ErrorCode::DeployNotClean, -31000),
        (ErrorCode::RevertNotClean, -31050),
        (ErrorCode::RevertInvalidId, -31051),
        (ErrorCode::SyncNoRecipe, -31100),
        (ErrorCode::SyncServerFailed, -31101),
        (ErrorCode::SyncHttpError, -31102),
        (ErrorCode::DeployNoNewRecipe, -31200),
        (ErrorCode::RecipeRuntime, -31300),
        (ErrorCode::NotAssembly, -31400),
        (ErrorCode::BackupIsClean, -31500),
        (ErrorCode::BackupInvalidId, -31501),
        (ErrorCode::BackupConflict, -31502),
        (ErrorCode::SessionLocked, -31600),
    ];

    /// Numeric value on the wire.
    pub fn code(self) -> i64 {
        Self::TABLE
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, code)| *code)
            .unwrap_or(-32603)
    }

    /// Reverse lookup; `None` for codes this build does not know.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(kind, _)| *kind)
    }
}

/// The `error` member of a Response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("method not found: {method}"),
        )
    }

    /// Typed view of [`RpcError::code`].
    pub fn kind(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}
