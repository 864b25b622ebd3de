//! `app/env.json`, written by the hosting platform.

use std::fs;

use serde_json::Value;

use crate::api::Env;
use crate::server::HandlerError;

use super::Layout;

/// The environment document exactly as stored.
pub fn load_raw(layout: &Layout) -> Result<Value, HandlerError> {
    let path = layout.env_file();
    let text = fs::read_to_string(&path)
        .map_err(HandlerError::io(format!("read {}", layout.display(&path))))?;
    serde_json::from_str(&text).map_err(|e| {
        HandlerError::Internal(format!("{} is not valid JSON: {e}", layout.display(&path)))
    })
}

pub fn load(layout: &Layout) -> Result<Env, HandlerError> {
    let raw = load_raw(layout)?;
    serde_json::from_value(raw).map_err(|e| {
        HandlerError::Internal(format!("unexpected environment document: {e}"))
    })
}

/// Does `app/env.json` identify this container as an assembly?
/// A missing or unreadable document means no.
pub fn is_assembly(layout: &Layout) -> bool {
    load(layout).is_ok_and(|env| env.ident.container.is_assembly)
}
