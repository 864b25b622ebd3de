//! Static method table.
//!
//! Handlers are plain `async fn(&mut Context, P) -> Result<R, HandlerError>`
//! with typed params and results. [`handler!`](crate::handler) erases them to
//! a uniform [`HandlerFn`] that decodes params and encodes the result.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::BoxFuture;

use super::{Context, HandlerError};

/// Type-erased handler.
pub type HandlerFn =
    for<'a> fn(&'a mut Context, Value) -> BoxFuture<'a, Result<Value, HandlerError>>;

/// Wrap a typed handler into a [`HandlerFn`].
#[macro_export]
macro_rules! handler {
    ($f:path) => {{
        fn erased<'a>(
            ctx: &'a mut $crate::server::Context,
            params: ::serde_json::Value,
        ) -> $crate::BoxFuture<'a, ::std::result::Result<::serde_json::Value, $crate::server::HandlerError>>
        {
            ::std::boxed::Box::pin(async move {
                let params = $crate::server::registry::decode_params(params)?;
                let result = $f(ctx, params).await?;
                $crate::server::registry::encode_result(&result)
            })
        }
        erased as $crate::server::registry::HandlerFn
    }};
}

/// Decode call params. A missing (`null`) params value counts as `{}`.
pub fn decode_params<P: DeserializeOwned>(params: Value) -> Result<P, HandlerError> {
    let params = if params.is_null() {
        Value::Object(Map::new())
    } else {
        params
    };
    serde_json::from_value(params).map_err(HandlerError::InvalidParams)
}

pub fn encode_result<R: Serialize + ?Sized>(result: &R) -> Result<Value, HandlerError> {
    serde_json::to_value(result)
        .map_err(|e| HandlerError::Internal(format!("failed to encode result: {e}")))
}

/// Method name → handler.
#[derive(Default)]
pub struct Registry {
    handlers: BTreeMap<&'static str, HandlerFn>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table of every `do_*` and `rc_*` method, built once.
    pub fn standard() -> &'static Registry {
        static STANDARD: OnceLock<Registry> = OnceLock::new();
        STANDARD.get_or_init(|| {
            let mut registry = Registry::new();
            crate::handlers::register(&mut registry);
            registry
        })
    }

    pub fn register(&mut self, method: &'static str, handler: HandlerFn) {
        self.handlers.insert(method, handler);
    }

    pub fn get(&self, method: &str) -> Option<HandlerFn> {
        self.handlers.get(method).copied()
    }

    pub fn methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Named {
        name: String,
    }

    #[test]
    fn test_decode_params() {
        let named: Named = decode_params(json!({"name": "x"})).unwrap();
        assert_eq!(named.name, "x");
        let err = decode_params::<Named>(json!({"nom": "x"})).unwrap_err();
        assert_eq!(err.code().code(), -32602);
        let empty: crate::api::NoParams = decode_params(Value::Null).unwrap();
        let _ = empty;
    }

    #[test]
    fn test_standard_registry_has_every_method() {
        let registry = Registry::standard();
        let methods: Vec<_> = registry.methods().collect();
        for expected in [
            "do_assert_is_assembly",
            "do_backup_du",
            "do_backup_ls",
            "do_backup_new",
            "do_backup_rm",
            "do_check_init",
            "do_clean",
            "do_deploy_finalize",
            "do_deploy_read_new_recipe",
            "do_deploy_reset_check",
            "do_env",
            "do_file_append",
            "do_init",
            "do_lock_session",
            "do_mkdir",
            "do_revert",
            "do_run",
            "do_status",
            "do_symlink",
            "do_sync",
            "do_version",
            "rc_name",
            "rc_package",
            "rc_gd",
            "rc_run",
            "rc_install",
            "rc_append",
            "rc_put",
            "rc_replace",
            "rc_insert",
            "rc_rinsert",
        ] {
            assert!(methods.contains(&expected), "missing {expected}");
        }
        assert_eq!(registry.len(), 31);
    }
}
