#![deny(unsafe_code)]

//! jsc core: everything shared by the operator CLI and the remote dispatcher.
//!
//! The operator side opens a transport (normally `ssh`) to the assembly,
//! speaks newline-delimited JSON-RPC over it and drives deployments by
//! interpreting recipe scripts. The remote side answers those calls by
//! mutating the assembly filesystem: staging recipes, committing deploys,
//! taking and restoring backups.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future used by traits and tables that
/// need dynamic dispatch (`dyn Transport`, the handler registry).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Typed params and results of the remote methods.
pub mod api;
/// Remote assembly filesystem: layout, session lock, backups and deploy state.
pub mod assembly;
/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Client-side deploy orchestration and recipe upload.
pub mod deploy;
/// Remote method handlers (`do_*` and `rc_*`).
pub mod handlers;
/// Tracing subscriber setup for both binaries.
pub mod logging;
/// Message model and line framing.
pub mod protocol;
/// Recipe grammar, state and interpreter.
pub mod recipe;
/// RPC client, output sinks and transports.
pub mod rpc;
/// Dispatcher loop, handler registry and interactive mode.
pub mod server;
/// External tool wrappers (package manager, git).
pub mod tools;

pub use assembly::Assembly;
pub use rpc::{Client, ClientError, SshTransport, Transport};
pub use server::{Context, HandlerError, Server, ServerError, Wire};
