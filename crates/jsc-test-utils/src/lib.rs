#![deny(unsafe_code)]

//! Shared test utilities for the jsc workspace.
//!
//! Provides a throwaway assembly filesystem, an in-process transport that
//! runs the real dispatcher over in-memory pipes, config builders and
//! tracing helpers.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! jsc-test-utils = { workspace = true }
//! ```

pub mod assembly;
pub mod config;
pub mod tracing_setup;
pub mod transport;

pub use assembly::TestAssembly;
pub use config::TestConfigBuilder;
pub use transport::LocalTransport;
