//! Build metadata embedded by `build.rs`.
//!
//! The operator binary prints it for `--version`; the dispatcher returns it
//! from `do_version` so both ends of a session can be compared.

/// Short git commit hash at build time.
pub const GIT_HASH: &str = env!("JSC_GIT_HASH");

/// Build timestamp, Unix epoch seconds.
pub const BUILD_TIMESTAMP: &str = env!("JSC_BUILD_TIMESTAMP");

/// `debug` or `release`.
pub const BUILD_PROFILE: &str = env!("JSC_BUILD_PROFILE");

/// Crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `"0.1.0 (abc1234, debug)"`.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("JSC_GIT_HASH"),
    ", ",
    env!("JSC_BUILD_PROFILE"),
    ")"
);

pub fn version_string() -> String {
    LONG_VERSION.to_string()
}
