//! Tracing subscriber setup.
//!
//! Both binaries log to stderr. On the remote side stdout carries the
//! protocol, so nothing else may ever write there.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over `level` when set. Calling this twice is harmless;
/// the second installation is ignored.
pub fn init(level: &str, ansi: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(false)
        .try_init();
}

/// Level used when the operator passes `--verbose`/`-v` repeatedly.
pub fn level_for_verbosity(verbose: u8, configured: &str) -> &str {
    match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    }
}
