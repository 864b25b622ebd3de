#![deny(unsafe_code)]

//! jsc-server: the dispatcher started on the assembly by the operator's
//! `ssh` exec channel. Protocol on stdin/stdout, logs on stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

use jsc_config::AppConfig;
use jsc_core::{Assembly, Server, Wire, logging};

#[derive(Parser)]
#[command(name = "jsc-server", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "/etc/jsc/server.toml")]
    config: PathBuf,

    /// Serve this assembly root instead of the configured one.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config).await?;
    if let Some(root) = cli.root {
        config.assembly.root = root;
    }
    logging::init(
        logging::level_for_verbosity(cli.verbose, &config.logging.level),
        false,
    );

    let mut hangup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    let server = Server::new(Assembly::from_config(&config), Wire::stdio());

    tokio::select! {
        result = server.run() => match result {
            Ok(()) => {
                info!("session ended");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                error!(error = %e, "session aborted");
                Ok(ExitCode::FAILURE)
            }
        },
        _ = hangup.recv() => {
            warn!("SIGHUP received, operator connection lost");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))
    } else {
        Ok(AppConfig::default())
    }
}
