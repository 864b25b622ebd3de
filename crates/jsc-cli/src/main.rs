#![deny(unsafe_code)]

//! jsc: operator console for Jumpstarter assemblies.

mod terminal;

use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use jsc_config::AppConfig;
use jsc_core::api::{CleanParams, LockSessionParams, StatusReport};
use jsc_core::rpc::{Interrupt, StdioSink};
use jsc_core::{Client, SshTransport, build_info, deploy, logging};

use terminal::TerminalGuard;

/// Deploy recipes to, back up and inspect a Jumpstarter assembly.
#[derive(Parser)]
#[command(name = "jsc", version = build_info::LONG_VERSION, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "jsc.toml")]
    config: PathBuf,

    /// Hostname of the SSH endpoint (overrides the config file).
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port of the SSH endpoint (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Private key used for the SSH connection.
    #[arg(short, long)]
    identity: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Assembly id, used as the SSH username.
    assembly: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage backups.
    Backup {
        #[command(subcommand)]
        action: Option<BackupAction>,
    },

    /// Remove everything user-added from a dataset.
    Clean {
        /// Clean /app/code (default).
        #[arg(long, conflicts_with_all = ["state", "all"])]
        code: bool,
        /// Clean /app/state.
        #[arg(long, conflicts_with = "all")]
        state: bool,
        /// Clean both datasets.
        #[arg(long)]
        all: bool,
    },

    /// Deploy a recipe from a local directory or a git repository.
    Deploy {
        /// Keep version control metadata in checkouts. Never use this on an
        /// assembly that is going to be released.
        #[arg(long)]
        dev: bool,
        /// Local recipe directory, repository URL or `github:<owner>/<repo>`.
        path: String,
    },

    /// Print /app/env.json.
    Env,

    /// Restore a backup. Changes made since it was taken are lost.
    Revert { id: u64 },

    /// Run /app/code/init interactively.
    Run,

    /// Open an SSH shell on the assembly.
    Ssh,

    /// Push the software list to the developer panel.
    Sync,

    /// Disk usage, deployed recipe and backups.
    Status {
        /// Also list installed packages and checkouts.
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum BackupAction {
    /// List backups (default).
    Ls,
    /// Take a new backup.
    New,
    /// Like `ls`, with sizes and disk usage.
    Du,
    /// Delete a backup.
    Rm { id: u64 },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).await?;
    logging::init(
        logging::level_for_verbosity(cli.verbose, &config.logging.level),
        std::io::stderr().is_terminal(),
    );
    let config = apply_overrides(config, &cli);
    let transport = SshTransport::new(config.ssh.clone(), cli.assembly.clone());

    match cli.command {
        Commands::Ssh => cmd_ssh(&transport).await,
        command => {
            let (interrupt_tx, _) = broadcast::channel(4);
            spawn_interrupt_forwarder(interrupt_tx.clone());
            let mut client = Client::new(Box::new(transport), Arc::new(StdioSink))
                .with_stdin(spawn_stdin_reader())
                .with_interrupts(interrupt_tx);

            start_session(&mut client).await?;
            let code = run_verb(&mut client, command).await;
            client.close().await;
            code
        }
    }
}

async fn run_verb(client: &mut Client, command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Backup { action } => cmd_backup(client, action.unwrap_or(BackupAction::Ls)).await,
        Commands::Clean { code, state, all } => {
            client.clean(&CleanParams { code, state, all }).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Deploy { dev, path } => cmd_deploy(client, &path, dev).await,
        Commands::Env => cmd_env(client).await,
        Commands::Revert { id } => cmd_revert(client, id).await,
        Commands::Run => cmd_run(client).await,
        Commands::Sync => cmd_sync(client).await,
        Commands::Status { verbose } => cmd_status(client, verbose).await,
        Commands::Ssh => bail!("ssh does not run inside a session"),
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

fn apply_overrides(mut config: AppConfig, cli: &Cli) -> AppConfig {
    if let Some(host) = &cli.host {
        config.ssh.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.ssh.port = port;
    }
    if let Some(identity) = &cli.identity {
        config.ssh.identity_file = Some(identity.clone());
    }
    config
}

/// Assert, initialize, lock and sync; every verb but `ssh` starts here.
async fn start_session(client: &mut Client) -> Result<()> {
    client
        .assert_is_assembly()
        .await
        .context("connected container is not an assembly")?;
    let hostname = nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    let unix_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    client
        .lock_session(&LockSessionParams {
            hostname,
            unix_epoch,
        })
        .await?;

    if client.check_init().await?.needs_init {
        info!("initializing assembly bookkeeping");
    }
    client.init().await.context("initializing assembly")?;

    if let Err(e) = client.sync().await {
        eprintln!("{}", sync_warning(&e));
    }
    Ok(())
}

fn sync_warning(err: &dyn std::fmt::Display) -> String {
    format!("Warning: software list sync failed: {err}. Try running sync manually.")
}

async fn cmd_backup(client: &mut Client, action: BackupAction) -> Result<ExitCode> {
    match action {
        BackupAction::Ls => {
            for backup in client.backup_ls().await? {
                println!("{backup}");
            }
        }
        BackupAction::New => {
            let backup = client.backup_new().await?;
            println!("Backup [{}] done!", backup.id);
        }
        BackupAction::Du => {
            for usage in client.backup_du().await? {
                println!("{usage}");
            }
        }
        BackupAction::Rm { id } => {
            client.backup_rm(id).await?;
            println!("Removal of backup [{id}] done!");
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_deploy(client: &mut Client, path: &str, dev: bool) -> Result<ExitCode> {
    let state = deploy::deploy(client, path, dev).await?;
    match state.name {
        Some(name) => println!("Deploy of [{name}] successful!"),
        None => println!("Deploy successful!"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_env(client: &mut Client) -> Result<ExitCode> {
    let env = client.env().await?;
    println!("{}", serde_json::to_string_pretty(&env)?);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_revert(client: &mut Client, id: u64) -> Result<ExitCode> {
    client.revert(id).await?;
    println!("Revert of backup [{id}] done!");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_run(client: &mut Client) -> Result<ExitCode> {
    let code = {
        let _raw = TerminalGuard::raw_stdin()?;
        client.run().await?
    };
    debug!(code, "init exited");
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

async fn cmd_sync(client: &mut Client) -> Result<ExitCode> {
    client.sync().await?;
    println!("Sync successful!");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_status(client: &mut Client, verbose: bool) -> Result<ExitCode> {
    let env = client.env().await?;
    let remote_version = client.version().await?;
    let status = client.status().await?;
    print!("{}", render_status(&env, &remote_version, &status, verbose));
    Ok(ExitCode::SUCCESS)
}

fn render_status(
    env: &serde_json::Value,
    remote_version: &str,
    status: &StatusReport,
    verbose: bool,
) -> String {
    let field = |path: &[&str]| {
        path.iter()
            .try_fold(env, |v, key| v.get(key))
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| "?".to_string())
    };
    let mut out = format!(
        "jsc v{} attached to assembly [{}] by [{} <{}>] (server {remote_version})\n",
        env!("CARGO_PKG_VERSION"),
        field(&["ident", "container", "id"]),
        field(&["ident", "user", "name"]),
        field(&["ident", "user", "email"]),
    );
    out.push_str(&format!("{}\n{}\n", status.code_usage, status.state_usage));
    out.push_str(&format!("Recipe: {}", status.recipe_name));
    if let Some(time) = &status.deploy_time {
        out.push_str(&format!(", deployed {time}"));
    }
    if status.is_dev {
        out.push_str(" (dev)");
    }
    if !status.is_synced && status.deploy_time.is_some() {
        out.push_str(" (software list not synced)");
    }
    out.push_str(&format!("\nBackups: {}\n", status.total_backups));

    if verbose && let Some(software) = &status.software {
        out.push_str("\nDeployed packages:\n");
        for (name, package) in &software.package {
            out.push_str(&format!("\t{name}: [{}]\n", package.version));
        }
        out.push_str("\nGit deployed software:\n");
        for (path, gd) in &software.gd {
            let short: String = gd.commit.chars().take(8).collect();
            out.push_str(&format!(
                "\t{path}: [{}] [{}] [{short}]\n",
                gd.reference.as_deref().unwrap_or("-"),
                gd.repo
            ));
        }
    }
    out
}

async fn cmd_ssh(transport: &SshTransport) -> Result<ExitCode> {
    let status = tokio::process::Command::new("ssh")
        .args(transport.base_args())
        .arg(transport.destination())
        .status()
        .await
        .context("failed to start ssh")?;
    match status.code() {
        Some(0) => Ok(ExitCode::SUCCESS),
        Some(code) => Ok(ExitCode::from(u8::try_from(code).unwrap_or(1))),
        None => bail!("ssh was killed by a signal"),
    }
}

/// Local stdin, chunked, for forwarding while a call is pending.
fn spawn_stdin_reader() -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

fn spawn_interrupt_forwarder(tx: broadcast::Sender<Interrupt>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt");
            let _ = tx.send(Interrupt);
        }
    });
}
