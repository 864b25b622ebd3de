#![deny(unsafe_code)]

//! Configuration loading and validation for jsc.
//!
//! Loads TOML configuration files shared by the operator CLI (`jsc`) and the
//! remote dispatcher (`jsc-server`). Every section has defaults, so an empty
//! file (or no file at all) is a valid configuration.
//!
//! ## TOML Example
//!
//! ```toml
//! [ssh]
//! host = "ssh.jumpstarter.io"
//! user = "assembly-4711"
//! identity_file = "~/.ssh/id_ed25519"
//!
//! [assembly]
//! root = "/"
//!
//! [tools]
//! package_manager = ["jumpstart", "--noconfirm", "-Sy"]
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// How the operator reaches the assembly.
    #[serde(default)]
    pub ssh: SshConfig,

    /// Where the assembly filesystem lives on the remote side.
    #[serde(default)]
    pub assembly: AssemblyConfig,

    /// External tools invoked by recipe statements.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// SSH endpoint used by the operator CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Hostname of the SSH endpoint.
    #[serde(default = "default_ssh_host")]
    pub host: String,

    /// Port of the SSH endpoint.
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// SSH username (the assembly id). Usually given on the command line.
    #[serde(default)]
    pub user: Option<String>,

    /// Private key file passed to `ssh -i`.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    /// Transport keepalive interval in seconds (0 disables it).
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Command executed on the remote side to start the dispatcher.
    #[serde(default = "default_remote_command")]
    pub remote_command: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: default_ssh_host(),
            port: default_ssh_port(),
            user: None,
            identity_file: None,
            keepalive_secs: default_keepalive_secs(),
            remote_command: default_remote_command(),
        }
    }
}

fn default_ssh_host() -> String {
    "ssh.jumpstarter.io".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_keepalive_secs() -> u64 {
    30
}

fn default_remote_command() -> String {
    "/tmp/server".to_string()
}

/// Remote assembly filesystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Root under which `app/code`, `app/state` and `app/env.json` live.
    /// Always `/` inside a real assembly.
    #[serde(default = "default_assembly_root")]
    pub root: PathBuf,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            root: default_assembly_root(),
        }
    }
}

fn default_assembly_root() -> PathBuf {
    PathBuf::from("/")
}

/// External tools used by the remote handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Package manager command prefix; package names are appended.
    #[serde(default = "default_package_manager")]
    pub package_manager: Vec<String>,

    /// Version control client used by `gd` and VCS deploys.
    #[serde(default = "default_git")]
    pub git: String,

    /// Shell used to interpret `run` statements.
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            package_manager: default_package_manager(),
            git: default_git(),
            shell: default_shell(),
        }
    }
}

fn default_package_manager() -> Vec<String> {
    ["jumpstart", "--noconfirm", "-Sy"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_git() -> String {
    "git".to_string()
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssh.port == 0 {
            return Err(ConfigError::Validation(
                "ssh.port must be non-zero".to_string(),
            ));
        }
        if self.ssh.host.is_empty() {
            return Err(ConfigError::Validation(
                "ssh.host must not be empty".to_string(),
            ));
        }
        if self.ssh.remote_command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "ssh.remote_command must not be empty".to_string(),
            ));
        }
        if !self.assembly.root.is_absolute() {
            return Err(ConfigError::Validation(format!(
                "assembly.root must be an absolute path, got {:?}",
                self.assembly.root
            )));
        }
        if self.tools.package_manager.is_empty() || self.tools.package_manager[0].is_empty() {
            return Err(ConfigError::Validation(
                "tools.package_manager must name a command".to_string(),
            ));
        }
        if self.tools.git.is_empty() {
            return Err(ConfigError::Validation(
                "tools.git must not be empty".to_string(),
            ));
        }
        if self.tools.shell.is_empty() {
            return Err(ConfigError::Validation(
                "tools.shell must not be empty".to_string(),
            ));
        }
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }
        Ok(())
    }
}
