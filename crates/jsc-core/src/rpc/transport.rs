//! Exec channels to the remote dispatcher.
//!
//! A [`Transport`] opens [`Channel`]s: a byte stream in each direction plus a
//! control handle that reports whether the remote end has exited and can
//! tear the channel down. [`SshTransport`] runs the system `ssh` client.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use jsc_config::SshConfig;

use crate::BoxFuture;

/// Errors opening a channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("channel is missing its {0} pipe")]
    MissingPipe(&'static str),

    #[error("failed to open channel: {0}")]
    Open(String),
}

/// Lifecycle handle of an open channel.
pub trait ChannelControl: Send {
    /// True once the remote side is gone.
    fn has_exited(&mut self) -> bool;

    /// Tear the channel down. Idempotent.
    fn shutdown(&mut self) -> BoxFuture<'_, ()>;
}

/// An open bidirectional exec channel.
pub struct Channel {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    pub control: Box<dyn ChannelControl>,
}

/// Opens channels on demand.
pub trait Transport: Send {
    fn open(&mut self) -> BoxFuture<'_, Result<Channel, TransportError>>;
}

/// Transport that runs `ssh` with the dispatcher as remote command.
pub struct SshTransport {
    config: SshConfig,
    user: String,
}

impl SshTransport {
    pub fn new(config: SshConfig, user: impl Into<String>) -> Self {
        Self {
            config,
            user: user.into(),
        }
    }

    /// `user@host`.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.config.host)
    }

    /// Connection options shared by the exec channel and interactive shells.
    pub fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.config.keepalive_secs > 0 {
            args.push("-o".to_string());
            args.push(format!("ServerAliveInterval={}", self.config.keepalive_secs));
        }
        args.push("-p".to_string());
        args.push(self.config.port.to_string());
        if let Some(identity) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(expand_home(identity).display().to_string());
        }
        args
    }

    /// Full argument vector of the exec channel.
    pub fn exec_args(&self) -> Vec<String> {
        let mut args = vec!["-T".to_string()];
        args.extend(self.base_args());
        args.push(self.destination());
        args.push(self.config.remote_command.clone());
        args
    }
}

impl Transport for SshTransport {
    fn open(&mut self) -> BoxFuture<'_, Result<Channel, TransportError>> {
        Box::pin(async move {
            let args = self.exec_args();
            debug!(?args, "spawning ssh");
            let mut child = tokio::process::Command::new("ssh")
                .args(&args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| TransportError::Spawn {
                    program: "ssh".to_string(),
                    source,
                })?;

            let stdin = child
                .stdin
                .take()
                .ok_or(TransportError::MissingPipe("stdin"))?;
            let stdout = child
                .stdout
                .take()
                .ok_or(TransportError::MissingPipe("stdout"))?;

            info!(destination = %self.destination(), "exec channel opened");
            Ok(Channel {
                reader: Box::new(stdout),
                writer: Box::new(stdin),
                control: Box::new(SshProcess { child }),
            })
        })
    }
}

struct SshProcess {
    child: tokio::process::Child,
}

impl ChannelControl for SshProcess {
    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    fn shutdown(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(e) = self.child.kill().await {
                debug!(error = %e, "ssh process already gone");
            }
        })
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exec_args() {
        let config = SshConfig {
            host: "assembly.example.com".into(),
            port: 2222,
            identity_file: Some(PathBuf::from("/keys/id")),
            keepalive_secs: 15,
            ..SshConfig::default()
        };
        let transport = SshTransport::new(config, "asm-1");
        assert_eq!(
            transport.exec_args(),
            vec![
                "-T",
                "-o",
                "ServerAliveInterval=15",
                "-p",
                "2222",
                "-i",
                "/keys/id",
                "asm-1@assembly.example.com",
                "/tmp/server",
            ]
        );
    }

    #[test]
    fn test_keepalive_disabled() {
        let config = SshConfig {
            keepalive_secs: 0,
            ..SshConfig::default()
        };
        let args = SshTransport::new(config, "u").base_args();
        assert!(!args.iter().any(|a| a.starts_with("ServerAlive")));
    }

    #[test]
    fn test_expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home(Path::new("/etc/key")), PathBuf::from("/etc/key"));
    }
}
