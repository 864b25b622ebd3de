//! Interactive mode: a child on a pseudo-terminal wired to the channel.
//!
//! While the child runs, its terminal output goes out as `stdout`
//! notifications and inbound `stdin` notifications are typed into it. The
//! mode ends when the terminal reports EOF, after which the child is reaped
//! and its exit code returned.

use std::io::{Read, Write};
use std::path::Path;
use std::thread;

use portable_pty::{CommandBuilder, PtySize, native_pty_system};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::protocol::{Message, Stream};

use super::{HandlerError, Wire};

const READ_CHUNK: usize = 4096;

/// Run `program args...` in `cwd` on a fresh pseudo-terminal until it
/// closes its output. Returns the exit code.
pub async fn run(
    wire: &mut Wire,
    program: &str,
    args: &[String],
    cwd: &Path,
) -> Result<i32, HandlerError> {
    let pty = native_pty_system();
    let pair = pty
        .openpty(PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| HandlerError::Internal(format!("open pty: {e}")))?;

    let mut cmd = CommandBuilder::new(program);
    cmd.args(args);
    cmd.cwd(cwd);
    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| HandlerError::Internal(format!("failed to start {program}: {e}")))?;
    // The child holds its own handle; EOF only arrives once ours is gone.
    drop(pair.slave);

    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| HandlerError::Internal(format!("clone pty reader: {e}")))?;
    let mut writer = pair
        .master
        .take_writer()
        .map_err(|e| HandlerError::Internal(format!("take pty writer: {e}")))?;

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(32);
    thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    info!(program, "interactive command started");
    let mut carry = Vec::new();
    loop {
        tokio::select! {
            chunk = rx.recv() => {
                let Some(chunk) = chunk else { break };
                carry.extend_from_slice(&chunk);
                let text = take_utf8(&mut carry);
                if !text.is_empty() {
                    wire.notify(Stream::Stdout, text).await?;
                }
            }
            inbound = wire.next_message() => {
                match inbound {
                    Ok(Some(Message::Notification(n))) if n.stream == Stream::Stdin => {
                        if let Err(e) = writer.write_all(n.data.as_bytes()).and_then(|()| writer.flush()) {
                            debug!(error = %e, "writing to the child failed");
                        }
                    }
                    Ok(Some(Message::Notification(n))) => {
                        trace!(stream = n.stream.key(), "ignoring notification");
                    }
                    Ok(Some(Message::Call(call))) => {
                        warn!(method = %call.method, "call received during interactive mode");
                        let _ = child.kill();
                        return Err(HandlerError::ProtocolViolation(format!(
                            "call {} while an interactive command was running",
                            call.method
                        )));
                    }
                    Ok(Some(Message::Response(r))) => {
                        warn!(id = r.id, "ignoring unsolicited response");
                    }
                    Ok(None) => {
                        info!("operator hung up during interactive mode");
                        let _ = child.kill();
                        return Err(HandlerError::Disconnected);
                    }
                    Err(e) => {
                        let _ = child.kill();
                        return Err(HandlerError::Wire(e));
                    }
                }
            }
        }
    }

    if !carry.is_empty() {
        wire.notify(Stream::Stdout, String::from_utf8_lossy(&carry).into_owned())
            .await?;
    }
    drop(writer);

    let status = tokio::task::spawn_blocking(move || child.wait())
        .await
        .map_err(|e| HandlerError::Internal(format!("waiting for {program}: {e}")))?
        .map_err(HandlerError::io(format!("wait for {program}")))?;
    let code = i32::try_from(status.exit_code()).unwrap_or(i32::MAX);
    info!(program, code, "interactive command finished");
    Ok(code)
}

/// Take the longest valid UTF-8 prefix out of `buf`, keeping an incomplete
/// trailing sequence for the next chunk. Invalid bytes become U+FFFD.
fn take_utf8(buf: &mut Vec<u8>) -> String {
    let valid = match std::str::from_utf8(buf) {
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        _ => buf.len(),
    };
    let rest = buf.split_off(valid);
    let text = String::from_utf8_lossy(buf).into_owned();
    *buf = rest;
    text
}
