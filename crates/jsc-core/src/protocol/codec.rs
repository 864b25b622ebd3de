//! Newline-delimited JSON framing.
//!
//! [`encode`] and [`decode`] are pure functions over byte buffers;
//! [`FrameReader`] and [`FrameWriter`] put them on top of any tokio stream.

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::message::Message;

/// Errors from framing. Every variant is fatal to the channel.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid JSON on the wire: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid message: {0}")]
    Shape(String),

    #[error("stream ended inside a message")]
    Truncated,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize one message as a single line, newline included.
pub fn encode(msg: &Message) -> Result<Vec<u8>, FrameError> {
    let mut line = serde_json::to_vec(&msg.to_value())?;
    line.push(b'\n');
    Ok(line)
}

/// Take the first complete message off the front of `buf`.
///
/// Returns the message (or `None` when no full line is buffered yet) and the
/// unconsumed remainder. Blank lines are consumed silently.
pub fn decode(buf: &[u8]) -> Result<(Option<Message>, &[u8]), FrameError> {
    let mut rest = buf;
    loop {
        let Some(pos) = rest.iter().position(|&b| b == b'\n') else {
            return Ok((None, rest));
        };
        let (line, tail) = (&rest[..pos], &rest[pos + 1..]);
        if line.iter().all(u8::is_ascii_whitespace) {
            rest = tail;
            continue;
        }
        let value: Value = serde_json::from_slice(line)?;
        return Ok((Some(Message::from_value(value)?), tail));
    }
}

const READ_CHUNK: usize = 8192;

/// Accumulating message reader.
///
/// [`FrameReader::next_message`] is cancel-safe: bytes already read stay in
/// the internal buffer when the future is dropped.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    /// Next message, or `Ok(None)` on a clean end of stream.
    pub async fn next_message(&mut self) -> Result<Option<Message>, FrameError> {
        loop {
            let (msg, consumed) = {
                let (msg, rest) = decode(&self.buf)?;
                (msg, self.buf.len() - rest.len())
            };
            if consumed > 0 {
                self.buf.drain(..consumed);
            }
            if msg.is_some() {
                return Ok(msg);
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                if self.buf.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                return Err(FrameError::Truncated);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Line writer; every message is flushed as soon as it is written.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send(&mut self, msg: &Message) -> Result<(), FrameError> {
        let line = encode(msg)?;
        self.inner.write_all(&line).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), FrameError> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
