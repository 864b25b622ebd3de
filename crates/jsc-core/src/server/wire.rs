//! The dispatcher's end of the channel.

use std::fmt::Display;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::protocol::{FrameError, FrameReader, FrameWriter, Message, Notification, Stream};

use super::HandlerError;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Framed inbound and outbound halves, shared by the dispatcher loop and
/// handlers that stream output.
pub struct Wire {
    reader: FrameReader<BoxedReader>,
    writer: FrameWriter<BoxedWriter>,
}

impl Wire {
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: FrameReader::new(Box::new(reader)),
            writer: FrameWriter::new(Box::new(writer)),
        }
    }

    /// The process's own stdin/stdout, as used under `ssh`.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Next inbound message; `Ok(None)` once the operator hung up.
    pub async fn next_message(&mut self) -> Result<Option<Message>, FrameError> {
        self.reader.next_message().await
    }

    pub async fn send(&mut self, msg: impl Into<Message>) -> Result<(), FrameError> {
        self.writer.send(&msg.into()).await
    }

    pub async fn notify(&mut self, stream: Stream, data: impl Into<String>) -> Result<(), HandlerError> {
        self.send(Notification::new(stream, data)).await?;
        Ok(())
    }

    /// One line of progress on the operator's stdout.
    pub async fn progress(&mut self, line: impl Display) -> Result<(), HandlerError> {
        self.notify(Stream::Stdout, format!("{line}\n")).await
    }

    /// One line on the operator's stderr.
    pub async fn warn(&mut self, line: impl Display) -> Result<(), HandlerError> {
        self.notify(Stream::Stderr, format!("{line}\n")).await
    }
}
