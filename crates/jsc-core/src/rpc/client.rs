//! RPC client: one call in flight over a lazily opened exec channel.
//!
//! While a call is pending the client multiplexes three sources: inbound
//! messages from the channel, local stdin chunks (sent on as `stdin`
//! notifications) and local interrupts. Output notifications are written to
//! the injected [`OutputSink`] as they arrive; only the Response with the
//! pending id resolves the call.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace, warn};

use crate::protocol::{
    Call, FrameError, FrameReader, FrameWriter, Message, Notification, RpcError, Stream,
};

use super::sink::OutputSink;
use super::transport::{Channel, ChannelControl, Transport, TransportError};

/// Local interrupt request (Ctrl-C).
#[derive(Debug, Clone, Copy)]
pub struct Interrupt;

/// Errors from [`Client::call`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The remote handler answered with an error object.
    #[error("{}", .0.message)]
    Call(RpcError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("protocol error: {0}")]
    Frame(#[from] FrameError),

    #[error("channel closed before a response arrived")]
    ChannelClosed,

    #[error("call cancelled by interrupt")]
    Cancelled,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("malformed payload for {method}: {source}")]
    Decode {
        method: String,
        source: serde_json::Error,
    },
}

impl ClientError {
    /// The remote error object, for application-level failures.
    pub fn rpc_error(&self) -> Option<&RpcError> {
        match self {
            ClientError::Call(err) => Some(err),
            _ => None,
        }
    }

    /// True when the channel survived the failure.
    pub fn is_application_error(&self) -> bool {
        matches!(self, ClientError::Call(_) | ClientError::Decode { .. })
    }
}

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct OpenChannel {
    reader: FrameReader<BoxReader>,
    writer: FrameWriter<BoxWriter>,
    control: Box<dyn ChannelControl>,
}

impl From<Channel> for OpenChannel {
    fn from(channel: Channel) -> Self {
        Self {
            reader: FrameReader::new(channel.reader),
            writer: FrameWriter::new(channel.writer),
            control: channel.control,
        }
    }
}

/// Client for the remote dispatcher.
pub struct Client {
    transport: Box<dyn Transport>,
    channel: Option<OpenChannel>,
    next_id: u64,
    pending: Option<u64>,
    sink: Arc<dyn OutputSink>,
    stdin: Option<mpsc::Receiver<Vec<u8>>>,
    interrupts: Option<broadcast::Sender<Interrupt>>,
}

impl Client {
    pub fn new(transport: Box<dyn Transport>, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            transport,
            channel: None,
            next_id: 0,
            pending: None,
            sink,
            stdin: None,
            interrupts: None,
        }
    }

    /// Forward these local input chunks while a call is pending.
    pub fn with_stdin(mut self, stdin: mpsc::Receiver<Vec<u8>>) -> Self {
        self.stdin = Some(stdin);
        self
    }

    /// Cancel pending calls when an interrupt is broadcast.
    pub fn with_interrupts(mut self, interrupts: broadcast::Sender<Interrupt>) -> Self {
        self.interrupts = Some(interrupts);
        self
    }

    /// Whether an exec channel is currently open.
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Issue one call and wait for its response.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value, ClientError> {
        if let Some(stale) = self.pending.take() {
            warn!(id = stale, "previous call was abandoned, reopening channel");
            self.teardown().await;
        }
        // Subscribe before sending so an interrupt raised during the call is seen.
        let mut interrupts = self.interrupts.as_ref().map(|tx| tx.subscribe());

        let id = self.next_id;
        self.next_id += 1;

        let call: Message = Call {
            id,
            method: method.to_string(),
            params,
        }
        .into();
        debug!(id, method, "call");
        if let Err(e) = self.send(&call).await {
            self.teardown().await;
            return Err(e);
        }

        self.pending = Some(id);
        let Some(channel) = self.channel.as_mut() else {
            self.pending = None;
            return Err(ClientError::ChannelClosed);
        };
        let result = wait_for_response(
            channel,
            id,
            self.sink.as_ref(),
            &mut self.stdin,
            interrupts.as_mut(),
        )
        .await;
        self.pending = None;

        match &result {
            Ok(_) | Err(ClientError::Call(_)) => {}
            Err(e) => {
                debug!(id, error = %e, "channel is dead after failed call");
                self.teardown().await;
            }
        }
        result
    }

    /// Shut the channel down; the next call opens a fresh one.
    pub async fn close(&mut self) {
        self.teardown().await;
    }

    async fn send(&mut self, msg: &Message) -> Result<(), ClientError> {
        self.ensure_open().await?;
        let channel = self.channel.as_mut().ok_or(ClientError::ChannelClosed)?;
        channel.writer.send(msg).await?;
        Ok(())
    }

    async fn ensure_open(&mut self) -> Result<(), ClientError> {
        if let Some(channel) = self.channel.as_mut()
            && channel.control.has_exited()
        {
            debug!("exec channel exited, reopening");
            self.teardown().await;
        }
        if self.channel.is_none() {
            let channel = self.transport.open().await?;
            self.channel = Some(channel.into());
        }
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            let _ = channel.writer.shutdown().await;
            channel.control.shutdown().await;
        }
    }
}

async fn next_stdin_chunk(stdin: &mut Option<mpsc::Receiver<Vec<u8>>>) -> Option<Vec<u8>> {
    match stdin {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_interrupt(interrupts: &mut Option<&mut broadcast::Receiver<Interrupt>>) -> bool {
    match interrupts {
        Some(rx) => match rx.recv().await {
            Ok(Interrupt) | Err(broadcast::error::RecvError::Lagged(_)) => true,
            Err(broadcast::error::RecvError::Closed) => false,
        },
        None => std::future::pending().await,
    }
}

async fn wait_for_response(
    channel: &mut OpenChannel,
    id: u64,
    sink: &dyn OutputSink,
    stdin: &mut Option<mpsc::Receiver<Vec<u8>>>,
    mut interrupts: Option<&mut broadcast::Receiver<Interrupt>>,
) -> Result<Value, ClientError> {
    loop {
        tokio::select! {
            msg = channel.reader.next_message() => {
                match msg? {
                    None => return Err(ClientError::ChannelClosed),
                    Some(Message::Notification(n)) => match n.stream {
                        Stream::Stdout => sink.stdout(n.data.as_bytes()),
                        Stream::Stderr => sink.stderr(n.data.as_bytes()),
                        Stream::Stdin => trace!("ignoring stdin notification from server"),
                    },
                    Some(Message::Response(resp)) if resp.id == id => {
                        return resp.into_result().map_err(ClientError::Call);
                    }
                    Some(Message::Response(resp)) => {
                        return Err(ClientError::Protocol(format!(
                            "response id {} does not match pending call {id}",
                            resp.id
                        )));
                    }
                    Some(Message::Call(call)) => {
                        return Err(ClientError::Protocol(format!(
                            "server sent a call ({})",
                            call.method
                        )));
                    }
                }
            }
            chunk = next_stdin_chunk(stdin) => match chunk {
                Some(bytes) => {
                    let data = String::from_utf8_lossy(&bytes);
                    let msg: Message = Notification::new(Stream::Stdin, data).into();
                    channel.writer.send(&msg).await?;
                }
                None => *stdin = None,
            },
            interrupted = next_interrupt(&mut interrupts) => {
                if interrupted {
                    return Err(ClientError::Cancelled);
                }
                interrupts = None;
            }
        }
    }
}
