//! In-process transport.
//!
//! Every [`LocalTransport::open`] spawns a fresh dispatcher task serving
//! the given configuration over an in-memory duplex pipe, the way `ssh`
//! starts a fresh remote process per exec channel.

use std::sync::Arc;
use std::time::Duration;

use jsc_config::AppConfig;
use jsc_core::rpc::{Channel, ChannelControl, MemorySink, OutputSink, Transport, TransportError};
use jsc_core::{Assembly, BoxFuture, Client, Server, ServerError, Wire};
use tokio::task::JoinHandle;

const PIPE_CAPACITY: usize = 64 * 1024;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct LocalTransport {
    config: AppConfig,
}

impl LocalTransport {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// A client over this transport, collecting output in the returned sink.
    pub fn client(config: AppConfig) -> (Client, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let output: Arc<dyn OutputSink> = sink.clone();
        (Client::new(Box::new(Self::new(config)), output), sink)
    }
}

impl Transport for LocalTransport {
    fn open(&mut self) -> BoxFuture<'_, Result<Channel, TransportError>> {
        Box::pin(async move {
            let (client_end, server_end) = tokio::io::duplex(PIPE_CAPACITY);
            let (server_read, server_write) = tokio::io::split(server_end);
            let (client_read, client_write) = tokio::io::split(client_end);

            let server = Server::new(
                Assembly::from_config(&self.config),
                Wire::new(server_read, server_write),
            );
            let task = tokio::spawn(server.run());

            Ok(Channel {
                reader: Box::new(client_read),
                writer: Box::new(client_write),
                control: Box::new(LocalProcess { task: Some(task) }),
            })
        })
    }
}

struct LocalProcess {
    task: Option<JoinHandle<Result<(), ServerError>>>,
}

impl ChannelControl for LocalProcess {
    fn has_exited(&mut self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    fn shutdown(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let Some(mut task) = self.task.take() else {
                return;
            };
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => tracing::debug!(error = %e, "dispatcher ended with error"),
                Ok(Err(e)) => tracing::debug!(error = %e, "dispatcher task failed"),
                Err(_) => task.abort(),
            }
        })
    }
}
