//! Remote dispatcher.
//!
//! Reads one Call at a time from the wire, runs its handler to completion
//! (including any interactive sub-loop) and writes the Response before the
//! next line is read.

pub mod error;
pub mod interactive;
pub mod registry;
pub mod wire;

pub use error::{HandlerError, ServerError};
pub use registry::{HandlerFn, Registry};
pub use wire::Wire;

use tracing::{debug, info, trace, warn};

use crate::assembly::Assembly;
use crate::protocol::{Call, Message, Response, RpcError};

/// State a handler works on.
pub struct Context {
    pub assembly: Assembly,
    pub wire: Wire,
}

/// Whether the loop keeps reading after a call.
enum Flow {
    Continue,
    Stop,
}

pub struct Server {
    ctx: Context,
    registry: &'static Registry,
}

impl Server {
    pub fn new(assembly: Assembly, wire: Wire) -> Self {
        Self {
            ctx: Context { assembly, wire },
            registry: Registry::standard(),
        }
    }

    /// Serve until the operator closes the channel.
    pub async fn run(mut self) -> Result<(), ServerError> {
        info!(
            root = %self.ctx.assembly.layout().root().display(),
            methods = self.registry.len(),
            "dispatcher ready"
        );
        loop {
            let Some(msg) = self.ctx.wire.next_message().await? else {
                info!("operator closed the channel");
                return Ok(());
            };
            match msg {
                Message::Call(call) => {
                    if let Flow::Stop = self.dispatch(call).await? {
                        return Ok(());
                    }
                }
                Message::Notification(n) => {
                    trace!(stream = n.stream.key(), "ignoring notification outside interactive mode");
                }
                Message::Response(r) => {
                    warn!(id = r.id, "ignoring unsolicited response");
                }
            }
        }
    }

    async fn dispatch(&mut self, call: Call) -> Result<Flow, ServerError> {
        let Call { id, method, params } = call;
        let Some(handler) = self.registry.get(&method) else {
            warn!(id, %method, "unknown method");
            self.ctx
                .wire
                .send(Response::err(id, RpcError::method_not_found(&method)))
                .await?;
            return Ok(Flow::Continue);
        };

        debug!(id, %method, "dispatching");
        let response = match handler(&mut self.ctx, params).await {
            Ok(result) => Response::ok(id, result),
            Err(HandlerError::Disconnected) => {
                info!(%method, "operator disconnected mid-call");
                return Ok(Flow::Stop);
            }
            Err(err) if err.is_fatal() => {
                return Err(ServerError::Handler { method, source: err });
            }
            Err(err) => {
                debug!(id, %method, error = %err, "method failed");
                Response::err(id, RpcError::from(&err))
            }
        };
        self.ctx.wire.send(response).await?;
        Ok(Flow::Continue)
    }
}
