//! Operator side of the protocol.

pub mod client;
pub mod methods;
pub mod sink;
pub mod transport;

pub use client::{Client, ClientError, Interrupt};
pub use sink::{MemorySink, OutputSink, StdioSink};
pub use transport::{Channel, ChannelControl, SshTransport, Transport, TransportError};
