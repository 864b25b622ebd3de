//! Wire protocol: message shapes, line framing and error codes.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{FrameError, FrameReader, FrameWriter, decode, encode};
pub use error::{ErrorCode, RpcError};
pub use message::{Call, Message, Notification, Response, Stream};
