//! JSON-RPC 1.0 session layer.
//!
//! One `Endpoint` per connection: requests are correlated with responses by
//! a monotonically unique id, and server-initiated calls (`echo`, `update`,
//! `locked`, `stolen`) are dispatched to a registered callback sink.

mod endpoint;
mod message;
mod reply;

pub use endpoint::{Endpoint, RpcCallback};
pub use message::{Inbound, Request};
pub use reply::Reply;

use thiserror::Error;

/// Session-layer failures.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("payload parse failed: {reason}")]
    Parsing { reason: String },

    #[error("rpc timed out after {:?}", .0)]
    Timeout(std::time::Duration),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("{method} is not yet implemented")]
    Unimplemented { method: &'static str },

    #[error("server returned an error: {error}")]
    OperationFailed { error: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    pub fn parsing(reason: impl Into<String>) -> Self {
        RpcError::Parsing {
            reason: reason.into(),
        }
    }

    /// Timeouts may clear on retry; everything else is permanent for the
    /// lifetime of the session.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Timeout(_))
    }
}
