use thiserror::Error;

use crate::config::ConfigError;
use crate::rpc::RpcError;
use crate::schema::{SchemaError, ValueError};

/// Crate-level convenience error.
///
/// Not a "god error": it is a thin wrapper over the canonical module errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether retrying the failed operation on the same session may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Schema(_) | Error::Value(_) | Error::Config(_) => false,
            Error::Rpc(e) => e.is_retryable(),
        }
    }
}
