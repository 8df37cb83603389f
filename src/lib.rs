#![forbid(unsafe_code)]

//! OVSDB (RFC 7047) client library with a hardware-VTEP device-state
//! registry.
//!
//! The layers, bottom up: [`notation`] models wire values, [`schema`] parses
//! server-advertised schemas and decodes typed values through them, [`rpc`]
//! runs the duplex JSON-RPC session, [`client`] is the caller-facing façade,
//! and [`device`] keeps per-connection device state plus the dependency
//! queue for out-of-order references.

pub mod client;
pub mod config;
pub mod device;
mod error;
pub mod notation;
pub mod rpc;
pub mod schema;
pub mod telemetry;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the working set at the crate root for convenience.
pub use crate::client::monitor::{
    MonitorCallback, MonitorHandle, MonitorRequest, MonitorSelect, RowUpdate, TableUpdate,
    TableUpdates,
};
pub use crate::client::operations::{
    Condition, Function, Mutation, Mutator, Operation, OperationResult, TransactBuilder,
};
pub use crate::client::{ConnectionInfo, OvsdbClient};
pub use crate::config::{
    Config, ConnectionConfig, ConnectionType, LogFormat, LoggingConfig, SocketConnectionType,
};
pub use crate::device::{
    DependencyQueue, DependentJob, DeviceData, DeviceDataStatus, DeviceInfo, DeviceKey,
    RemoteMcastMac, RemoteUcastMac, RowClass,
};
pub use crate::notation::{Atom, OvsdbMap, OvsdbSet, Row, TypedValue, UuidRef};
pub use crate::rpc::{Endpoint, Reply, RpcCallback, RpcError};
pub use crate::schema::{
    BaseType, ColumnSchema, ColumnType, DatabaseSchema, RefType, SchemaError, TableSchema,
    ValueError, UNLIMITED,
};
