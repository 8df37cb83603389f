//! The OVSDB client façade.
//!
//! Owns the schema cache, the monitor-handle registry, and the connection
//! lifecycle; everything on the wire goes through the RPC endpoint.

pub mod monitor;
pub mod operations;

use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::Value;

use crate::config::{ConnectionConfig, ConnectionType, SocketConnectionType};
use crate::device::DeviceInfo;
use crate::error::Error;
use crate::rpc::{Endpoint, Reply, RpcCallback, RpcError};
use crate::schema::DatabaseSchema;

use self::monitor::{MonitorCallback, MonitorHandle, MonitorRequest, TableUpdates, monitor_params};
use self::operations::{Operation, OperationResult, TransactBuilder, decode_results};

/// Who initiated the session and how, plus the socket addresses.
#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    pub remote_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
    pub connection_type: ConnectionType,
    pub socket_connection_type: SocketConnectionType,
}

#[derive(Clone)]
struct MonitorRegistration {
    callback: Arc<dyn MonitorCallback>,
    schema: Arc<DatabaseSchema>,
}

type MonitorRegistry = Arc<Mutex<HashMap<String, MonitorRegistration>>>;

pub struct OvsdbClient {
    endpoint: Arc<Endpoint>,
    config: ConnectionConfig,
    schemas: Mutex<HashMap<String, Arc<DatabaseSchema>>>,
    monitors: MonitorRegistry,
    /// Strong ref keeps the endpoint's weak sink alive until disconnect.
    sink: Mutex<Option<Arc<dyn RpcCallback>>>,
    device_info: Arc<DeviceInfo>,
    published: AtomicBool,
}

impl OvsdbClient {
    /// Wraps an established stream. Socket and TLS bring-up are the
    /// caller's concern.
    pub fn new(stream: TcpStream, config: ConnectionConfig) -> std::io::Result<OvsdbClient> {
        Ok(OvsdbClient::from_endpoint(Endpoint::new(stream)?, config))
    }

    pub fn from_endpoint(endpoint: Arc<Endpoint>, config: ConnectionConfig) -> OvsdbClient {
        let device_info = DeviceInfo::new(config.in_transit_expiry_ms, &config.worker_name());
        OvsdbClient {
            endpoint,
            config,
            schemas: Mutex::new(HashMap::new()),
            monitors: Arc::new(Mutex::new(HashMap::new())),
            sink: Mutex::new(None),
            device_info,
            published: AtomicBool::new(false),
        }
    }

    pub fn list_databases(&self) -> Reply<Vec<String>> {
        self.endpoint.list_databases()
    }

    /// Returns the cached schema, fetching and parsing it on first use.
    /// Internally generated columns are populated before the schema is
    /// cached, so rows decode `_uuid` like any other column.
    pub fn get_schema(&self, database: &str) -> Result<Arc<DatabaseSchema>, Error> {
        if let Some(schema) = self.schemas.lock().expect("schema cache lock").get(database) {
            return Ok(Arc::clone(schema));
        }

        let body = self.endpoint.get_schema(database).wait()?;
        let mut schema = DatabaseSchema::from_json(database, &body)?;
        schema.populate_internally_generated_columns();
        let schema = Arc::new(schema);

        self.schemas
            .lock()
            .expect("schema cache lock")
            .insert(database.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    /// The cached schema, if one has been fetched.
    pub fn cached_schema(&self, database: &str) -> Option<Arc<DatabaseSchema>> {
        self.schemas
            .lock()
            .expect("schema cache lock")
            .get(database)
            .cloned()
    }

    /// Sends one transact batch. The reply decodes into one
    /// `OperationResult` per operation, index-aligned with the request,
    /// plus at most one trailing server-inserted slot.
    pub fn transact(
        &self,
        schema: &DatabaseSchema,
        operations: Vec<Operation>,
    ) -> Reply<Vec<OperationResult>> {
        let mut builder = TransactBuilder::new(schema);
        for operation in operations {
            builder.add(operation);
        }
        self.endpoint
            .transact(builder.build_params())
            .map(decode_results)
    }

    /// Subscribes with a fresh handle and the configured default timeout;
    /// returns the initial snapshot.
    pub fn monitor(
        &self,
        schema: &Arc<DatabaseSchema>,
        requests: &[MonitorRequest],
        callback: Arc<dyn MonitorCallback>,
    ) -> Result<(MonitorHandle, TableUpdates), Error> {
        let handle = MonitorHandle::random();
        let snapshot = self.monitor_with_handle(
            schema,
            requests,
            &handle,
            callback,
            self.config.monitor_timeout(),
        )?;
        Ok((handle, snapshot))
    }

    /// Subscribes under a caller-supplied handle (used for resume). The
    /// handle stays registered on failure; the subscription state is
    /// undefined until `cancel_monitor` succeeds or the session closes.
    pub fn monitor_with_handle(
        &self,
        schema: &Arc<DatabaseSchema>,
        requests: &[MonitorRequest],
        handle: &MonitorHandle,
        callback: Arc<dyn MonitorCallback>,
        timeout: Option<Duration>,
    ) -> Result<TableUpdates, Error> {
        self.register_monitor(handle, callback, schema);

        let database = schema.name().to_string();
        let deferred_handle = handle.clone();
        let deferred_requests = requests.to_vec();
        let reply = self
            .endpoint
            .monitor(move || monitor_params(&database, &deferred_handle, &deferred_requests));
        let body = reply.wait_opt(timeout).inspect_err(|err| {
            tracing::warn!(handle = handle.id(), "monitor request failed: {err}");
        })?;
        let snapshot = TableUpdates::from_json(schema, &body)?;
        Ok(snapshot)
    }

    /// Best-effort cancel: a timeout or RPC failure is logged and swallowed,
    /// and the handler stays registered until the session closes.
    pub fn cancel_monitor(&self, handle: &MonitorHandle, timeout: Option<Duration>) {
        let reply = self.endpoint.monitor_cancel(handle.id());
        match reply.wait_opt(timeout) {
            Ok(_) => {
                self.monitors
                    .lock()
                    .expect("monitor registry lock")
                    .remove(handle.id());
                tracing::debug!(handle = handle.id(), "monitor cancelled");
            }
            Err(err) => {
                tracing::warn!(handle = handle.id(), "monitor cancel failed: {err}");
            }
        }
    }

    pub fn echo(&self) -> Reply<Vec<String>> {
        self.endpoint.echo()
    }

    pub fn lock(&self, _lock_id: &str) -> Result<(), Error> {
        Err(RpcError::Unimplemented { method: "lock" }.into())
    }

    pub fn unlock(&self, _lock_id: &str) -> Result<bool, Error> {
        Err(RpcError::Unimplemented { method: "unlock" }.into())
    }

    pub fn steal(&self, _lock_id: &str) -> Result<bool, Error> {
        Err(RpcError::Unimplemented { method: "steal" }.into())
    }

    /// Polls the schema cache once per second; used by integration tests.
    pub fn is_ready(&self, timeout_secs: u64) -> bool {
        for _ in 0..timeout_secs {
            if !self.schemas.lock().expect("schema cache lock").is_empty() {
                return true;
            }
            thread::sleep(Duration::from_secs(1));
        }
        !self.schemas.lock().expect("schema cache lock").is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.endpoint.is_active()
    }

    /// Closes the session: pending replies fail with `ConnectionClosed`,
    /// the dependency queue drains without running further jobs, and the
    /// monitor registry empties. Idempotent.
    pub fn disconnect(&self) {
        self.endpoint.close();
        self.device_info.shutdown();
        self.monitors.lock().expect("monitor registry lock").clear();
        *self.sink.lock().expect("sink lock") = None;
    }

    pub fn is_connection_published(&self) -> bool {
        self.published.load(Ordering::Acquire)
    }

    pub fn set_connection_published(&self, published: bool) {
        self.published.store(published, Ordering::Release);
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            remote_addr: self.endpoint.remote_addr(),
            local_addr: self.endpoint.local_addr(),
            connection_type: self.config.connection_type,
            socket_connection_type: self.config.socket_connection_type,
        }
    }

    /// The per-connection device state registry.
    pub fn device_info(&self) -> &Arc<DeviceInfo> {
        &self.device_info
    }

    fn register_monitor(
        &self,
        handle: &MonitorHandle,
        callback: Arc<dyn MonitorCallback>,
        schema: &Arc<DatabaseSchema>,
    ) {
        self.monitors.lock().expect("monitor registry lock").insert(
            handle.id().to_string(),
            MonitorRegistration {
                callback,
                schema: Arc::clone(schema),
            },
        );
        self.install_sink();
    }

    /// Installs the server-push sink on first use.
    fn install_sink(&self) {
        let mut sink = self.sink.lock().expect("sink lock");
        if sink.is_some() {
            return;
        }
        let installed: Arc<dyn RpcCallback> = Arc::new(ClientSink {
            monitors: Arc::clone(&self.monitors),
        });
        self.endpoint.register_callback(&installed);
        *sink = Some(installed);
    }
}

impl Drop for OvsdbClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// The endpoint-facing sink: routes `update` notifications to the monitor
/// registered under their context handle.
struct ClientSink {
    monitors: MonitorRegistry,
}

impl RpcCallback for ClientSink {
    fn update(&self, context: &Value, updates: &Value) {
        let Some(handle_id) = context.as_str() else {
            tracing::warn!("update context is not a string, ignoring");
            return;
        };
        let registration = self
            .monitors
            .lock()
            .expect("monitor registry lock")
            .get(handle_id)
            .cloned();
        let Some(registration) = registration else {
            tracing::info!(context = handle_id, "update received with no known handler, ignoring");
            return;
        };

        match TableUpdates::from_json(&registration.schema, updates) {
            Ok(decoded) => registration.callback.update(decoded, &registration.schema),
            Err(err) => registration.callback.error(err.into()),
        }
    }

    fn locked(&self, ids: Vec<String>) {
        tracing::debug!(?ids, "locked notification (lock support not implemented)");
    }

    fn stolen(&self, ids: Vec<String>) {
        tracing::debug!(?ids, "stolen notification (lock support not implemented)");
    }
}
