//! The duplex RPC endpoint.
//!
//! One endpoint per stream socket. A dedicated reader thread decodes inbound
//! JSON objects: responses complete the matching pending reply, server calls
//! are dispatched to the registered sink. Dispatch runs inline on the reader
//! thread, which serializes notification delivery for the session.

use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;

use serde_json::{Value, json};

use super::RpcError;
use super::message::{Inbound, Request, response_json};
use super::reply::{PendingReplies, Reply};

/// Sink for server-initiated notifications. Held weakly by the endpoint so
/// that disconnect severs it without a leak.
pub trait RpcCallback: Send + Sync {
    fn update(&self, context: &Value, updates: &Value);
    fn locked(&self, ids: Vec<String>);
    fn stolen(&self, ids: Vec<String>);
}

type SharedCallback = Arc<Mutex<Option<Weak<dyn RpcCallback>>>>;

pub struct Endpoint {
    stream: TcpStream,
    writer: Arc<Mutex<TcpStream>>,
    pending: Arc<PendingReplies>,
    callback: SharedCallback,
    next_id: AtomicU64,
    active: Arc<AtomicBool>,
}

impl Endpoint {
    /// Takes ownership of an established stream and starts the reader
    /// thread. Socket/TLS bring-up belongs to the caller.
    pub fn new(stream: TcpStream) -> std::io::Result<Arc<Endpoint>> {
        stream.set_nodelay(true)?;
        let reader_stream = stream.try_clone()?;
        let writer = Arc::new(Mutex::new(stream.try_clone()?));

        let endpoint = Arc::new(Endpoint {
            stream,
            writer: Arc::clone(&writer),
            pending: Arc::new(PendingReplies::default()),
            callback: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
            active: Arc::new(AtomicBool::new(true)),
        });

        let pending = Arc::clone(&endpoint.pending);
        let callback = Arc::clone(&endpoint.callback);
        let active = Arc::clone(&endpoint.active);
        thread::Builder::new()
            .name("ovsdb-rpc-reader".to_string())
            .spawn(move || run_reader_loop(reader_stream, writer, pending, callback, active))?;

        Ok(endpoint)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.stream.local_addr().ok()
    }

    /// Registers the sink for `update`/`locked`/`stolen`. The endpoint keeps
    /// only a weak reference; the caller owns the sink's lifetime.
    pub fn register_callback(&self, sink: &Arc<dyn RpcCallback>) {
        *self.callback.lock().expect("callback lock") = Some(Arc::downgrade(sink));
    }

    pub fn list_databases(&self) -> Reply<Vec<String>> {
        self.call("list_dbs", Vec::new()).map(decode_string_list)
    }

    pub fn get_schema(&self, database: &str) -> Reply<Value> {
        self.call("get_schema", vec![json!(database)])
    }

    pub fn transact(&self, params: Vec<Value>) -> Reply<Value> {
        self.call("transact", params)
    }

    /// The params provider runs just before the request is written, so the
    /// caller can defer serialization of a large monitor request.
    pub fn monitor(&self, params: impl FnOnce() -> Vec<Value>) -> Reply<Value> {
        self.call("monitor", params())
    }

    pub fn monitor_cancel(&self, handle: &str) -> Reply<Value> {
        self.call("monitor_cancel", vec![json!(handle)])
    }

    pub fn echo(&self) -> Reply<Vec<String>> {
        self.call("echo", Vec::new()).map(decode_string_list)
    }

    pub fn lock(&self, lock_id: &str) -> Reply<Value> {
        self.call("lock", vec![json!(lock_id)])
    }

    pub fn unlock(&self, lock_id: &str) -> Reply<Value> {
        self.call("unlock", vec![json!(lock_id)])
    }

    pub fn steal(&self, lock_id: &str) -> Reply<Value> {
        self.call("steal", vec![json!(lock_id)])
    }

    /// Closes the session: fails every pending reply with
    /// `ConnectionClosed`, severs the sink, shuts the socket down.
    /// Idempotent.
    pub fn close(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let _ = self.stream.shutdown(Shutdown::Both);
        self.pending.fail_all(|| RpcError::ConnectionClosed);
        *self.callback.lock().expect("callback lock") = None;
    }

    fn call(&self, method: &'static str, params: Vec<Value>) -> Reply<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if !self.is_active() {
            return Reply::failed(id, Arc::clone(&self.pending), RpcError::ConnectionClosed);
        }

        let rx = self.pending.register(id);
        let request = Request::new(id, method, params);
        if let Err(err) = write_message(&self.writer, &request.to_json()) {
            tracing::warn!(method, id, "request write failed: {err}");
            self.pending.cancel(id);
            return Reply::failed(id, Arc::clone(&self.pending), RpcError::Io(err));
        }
        Reply::new(id, rx, Arc::clone(&self.pending))
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_message(writer: &Arc<Mutex<TcpStream>>, message: &Value) -> std::io::Result<()> {
    let mut bytes = serde_json::to_vec(message).map_err(std::io::Error::other)?;
    bytes.push(b'\n');
    let mut stream = writer.lock().expect("writer lock");
    stream.write_all(&bytes)?;
    stream.flush()
}

fn run_reader_loop(
    stream: TcpStream,
    writer: Arc<Mutex<TcpStream>>,
    pending: Arc<PendingReplies>,
    callback: SharedCallback,
    active: Arc<AtomicBool>,
) {
    // Whitespace framing is not assumed: the stream deserializer consumes
    // one JSON object at a time wherever the previous one ended.
    let reader = BufReader::new(stream);
    let messages = serde_json::Deserializer::from_reader(reader).into_iter::<Value>();

    for message in messages {
        match message {
            Ok(message) => handle_inbound(message, &writer, &pending, &callback),
            Err(err) => {
                if !err.is_eof() {
                    tracing::warn!("inbound decode failed, closing session: {err}");
                }
                break;
            }
        }
        if !active.load(Ordering::Acquire) {
            break;
        }
    }

    active.store(false, Ordering::Release);
    pending.fail_all(|| RpcError::ConnectionClosed);
    *callback.lock().expect("callback lock") = None;
    tracing::debug!("rpc reader terminated");
}

fn handle_inbound(
    message: Value,
    writer: &Arc<Mutex<TcpStream>>,
    pending: &Arc<PendingReplies>,
    callback: &SharedCallback,
) {
    let inbound = match Inbound::classify(message) {
        Ok(inbound) => inbound,
        Err(err) => {
            tracing::warn!("dropping unclassifiable message: {err}");
            return;
        }
    };

    match inbound {
        Inbound::Response { id, result, error } => {
            let outcome = if error.is_null() {
                Ok(result)
            } else {
                Err(RpcError::OperationFailed {
                    error: error.to_string(),
                })
            };
            if !pending.complete(id, outcome) {
                tracing::debug!(id, "response for unknown or cancelled request");
            }
        }
        Inbound::Call { id, method, params } => {
            dispatch_call(&id, &method, params, writer, callback);
        }
    }
}

fn dispatch_call(
    id: &Value,
    method: &str,
    params: Vec<Value>,
    writer: &Arc<Mutex<TcpStream>>,
    callback: &SharedCallback,
) {
    match method {
        // RFC 7047 section 4.1.11: reply with the params we were sent.
        "echo" => {
            let response = response_json(id, Value::Array(params), Value::Null);
            if let Err(err) = write_message(writer, &response) {
                tracing::warn!("echo reply failed: {err}");
            }
        }
        "update" => {
            let Some(sink) = current_sink(callback) else {
                tracing::info!("update received with no callback registered, dropping");
                return;
            };
            if params.len() < 2 {
                tracing::warn!("update with short params, dropping");
                return;
            }
            sink.update(&params[0], &params[1]);
        }
        "locked" | "stolen" => {
            let Some(sink) = current_sink(callback) else {
                tracing::info!(method, "lock notification with no callback, dropping");
                return;
            };
            let ids = params
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            if method == "locked" {
                sink.locked(ids);
            } else {
                sink.stolen(ids);
            }
        }
        other => {
            tracing::warn!(method = other, "unknown server method");
            if !id.is_null() {
                let response = response_json(id, Value::Null, json!("unknown method"));
                if let Err(err) = write_message(writer, &response) {
                    tracing::warn!("error reply failed: {err}");
                }
            }
        }
    }
}

fn current_sink(callback: &SharedCallback) -> Option<Arc<dyn RpcCallback>> {
    callback
        .lock()
        .expect("callback lock")
        .as_ref()
        .and_then(Weak::upgrade)
}

fn decode_string_list(value: Value) -> Result<Vec<String>, RpcError> {
    let Value::Array(items) = value else {
        return Err(RpcError::parsing(format!(
            "expected an array of strings, got {value}"
        )));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            other => Err(RpcError::parsing(format!("expected a string, got {other}"))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::net::TcpListener;
    use std::time::Duration;

    /// A scripted peer: applies `respond` to each inbound request object and
    /// writes whatever messages it returns.
    fn spawn_server(
        respond: impl Fn(&Value) -> Vec<Value> + Send + 'static,
    ) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut writer = stream.try_clone().expect("clone");
            let reader = BufReader::new(stream);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                let request: Value = serde_json::from_str(&line).expect("request json");
                for message in respond(&request) {
                    let mut bytes = serde_json::to_vec(&message).expect("encode");
                    bytes.push(b'\n');
                    if writer.write_all(&bytes).is_err() {
                        return;
                    }
                }
            }
        });
        addr
    }

    fn connect(addr: SocketAddr) -> Arc<Endpoint> {
        Endpoint::new(TcpStream::connect(addr).expect("connect")).expect("endpoint")
    }

    #[derive(Default)]
    struct RecordingSink {
        updates: Mutex<Vec<(Value, Value)>>,
        locked: Mutex<Vec<Vec<String>>>,
    }

    impl RpcCallback for RecordingSink {
        fn update(&self, context: &Value, updates: &Value) {
            self.updates
                .lock()
                .unwrap()
                .push((context.clone(), updates.clone()));
        }

        fn locked(&self, ids: Vec<String>) {
            self.locked.lock().unwrap().push(ids);
        }

        fn stolen(&self, _ids: Vec<String>) {}
    }

    #[test]
    fn correlates_out_of_order_responses() {
        let addr = spawn_server(|request| {
            let id = request["id"].as_u64().unwrap();
            let method = request["method"].as_str().unwrap();
            match method {
                // Hold the first reply until the second request arrives.
                "list_dbs" => vec![],
                "echo" => vec![
                    json!({"id": id, "result": [], "error": null}),
                    json!({"id": id - 1, "result": ["hardware_vtep"], "error": null}),
                ],
                _ => panic!("unexpected method {method}"),
            }
        });
        let endpoint = connect(addr);

        let dbs = endpoint.list_databases();
        let echo = endpoint.echo();
        assert_eq!(
            echo.wait_timeout(Duration::from_secs(5)).unwrap(),
            Vec::<String>::new()
        );
        assert_eq!(
            dbs.wait_timeout(Duration::from_secs(5)).unwrap(),
            vec!["hardware_vtep".to_string()]
        );
    }

    #[test]
    fn error_response_fails_the_reply() {
        let addr = spawn_server(|request| {
            vec![json!({"id": request["id"], "result": null, "error": "unknown database"})]
        });
        let endpoint = connect(addr);

        let err = endpoint
            .get_schema("nope")
            .wait_timeout(Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, RpcError::OperationFailed { .. }));
    }

    #[test]
    fn answers_server_echo() {
        let addr = spawn_server(|request| {
            let method = request.get("method").and_then(Value::as_str);
            match method {
                // Client's own echo: probe it with a server-side echo first.
                Some("echo") => vec![
                    json!({"id": "srv-echo", "method": "echo", "params": ["ping"]}),
                    json!({"id": request["id"], "result": [], "error": null}),
                ],
                // The echo reply we receive back from the client.
                None => {
                    assert_eq!(request["result"], json!(["ping"]));
                    assert_eq!(request["id"], json!("srv-echo"));
                    vec![]
                }
                Some(other) => panic!("unexpected method {other}"),
            }
        });
        let endpoint = connect(addr);
        endpoint
            .echo()
            .wait_timeout(Duration::from_secs(5))
            .unwrap();
    }

    #[test]
    fn dispatches_update_to_sink() {
        let addr = spawn_server(|request| {
            vec![
                json!({"id": null, "method": "update", "params": ["mon-1", {"Bridge": {}}]}),
                json!({"id": request["id"], "result": [], "error": null}),
            ]
        });
        let endpoint = connect(addr);
        let sink: Arc<RecordingSink> = Arc::new(RecordingSink::default());
        let dyn_sink: Arc<dyn RpcCallback> = sink.clone();
        endpoint.register_callback(&dyn_sink);

        // The echo reply arrives after the update, so delivery has happened
        // once this returns (reader dispatch is in arrival order).
        endpoint
            .echo()
            .wait_timeout(Duration::from_secs(5))
            .unwrap();
        let updates = sink.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, json!("mon-1"));
    }

    #[test]
    fn close_fails_pending_and_is_idempotent() {
        // A server that never responds.
        let addr = spawn_server(|_| vec![]);
        let endpoint = connect(addr);

        let reply = endpoint.get_schema("hardware_vtep");
        endpoint.close();
        endpoint.close();

        assert!(matches!(reply.wait(), Err(RpcError::ConnectionClosed)));
        assert!(!endpoint.is_active());

        // New calls fail immediately.
        let err = endpoint.echo().wait().unwrap_err();
        assert!(matches!(err, RpcError::ConnectionClosed));
    }
}
