//! Blocking reply futures and the pending-request map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded};
use serde_json::Value;

use super::RpcError;

pub(crate) type Outcome = Result<Value, RpcError>;

/// The pending-request map: request id to completion channel.
///
/// Every transition (complete, cancel, fail-all) goes through the map lock,
/// so each entry is completed at most once across response, timeout, cancel,
/// and disconnect.
#[derive(Default)]
pub(crate) struct PendingReplies {
    inner: Mutex<HashMap<u64, Sender<Outcome>>>,
}

impl PendingReplies {
    pub fn register(&self, id: u64) -> Receiver<Outcome> {
        let (tx, rx) = bounded(1);
        self.inner.lock().expect("pending map lock").insert(id, tx);
        rx
    }

    /// Completes the entry if it is still pending. Returns whether a waiter
    /// was found.
    pub fn complete(&self, id: u64, outcome: Outcome) -> bool {
        let entry = self.inner.lock().expect("pending map lock").remove(&id);
        match entry {
            Some(tx) => {
                // A racing cancel may have dropped the receiver already.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Removes the entry without completing it.
    pub fn cancel(&self, id: u64) {
        self.inner.lock().expect("pending map lock").remove(&id);
    }

    /// Fails every pending entry, in id order for determinism.
    pub fn fail_all(&self, error: impl Fn() -> RpcError) {
        let drained: Vec<(u64, Sender<Outcome>)> = {
            let mut inner = self.inner.lock().expect("pending map lock");
            let mut entries: Vec<_> = inner.drain().collect();
            entries.sort_by_key(|(id, _)| *id);
            entries
        };
        for (_, tx) in drained {
            let _ = tx.send(Err(error()));
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("pending map lock").len()
    }
}

type Decode<T> = Box<dyn FnOnce(Value) -> Result<T, RpcError> + Send>;

/// A blocking future for one RPC reply.
///
/// Dropping a reply without waiting cancels the pending entry; cancellation
/// and completion race such that at most one of them wins.
pub struct Reply<T> {
    id: u64,
    rx: Receiver<Outcome>,
    pending: Arc<PendingReplies>,
    decode: Option<Decode<T>>,
}

impl Reply<Value> {
    pub(crate) fn new(id: u64, rx: Receiver<Outcome>, pending: Arc<PendingReplies>) -> Self {
        Reply {
            id,
            rx,
            pending,
            decode: Some(Box::new(Ok)),
        }
    }

    /// A reply that is already failed; used when the session is gone before
    /// the request could be written.
    pub(crate) fn failed(id: u64, pending: Arc<PendingReplies>, error: RpcError) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(Err(error));
        Reply {
            id,
            rx,
            pending,
            decode: Some(Box::new(Ok)),
        }
    }
}

impl<T: 'static> Reply<T> {
    /// Chains a decode step onto the reply; runs on the waiting thread.
    pub fn map<U>(
        mut self,
        f: impl FnOnce(T) -> Result<U, RpcError> + Send + 'static,
    ) -> Reply<U> {
        let decode = self.decode.take().expect("reply already consumed");
        Reply {
            id: self.id,
            rx: self.rx.clone(),
            pending: Arc::clone(&self.pending),
            decode: Some(Box::new(move |value| decode(value).and_then(f))),
        }
    }

    /// Blocks until the reply completes or the session closes.
    pub fn wait(mut self) -> Result<T, RpcError> {
        let decode = self.decode.take().expect("reply already consumed");
        match self.rx.recv() {
            Ok(Ok(value)) => decode(value),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(RpcError::ConnectionClosed),
        }
    }

    /// Blocks with a deadline. On expiry the pending entry is cancelled and
    /// the call fails with `Timeout`.
    pub fn wait_timeout(mut self, timeout: Duration) -> Result<T, RpcError> {
        let decode = self.decode.take().expect("reply already consumed");
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(value)) => decode(value),
            Ok(Err(error)) => Err(error),
            Err(RecvTimeoutError::Timeout) => {
                self.pending.cancel(self.id);
                Err(RpcError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(RpcError::ConnectionClosed),
        }
    }

    /// `wait` with an optional deadline; `None` disables it.
    pub fn wait_opt(self, timeout: Option<Duration>) -> Result<T, RpcError> {
        match timeout {
            Some(timeout) => self.wait_timeout(timeout),
            None => self.wait(),
        }
    }

    /// Abandons the reply. The entry is removed from the pending map; a
    /// racing completion is a no-op.
    pub fn cancel(self) {}

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<T> Drop for Reply<T> {
    fn drop(&mut self) {
        // `wait*` take the decode closure out first; only an unconsumed
        // reply deregisters itself.
        if self.decode.is_some() {
            self.pending.cancel(self.id);
        }
    }
}
