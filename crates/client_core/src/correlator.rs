//! Turns `send(request, callback)` into single-shot futures.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};

use shared::{
    error::TdError,
    protocol::{TdFunction, TdObject},
};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{error::ClientError, transport::Transport};

type CallOutcome = Result<TdObject, TdError>;

struct PendingCall {
    request: &'static str,
    slot: oneshot::Sender<CallOutcome>,
}

#[derive(Default)]
struct PendingTable {
    next_id: u64,
    calls: HashMap<u64, PendingCall>,
    closed: bool,
}

fn lock(table: &Mutex<PendingTable>) -> MutexGuard<'_, PendingTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Correlator {
    transport: Arc<dyn Transport>,
    pending: Arc<Mutex<PendingTable>>,
}

impl Correlator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            pending: Arc::new(Mutex::new(PendingTable::default())),
        }
    }

    /// Hands `request` to the transport immediately. Dropping the returned
    /// future does not retract the request; its result is discarded.
    pub fn call(&self, request: TdFunction) -> ResponseFuture {
        let name = request.name();
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut table = lock(&self.pending);
            if table.closed {
                return ResponseFuture::closed(name);
            }
            let id = table.next_id;
            table.next_id += 1;
            table.calls.insert(
                id,
                PendingCall {
                    request: name,
                    slot: tx,
                },
            );
            id
        };

        debug!(request = name, call_id = id, "sending request");
        let slot = CallbackSlot {
            id,
            request: name,
            table: Arc::clone(&self.pending),
        };
        self.transport
            .send(request, Box::new(move |object| slot.resolve(object)));

        ResponseFuture {
            request: name,
            rx: Some(rx),
        }
    }

    /// Sends `request` and only logs how it went.
    pub fn call_detached(&self, request: TdFunction) {
        let response = self.call(request);
        tokio::spawn(async move {
            let request = response.request();
            match response.await {
                Ok(object) => debug!(request, result = object.name(), "request succeeded"),
                Err(err) => warn!(request, error = %err, "request failed"),
            }
        });
    }

    pub fn pending_calls(&self) -> usize {
        lock(&self.pending).calls.len()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.pending).closed
    }

    /// Closes the transport and aborts every call still waiting for a
    /// result. Late callbacks find no entry and are dropped.
    pub fn close(&self) {
        let aborted: Vec<PendingCall> = {
            let mut table = lock(&self.pending);
            if table.closed {
                return;
            }
            table.closed = true;
            table.calls.drain().map(|(_, call)| call).collect()
        };

        self.transport.close();

        for call in aborted {
            debug!(request = call.request, "aborting pending request");
            let _ = call.slot.send(Err(TdError::aborted()));
        }
    }
}

/// Owned by the transport callback. Resolves the pending entry when invoked
/// and releases it if the transport drops the callback unused.
struct CallbackSlot {
    id: u64,
    request: &'static str,
    table: Arc<Mutex<PendingTable>>,
}

impl CallbackSlot {
    fn resolve(&self, object: TdObject) {
        let Some(call) = lock(&self.table).calls.remove(&self.id) else {
            debug!(
                request = self.request,
                call_id = self.id,
                "discarding result for a call that is no longer pending"
            );
            return;
        };

        let outcome = match object {
            TdObject::Error(err) => Err(err),
            other => Ok(other),
        };
        if call.slot.send(outcome).is_err() {
            debug!(
                request = self.request,
                call_id = self.id,
                "caller stopped waiting; result discarded"
            );
        }
    }
}

impl Drop for CallbackSlot {
    fn drop(&mut self) {
        if lock(&self.table).calls.remove(&self.id).is_some() {
            warn!(
                request = self.request,
                call_id = self.id,
                "transport dropped a callback without invoking it"
            );
        }
    }
}

/// Result of one correlated call.
#[must_use = "dropping the future discards the result, the request is still sent"]
pub struct ResponseFuture {
    request: &'static str,
    rx: Option<oneshot::Receiver<CallOutcome>>,
}

impl ResponseFuture {
    fn closed(request: &'static str) -> Self {
        Self { request, rx: None }
    }

    pub fn request(&self) -> &'static str {
        self.request
    }
}

impl Future for ResponseFuture {
    type Output = Result<TdObject, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let request = self.request;
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(Err(ClientError::Closed));
        };

        match Pin::new(rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Ok(object))) => Poll::Ready(Ok(object)),
            Poll::Ready(Ok(Err(error))) => {
                Poll::Ready(Err(ClientError::Transport { request, error }))
            }
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::ResponseDropped { request })),
        }
    }
}

#[cfg(test)]
#[path = "tests/correlator_tests.rs"]
mod tests;
