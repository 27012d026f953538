//! Boundary to the native client library.
//!
//! A transport accepts typed requests and answers each with exactly one
//! callback invocation. Unsolicited updates go to the single [`ResultSink`]
//! registered when the handle is created. All callbacks and pushes of one
//! handle are delivered from one logical dispatcher, in order.

use std::sync::Arc;

use shared::protocol::{TdFunction, TdObject};

pub type ResultCallback = Box<dyn FnOnce(TdObject) + Send + 'static>;

pub trait ResultSink: Send + Sync {
    /// Must return promptly: the transport delivers every result on the
    /// same dispatcher.
    fn on_push(&self, object: TdObject);
}

pub trait Transport: Send + Sync {
    fn send(&self, request: TdFunction, on_result: ResultCallback);
    fn close(&self);
}

pub trait TransportConnector: Send + Sync {
    fn connect(&self, sink: Arc<dyn ResultSink>) -> anyhow::Result<Arc<dyn Transport>>;
}
