//! Push classification and the dispatcher that owns adapter state.
//!
//! The router is the transport's single sink. It never touches state: it
//! classifies each push by tag and queues it for the dispatcher task, which
//! is the only place the auth phase and completion bookkeeping change. The
//! router only holds a weak sender, so the dispatcher stops once the client
//! that owns the strong sender is gone.

use shared::{
    domain::FileId,
    protocol::{AuthorizationState, File, TdObject},
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{auth::AuthStateMachine, downloads::DownloadTracker, transport::ResultSink};

#[derive(Debug)]
pub(crate) enum Dispatch {
    AuthUpdate(AuthorizationState),
    FileUpdate(File),
    DownloadRequested(FileId),
}

pub(crate) struct Router {
    dispatch: mpsc::WeakUnboundedSender<Dispatch>,
}

impl Router {
    pub(crate) fn new(dispatch: mpsc::WeakUnboundedSender<Dispatch>) -> Self {
        Self { dispatch }
    }

    fn forward(&self, dispatch: Dispatch) {
        let Some(tx) = self.dispatch.upgrade() else {
            debug!(?dispatch, "client dropped; dropping push");
            return;
        };
        if let Err(err) = tx.send(dispatch) {
            warn!(dispatch = ?err.0, "dispatcher stopped; dropping push");
        }
    }
}

impl ResultSink for Router {
    fn on_push(&self, object: TdObject) {
        match object {
            TdObject::UpdateAuthorizationState {
                authorization_state,
            } => self.forward(Dispatch::AuthUpdate(authorization_state)),
            TdObject::UpdateFile { file } => self.forward(Dispatch::FileUpdate(file)),
            TdObject::UpdateOption { name, value } => {
                debug!(option = %name, ?value, "ignoring option update")
            }
            other => debug!(push = other.name(), "ignoring unrecognized push"),
        }
    }
}

pub(crate) struct Dispatcher {
    rx: mpsc::UnboundedReceiver<Dispatch>,
    auth: AuthStateMachine,
    downloads: DownloadTracker,
}

impl Dispatcher {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<Dispatch>,
        auth: AuthStateMachine,
        downloads: DownloadTracker,
    ) -> Self {
        Self {
            rx,
            auth,
            downloads,
        }
    }

    pub(crate) async fn run(mut self) {
        while let Some(dispatch) = self.rx.recv().await {
            self.handle(dispatch);
        }
        debug!("dispatcher stopped");
    }

    fn handle(&mut self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::AuthUpdate(state) => self.auth.on_auth_update(&state),
            Dispatch::FileUpdate(file) => self.downloads.on_file_update(&file),
            Dispatch::DownloadRequested(file_id) => {
                self.downloads.on_download_requested(file_id)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
