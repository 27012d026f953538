use std::sync::Arc;

use anyhow::{Context, Result};
use shared::{
    domain::{AuthPhase, DownloadCompletion, FileId},
    protocol::{File, PhoneNumberAuthenticationSettings, TdFunction, TdObject},
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_stream::Stream;
use tracing::{debug, info, warn};

pub mod auth;
pub mod config;
pub mod correlator;
pub mod downloads;
pub mod error;
pub mod loopback;
pub mod media;
mod router;
pub mod transport;

pub use config::ClientConfig;
pub use correlator::ResponseFuture;
pub use downloads::{CompletionBroadcast, DownloadAck};
pub use error::ClientError;
pub use loopback::{Loopback, LoopbackConfig};
pub use transport::{ResultCallback, ResultSink, Transport, TransportConnector};

use auth::{ensure_phase, AuthStateMachine};
use correlator::Correlator;
use downloads::DownloadTracker;
use router::{Dispatch, Dispatcher, Router};

/// Adapter over one backend session.
///
/// Pushes are classified by a router and applied by a single dispatcher
/// task; requests are correlated with their callbacks one-to-one. Must be
/// started from within a tokio runtime.
pub struct TelegramClient {
    config: ClientConfig,
    correlator: Arc<Correlator>,
    dispatch: mpsc::UnboundedSender<Dispatch>,
    auth_state: watch::Receiver<AuthPhase>,
    completions: CompletionBroadcast,
}

impl TelegramClient {
    pub fn start(connector: &dyn TransportConnector, config: ClientConfig) -> Result<Arc<Self>> {
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let router = Arc::new(Router::new(dispatch_tx.downgrade()));
        let transport = connector
            .connect(router)
            .context("failed to create transport handle")?;
        let correlator = Arc::new(Correlator::new(transport));

        let (phase_tx, phase_rx) = watch::channel(AuthPhase::Unknown);
        let completions = CompletionBroadcast::new(config.completion_capacity);
        let dispatcher = Dispatcher::new(
            dispatch_rx,
            AuthStateMachine::new(
                phase_tx,
                Arc::clone(&correlator),
                config.database_encryption_key.clone(),
            ),
            DownloadTracker::new(completions.clone()),
        );
        tokio::spawn(dispatcher.run());

        if let Some(level) = config.log_verbosity {
            correlator.call_detached(TdFunction::SetLogVerbosityLevel {
                new_verbosity_level: level,
            });
        }

        info!("client started");
        Ok(Arc::new(Self {
            config,
            correlator,
            dispatch: dispatch_tx,
            auth_state: phase_rx,
            completions,
        }))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth_state(&self) -> watch::Receiver<AuthPhase> {
        self.auth_state.clone()
    }

    pub fn auth_phase(&self) -> AuthPhase {
        *self.auth_state.borrow()
    }

    pub async fn wait_for_phase(&self, target: AuthPhase) -> Result<(), ClientError> {
        let mut rx = self.auth_state.clone();
        rx.wait_for(|phase| *phase == target)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Closed)
    }

    /// Single-shot request; see [`Correlator::call`].
    pub fn call(&self, request: TdFunction) -> ResponseFuture {
        self.correlator.call(request)
    }

    pub fn pending_calls(&self) -> usize {
        self.correlator.pending_calls()
    }

    pub async fn start_authentication(&self) -> Result<(), ClientError> {
        ensure_phase(
            "start_authentication",
            AuthPhase::Unauthenticated,
            self.auth_phase(),
        )?;
        info!("sending tdlib parameters");
        self.call_expecting_ok(TdFunction::SetTdlibParameters {
            parameters: self.config.parameters.clone(),
        })
        .await
    }

    pub async fn submit_phone_number(&self, phone_number: &str) -> Result<(), ClientError> {
        self.call_expecting_ok(TdFunction::SetAuthenticationPhoneNumber {
            phone_number: phone_number.to_string(),
            settings: PhoneNumberAuthenticationSettings::default(),
        })
        .await
    }

    pub async fn submit_code(&self, code: &str) -> Result<(), ClientError> {
        self.call_expecting_ok(TdFunction::CheckAuthenticationCode {
            code: code.to_string(),
        })
        .await
    }

    pub async fn submit_password(&self, password: &str) -> Result<(), ClientError> {
        self.call_expecting_ok(TdFunction::CheckAuthenticationPassword {
            password: password.to_string(),
        })
        .await
    }

    pub async fn log_out(&self) -> Result<(), ClientError> {
        self.call_expecting_ok(TdFunction::LogOut).await
    }

    async fn call_expecting_ok(&self, request: TdFunction) -> Result<(), ClientError> {
        let name = request.name();
        match self.call(request).await {
            Ok(TdObject::Ok) => {
                debug!(request = name, "request accepted");
                Ok(())
            }
            Ok(other) => Err(ClientError::UnexpectedResponse {
                request: name,
                received: other.name(),
            }),
            Err(err) => {
                warn!(request = name, error = %err, "request failed");
                Err(err)
            }
        }
    }

    /// `true` once the backend accepted the request; completion is reported
    /// separately through the completion broadcast.
    pub async fn request_download(&self, file_id: FileId) -> Result<bool, ClientError> {
        Ok(self.submit_download(file_id).await?.is_accepted())
    }

    async fn submit_download(&self, file_id: FileId) -> Result<DownloadAck, ClientError> {
        // Queued ahead of the request so the dispatcher re-arms the id before
        // any update the request produces.
        self.dispatch
            .send(Dispatch::DownloadRequested(file_id))
            .map_err(|_| ClientError::Closed)?;

        let outcome = self
            .call(TdFunction::DownloadFile {
                file_id,
                priority: self.config.download_priority,
                offset: 0,
                limit: 0,
                synchronous: true,
            })
            .await;
        downloads::acknowledgement(file_id, outcome)
    }

    /// Requests `file_id` and waits for its completion.
    pub async fn download_and_wait(
        &self,
        file_id: FileId,
    ) -> Result<DownloadCompletion, ClientError> {
        let mut completions = self.completions.subscribe();

        match self.submit_download(file_id).await? {
            DownloadAck::Rejected => return Err(ClientError::DownloadRejected { file_id }),
            DownloadAck::Accepted(Some(file)) => {
                if let Some(path) = file.completed_path() {
                    return Ok(DownloadCompletion::new(file_id, path));
                }
            }
            DownloadAck::Accepted(None) => {}
        }

        loop {
            match completions.recv().await {
                Ok(completion) if completion.file_id == file_id => return Ok(completion),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(%file_id, skipped, "completion wait lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(ClientError::Closed),
            }
        }
    }

    /// Path of `file` when it is already on disk. Otherwise starts a download
    /// when one is possible and returns `None`; the completion arrives on the
    /// broadcast.
    pub async fn local_path_or_download(&self, file: &File) -> Result<Option<String>, ClientError> {
        if let Some(path) = file.completed_path() {
            return Ok(Some(path.to_string()));
        }
        if !file.local.is_downloading_completed && file.local.can_be_downloaded {
            self.request_download(file.id).await?;
            return Ok(None);
        }
        Ok((!file.local.path.is_empty()).then(|| file.local.path.clone()))
    }

    pub fn subscribe_downloads(&self) -> broadcast::Receiver<DownloadCompletion> {
        self.completions.subscribe()
    }

    pub fn download_completions(&self) -> impl Stream<Item = DownloadCompletion> + Send + Unpin {
        self.completions.stream()
    }

    /// Closes the transport handle; calls still pending fail as aborted.
    pub fn close(&self) {
        info!(pending = self.pending_calls(), "closing client");
        self.correlator.close();
    }

    pub fn is_closed(&self) -> bool {
        self.correlator.is_closed()
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
