use std::collections::HashSet;

use shared::{
    domain::{DownloadCompletion, FileId},
    protocol::{File, TdObject},
};
use tokio::sync::broadcast;
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    Stream, StreamExt,
};
use tracing::{debug, error, info, warn};

use crate::error::ClientError;

/// Multicast of completed downloads. Publishing never waits on a
/// subscriber; a subscriber that falls behind loses its oldest events.
#[derive(Clone)]
pub struct CompletionBroadcast {
    tx: broadcast::Sender<DownloadCompletion>,
}

impl CompletionBroadcast {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many subscribers the event was queued for.
    pub fn publish(&self, completion: DownloadCompletion) -> usize {
        self.tx.send(completion).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadCompletion> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn stream(&self) -> impl Stream<Item = DownloadCompletion> + Send + Unpin + 'static {
        completion_stream(self.subscribe())
    }
}

pub fn completion_stream(
    rx: broadcast::Receiver<DownloadCompletion>,
) -> impl Stream<Item = DownloadCompletion> + Send + Unpin + 'static {
    BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(completion) => Some(completion),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "download completion subscriber lagged");
            None
        }
    })
}

/// Completion bookkeeping, owned by the dispatcher.
pub(crate) struct DownloadTracker {
    notified: HashSet<FileId>,
    completions: CompletionBroadcast,
}

impl DownloadTracker {
    pub(crate) fn new(completions: CompletionBroadcast) -> Self {
        Self {
            notified: HashSet::new(),
            completions,
        }
    }

    /// A fresh request re-arms completion for `file_id`.
    pub(crate) fn on_download_requested(&mut self, file_id: FileId) {
        if self.notified.remove(&file_id) {
            debug!(%file_id, "completion re-armed by new download request");
        }
    }

    pub(crate) fn on_file_update(&mut self, file: &File) {
        let Some(path) = file.completed_path() else {
            if !file.local.is_downloading_completed && self.notified.remove(&file.id) {
                debug!(file_id = %file.id, "file no longer complete; completion re-armed");
            }
            debug!(
                file_id = %file.id,
                downloaded = file.local.downloaded_size,
                expected = file.expected_size.max(file.size),
                "file progress"
            );
            return;
        };

        if !self.notified.insert(file.id) {
            debug!(file_id = %file.id, "suppressing repeated completion");
            return;
        }

        let receivers = self
            .completions
            .publish(DownloadCompletion::new(file.id, path));
        info!(file_id = %file.id, path, receivers, "file download completed");
    }

    #[cfg(test)]
    pub(crate) fn is_notified(&self, file_id: FileId) -> bool {
        self.notified.contains(&file_id)
    }
}

/// How the transport answered a download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadAck {
    Accepted(Option<File>),
    Rejected,
}

impl DownloadAck {
    pub fn is_accepted(&self) -> bool {
        matches!(self, DownloadAck::Accepted(_))
    }
}

/// Maps a `downloadFile` result. Backend rejections become
/// [`DownloadAck::Rejected`]; only adapter failures stay errors.
pub(crate) fn acknowledgement(
    file_id: FileId,
    outcome: Result<TdObject, ClientError>,
) -> Result<DownloadAck, ClientError> {
    match outcome {
        Ok(TdObject::File(file)) => {
            debug!(%file_id, "download request accepted");
            Ok(DownloadAck::Accepted(Some(file)))
        }
        Ok(TdObject::Ok) => {
            debug!(%file_id, "download request accepted");
            Ok(DownloadAck::Accepted(None))
        }
        Ok(other) => {
            warn!(%file_id, result = other.name(), "unexpected result for download request");
            Ok(DownloadAck::Rejected)
        }
        Err(ClientError::Transport { error: td, .. }) => {
            error!(
                %file_id,
                code = td.code,
                message = %td.message,
                "failed to request download"
            );
            Ok(DownloadAck::Rejected)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
#[path = "tests/downloads_tests.rs"]
mod tests;
