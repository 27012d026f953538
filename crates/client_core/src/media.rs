//! Saves every completed download to public storage.

use std::{path::PathBuf, sync::Arc};

use chrono::Local;
use shared::domain::DownloadCompletion;
use storage::{MediaSaveRequest, MediaStore};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

/// Saves one completion. Failures are logged and swallowed.
pub async fn save_completion(
    store: &dyn MediaStore,
    completion: &DownloadCompletion,
) -> Option<PathBuf> {
    let request = MediaSaveRequest::for_completion(completion, Local::now());
    debug!(
        file_id = %completion.file_id,
        file_name = %request.file_name,
        mime_type = %request.mime_type,
        is_video = request.is_video,
        "saving downloaded media"
    );

    match store.save(&request).await {
        Ok(saved) => {
            info!(file_id = %completion.file_id, path = %saved.display(), "media saved");
            Some(saved)
        }
        Err(err) => {
            error!(
                file_id = %completion.file_id,
                file_name = %request.file_name,
                error = %format!("{err:#}"),
                "failed to save media"
            );
            None
        }
    }
}

/// Runs until the completion broadcast closes.
pub fn spawn_media_saver(
    mut completions: broadcast::Receiver<DownloadCompletion>,
    store: Arc<dyn MediaStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match completions.recv().await {
                Ok(completion) => {
                    save_completion(store.as_ref(), &completion).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "media saver fell behind; completions skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("media saver stopped");
    })
}

#[cfg(test)]
#[path = "tests/media_tests.rs"]
mod tests;
