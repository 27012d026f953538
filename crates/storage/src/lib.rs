//! Public media storage for completed downloads.
//!
//! Completed files are copied out of the client's private files directory
//! into a user-visible media tree (`Pictures/TeleSave`, `Movies/TeleSave`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use shared::domain::DownloadCompletion;
use tokio::fs;
use tracing::{debug, info, warn};

pub const MEDIA_SUBFOLDER: &str = "TeleSave";
pub const PICTURES_DIR: &str = "Pictures";
pub const MOVIES_DIR: &str = "Movies";
const FALLBACK_EXTENSION: &str = "dat";
const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSaveRequest {
    pub source_path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
    pub is_video: bool,
}

impl MediaSaveRequest {
    /// Builds the save request for a completed download, named after the
    /// time it is saved and the file id it came from.
    pub fn for_completion(completion: &DownloadCompletion, saved_at: DateTime<Local>) -> Self {
        let source_path = PathBuf::from(&completion.local_path);
        let extension = source_path
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .unwrap_or(FALLBACK_EXTENSION)
            .to_string();
        let file_name = format!(
            "{MEDIA_SUBFOLDER}_{}_{}.{extension}",
            saved_at.format("%Y%m%d_%H%M%S"),
            completion.file_id
        );
        let mime_type = mime_type_for_extension(&extension);
        let is_video = mime_type.starts_with("video");

        Self {
            source_path,
            file_name,
            mime_type,
            is_video,
        }
    }
}

pub fn mime_type_for_extension(extension: &str) -> String {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "png" => "image/png".to_string(),
        "mp4" => "video/mp4".to_string(),
        other => mime_guess::from_ext(other)
            .first_raw()
            .unwrap_or(FALLBACK_MIME)
            .to_string(),
    }
}

/// Durable writer for completed media.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn save(&self, request: &MediaSaveRequest) -> Result<PathBuf>;
}

/// Writes media beneath a root directory laid out like a user's home:
/// videos under `Movies/TeleSave`, everything else under `Pictures/TeleSave`.
#[derive(Debug, Clone)]
pub struct PublicMediaStore {
    root: PathBuf,
}

impl PublicMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn directory_for(&self, is_video: bool) -> PathBuf {
        let collection = if is_video { MOVIES_DIR } else { PICTURES_DIR };
        self.root.join(collection).join(MEDIA_SUBFOLDER)
    }
}

#[async_trait]
impl MediaStore for PublicMediaStore {
    async fn save(&self, request: &MediaSaveRequest) -> Result<PathBuf> {
        let directory = self.directory_for(request.is_video);
        fs::create_dir_all(&directory).await.with_context(|| {
            format!("failed to create media directory '{}'", directory.display())
        })?;

        let target = directory.join(&request.file_name);
        let pending = directory.join(format!(".pending-{}", request.file_name));

        let written = async {
            fs::copy(&request.source_path, &pending)
                .await
                .with_context(|| {
                    format!(
                        "failed to copy '{}' into '{}'",
                        request.source_path.display(),
                        pending.display()
                    )
                })?;
            fs::rename(&pending, &target).await.with_context(|| {
                format!("failed to publish '{}'", target.display())
            })?;
            Ok::<_, anyhow::Error>(())
        }
        .await;

        if let Err(err) = written {
            if let Err(cleanup_err) = fs::remove_file(&pending).await {
                debug!(
                    path = %pending.display(),
                    error = %cleanup_err,
                    "no pending media entry to clean up"
                );
            }
            warn!(file_name = %request.file_name, error = %err, "media save failed");
            return Err(err);
        }

        info!(
            path = %target.display(),
            mime_type = %request.mime_type,
            "saved media to public storage"
        );
        Ok(target)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
