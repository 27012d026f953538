use super::*;
use anyhow::anyhow;
use async_trait::async_trait;
use shared::domain::FileId;
use storage::PublicMediaStore;

use crate::downloads::CompletionBroadcast;

struct FailingStore;

#[async_trait]
impl MediaStore for FailingStore {
    async fn save(&self, _request: &MediaSaveRequest) -> anyhow::Result<PathBuf> {
        Err(anyhow!("disk full"))
    }
}

#[tokio::test]
async fn storage_failures_are_swallowed() {
    let completion = DownloadCompletion::new(FileId(1), "/x/1.jpg");
    assert_eq!(save_completion(&FailingStore, &completion).await, None);
}

#[tokio::test]
async fn saver_writes_each_completion_until_broadcast_closes() {
    let source = tempfile::tempdir().expect("source");
    let media_root = tempfile::tempdir().expect("media root");
    let photo = source.path().join("7.jpg");
    let video = source.path().join("42.mp4");
    std::fs::write(&photo, b"photo").expect("photo");
    std::fs::write(&video, b"video").expect("video");

    let completions = CompletionBroadcast::new(8);
    let store: Arc<dyn MediaStore> = Arc::new(PublicMediaStore::new(media_root.path()));
    let saver = spawn_media_saver(completions.subscribe(), store);

    completions.publish(DownloadCompletion::new(FileId(7), photo.to_string_lossy()));
    completions.publish(DownloadCompletion::new(FileId(404), "/missing/404.png"));
    completions.publish(DownloadCompletion::new(FileId(42), video.to_string_lossy()));
    drop(completions);

    tokio::time::timeout(std::time::Duration::from_secs(5), saver)
        .await
        .expect("saver stops once the broadcast closes")
        .expect("saver task");

    let pictures: Vec<_> = std::fs::read_dir(media_root.path().join("Pictures/TeleSave"))
        .expect("pictures dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    let movies: Vec<_> = std::fs::read_dir(media_root.path().join("Movies/TeleSave"))
        .expect("movies dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();

    assert_eq!(pictures.len(), 1, "{pictures:?}");
    assert!(pictures[0].starts_with("TeleSave_") && pictures[0].ends_with("_7.jpg"));
    assert_eq!(movies.len(), 1, "{movies:?}");
    assert!(movies[0].ends_with("_42.mp4"));
}
