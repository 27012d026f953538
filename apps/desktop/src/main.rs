use std::{fs, path::Path, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{media::spawn_media_saver, Loopback, LoopbackConfig, TelegramClient};
use shared::domain::{AuthPhase, FileId};
use storage::{MediaStore, PublicMediaStore};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::load_settings;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const SAVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
struct Args {
    /// TOML settings file; `telesave.toml` is read when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    phone: String,
    #[arg(long, default_value = "12345")]
    code: String,
    #[arg(long)]
    password: Option<String>,
    /// File id to download; repeatable.
    #[arg(long = "download")]
    downloads: Vec<i32>,
    #[arg(long)]
    media_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(root) = &args.media_root {
        settings.media_root = root.clone();
    }

    let mut backend = LoopbackConfig::default();
    for (file_id, path, size) in local_files(&settings.files_dir)? {
        backend = backend.with_file(file_id, path.to_string_lossy(), size);
    }
    if let Some(password) = &args.password {
        backend = backend.with_password(password.clone(), "");
    }
    let loopback = Loopback::new(backend);

    let client = TelegramClient::start(&loopback, settings.client_config())?;
    let store: Arc<dyn MediaStore> = Arc::new(PublicMediaStore::new(&settings.media_root));
    let saver = spawn_media_saver(client.subscribe_downloads(), store);

    sign_in(&client, &args).await?;
    info!("signed in");

    for file_id in args.downloads.iter().copied().map(FileId) {
        match tokio::time::timeout(DOWNLOAD_TIMEOUT, client.download_and_wait(file_id)).await {
            Ok(Ok(completion)) => {
                println!("Downloaded file {} to {}", completion.file_id, completion.local_path)
            }
            Ok(Err(err)) => error!(%file_id, error = %err, "download failed"),
            Err(_) => warn!(%file_id, "download timed out"),
        }
    }

    client.close();
    drop(client);
    if tokio::time::timeout(SAVER_DRAIN_TIMEOUT, saver).await.is_err() {
        warn!("media saver did not finish in time");
    }
    println!("Media saved under {}", settings.media_root.display());

    Ok(())
}

/// Drives the sign-in flow from whatever phase the backend reports.
async fn sign_in(client: &TelegramClient, args: &Args) -> Result<()> {
    let mut phases = client.auth_state();
    loop {
        let phase = *phases.borrow_and_update();
        match phase {
            AuthPhase::Unknown => {}
            AuthPhase::Unauthenticated => client
                .start_authentication()
                .await
                .context("failed to send client parameters")?,
            AuthPhase::WaitingForPhoneNumber => client
                .submit_phone_number(&args.phone)
                .await
                .context("phone number rejected")?,
            AuthPhase::WaitingForCode => client
                .submit_code(&args.code)
                .await
                .context("authentication code rejected")?,
            AuthPhase::WaitingForPassword => {
                let Some(password) = &args.password else {
                    bail!("account requires a password; pass --password");
                };
                client
                    .submit_password(password)
                    .await
                    .context("password rejected")?;
            }
            AuthPhase::Authenticated => return Ok(()),
        }
        phases
            .changed()
            .await
            .context("client stopped during sign-in")?;
    }
}

/// Files named `<file id>.<ext>` directly under `dir`.
fn local_files(dir: &Path) -> Result<Vec<(FileId, PathBuf, i64)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("failed to list files in '{}'", dir.display()))?
    {
        let path = entry?.path();
        let Some(file_id) = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<i32>().ok())
        else {
            continue;
        };
        let size = fs::metadata(&path)?.len();
        files.push((FileId(file_id), path, i64::try_from(size).unwrap_or(i64::MAX)));
    }
    Ok(files)
}
