use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use client_core::ClientConfig;
use serde::Deserialize;
use shared::protocol::TdlibParameters;

pub const DEFAULT_CONFIG_FILE: &str = "telesave.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_id: i32,
    pub api_hash: String,
    pub database_dir: PathBuf,
    pub files_dir: PathBuf,
    pub media_root: PathBuf,
    pub log_verbosity: Option<i32>,
    pub use_test_dc: bool,
    pub database_encryption_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_id: 0,
            api_hash: String::new(),
            database_dir: "./data/tdlib".into(),
            files_dir: "./data/files".into(),
            media_root: "./media".into(),
            log_verbosity: Some(1),
            use_test_dc: false,
            database_encryption_key: String::new(),
        }
    }
}

impl Settings {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            parameters: TdlibParameters {
                use_test_dc: self.use_test_dc,
                database_directory: self.database_dir.to_string_lossy().into_owned(),
                files_directory: self.files_dir.to_string_lossy().into_owned(),
                api_id: self.api_id,
                api_hash: self.api_hash.clone(),
                ..TdlibParameters::default()
            },
            log_verbosity: self.log_verbosity,
            database_encryption_key: self.database_encryption_key.clone(),
            ..ClientConfig::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    api_id: Option<i32>,
    api_hash: Option<String>,
    database_dir: Option<PathBuf>,
    files_dir: Option<PathBuf>,
    media_root: Option<PathBuf>,
    log_verbosity: Option<i32>,
    use_test_dc: Option<bool>,
    database_encryption_key: Option<String>,
}

/// Defaults, then the TOML file, then `TELESAVE_*` environment variables.
/// An explicit `config_path` must exist; the default file is optional.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match config_path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config '{}'", path.display()))?;
            apply_file(&mut settings, &raw)
                .with_context(|| format!("invalid config '{}'", path.display()))?;
        }
        None => {
            if let Ok(raw) = fs::read_to_string(DEFAULT_CONFIG_FILE) {
                apply_file(&mut settings, &raw)
                    .with_context(|| format!("invalid config '{DEFAULT_CONFIG_FILE}'"))?;
            }
        }
    }

    apply_env(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file: FileSettings = toml::from_str(raw)?;

    if let Some(v) = file.api_id {
        settings.api_id = v;
    }
    if let Some(v) = file.api_hash {
        settings.api_hash = v;
    }
    if let Some(v) = file.database_dir {
        settings.database_dir = v;
    }
    if let Some(v) = file.files_dir {
        settings.files_dir = v;
    }
    if let Some(v) = file.media_root {
        settings.media_root = v;
    }
    if let Some(v) = file.log_verbosity {
        settings.log_verbosity = Some(v);
    }
    if let Some(v) = file.use_test_dc {
        settings.use_test_dc = v;
    }
    if let Some(v) = file.database_encryption_key {
        settings.database_encryption_key = v;
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("TELESAVE_API_ID") {
        if let Ok(parsed) = v.trim().parse::<i32>() {
            settings.api_id = parsed;
        }
    }
    if let Some(v) = var("TELESAVE_API_HASH") {
        settings.api_hash = v;
    }
    if let Some(v) = var("TELESAVE_DATABASE_DIR") {
        settings.database_dir = v.into();
    }
    if let Some(v) = var("TELESAVE_FILES_DIR") {
        settings.files_dir = v.into();
    }
    if let Some(v) = var("TELESAVE_MEDIA_ROOT") {
        settings.media_root = v.into();
    }
    if let Some(v) = var("TELESAVE_LOG_VERBOSITY") {
        if let Ok(parsed) = v.trim().parse::<i32>() {
            settings.log_verbosity = Some(parsed);
        }
    }
    if let Some(v) = var("TELESAVE_USE_TEST_DC") {
        match v.trim() {
            "1" | "true" => settings.use_test_dc = true,
            "0" | "false" => settings.use_test_dc = false,
            _ => {}
        }
    }
}
