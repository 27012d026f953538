use serde::Deserialize;
use shared::protocol::TdlibParameters;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub parameters: TdlibParameters,
    /// Sent as `setLogVerbosityLevel` when the client starts; `None` skips it.
    pub log_verbosity: Option<i32>,
    pub download_priority: i32,
    pub database_encryption_key: String,
    pub completion_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            parameters: TdlibParameters::default(),
            log_verbosity: Some(1),
            download_priority: 1,
            database_encryption_key: String::new(),
            completion_capacity: 64,
        }
    }
}
