//! Requests and objects exchanged with the backend client library.
//!
//! Tags and field names follow the library's JSON interface: every value
//! carries an `@type` tag and snake_case fields, so the same types decode
//! received JSON text and describe requests handed to a native binding.

use serde::{Deserialize, Serialize};

use crate::{domain::FileId, error::TdError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TdlibParameters {
    pub use_test_dc: bool,
    pub database_directory: String,
    pub files_directory: String,
    pub use_file_database: bool,
    pub use_chat_info_database: bool,
    pub use_message_database: bool,
    pub use_secret_chats: bool,
    pub api_id: i32,
    pub api_hash: String,
    pub system_language_code: String,
    pub device_model: String,
    pub system_version: String,
    pub application_version: String,
    pub enable_storage_optimizer: bool,
    pub ignore_file_names: bool,
}

impl Default for TdlibParameters {
    fn default() -> Self {
        Self {
            use_test_dc: false,
            database_directory: "./data/tdlib".into(),
            files_directory: "./data/files".into(),
            use_file_database: true,
            use_chat_info_database: true,
            use_message_database: true,
            use_secret_chats: false,
            api_id: 0,
            api_hash: String::new(),
            system_language_code: "en".into(),
            device_model: "Desktop".into(),
            system_version: String::new(),
            application_version: env!("CARGO_PKG_VERSION").into(),
            enable_storage_optimizer: true,
            ignore_file_names: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhoneNumberAuthenticationSettings {
    pub allow_flash_call: bool,
    pub is_current_phone_number: bool,
    pub allow_sms_retriever_api: bool,
}

/// Requests accepted by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum TdFunction {
    SetLogVerbosityLevel {
        new_verbosity_level: i32,
    },
    SetTdlibParameters {
        parameters: TdlibParameters,
    },
    CheckDatabaseEncryptionKey {
        encryption_key: String,
    },
    SetAuthenticationPhoneNumber {
        phone_number: String,
        settings: PhoneNumberAuthenticationSettings,
    },
    CheckAuthenticationCode {
        code: String,
    },
    CheckAuthenticationPassword {
        password: String,
    },
    DownloadFile {
        file_id: FileId,
        priority: i32,
        offset: i64,
        limit: i64,
        synchronous: bool,
    },
    GetFile {
        file_id: FileId,
    },
    LogOut,
    Close,
}

impl TdFunction {
    /// Wire tag, safe to log: never includes request arguments.
    pub fn name(&self) -> &'static str {
        match self {
            TdFunction::SetLogVerbosityLevel { .. } => "setLogVerbosityLevel",
            TdFunction::SetTdlibParameters { .. } => "setTdlibParameters",
            TdFunction::CheckDatabaseEncryptionKey { .. } => "checkDatabaseEncryptionKey",
            TdFunction::SetAuthenticationPhoneNumber { .. } => "setAuthenticationPhoneNumber",
            TdFunction::CheckAuthenticationCode { .. } => "checkAuthenticationCode",
            TdFunction::CheckAuthenticationPassword { .. } => "checkAuthenticationPassword",
            TdFunction::DownloadFile { .. } => "downloadFile",
            TdFunction::GetFile { .. } => "getFile",
            TdFunction::LogOut => "logOut",
            TdFunction::Close => "close",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalFile {
    pub path: String,
    pub can_be_downloaded: bool,
    pub is_downloading_active: bool,
    pub is_downloading_completed: bool,
    pub downloaded_size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteFile {
    pub id: String,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub id: FileId,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub expected_size: i64,
    #[serde(default)]
    pub local: LocalFile,
    #[serde(default)]
    pub remote: RemoteFile,
}

impl File {
    pub fn new(id: FileId) -> Self {
        Self {
            id,
            size: 0,
            expected_size: 0,
            local: LocalFile::default(),
            remote: RemoteFile::default(),
        }
    }

    /// Completed with a usable local path.
    pub fn completed_path(&self) -> Option<&str> {
        (self.local.is_downloading_completed && !self.local.path.is_empty())
            .then_some(self.local.path.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum AuthorizationState {
    #[serde(rename = "authorizationStateWaitTdlibParameters")]
    WaitTdlibParameters,
    #[serde(rename = "authorizationStateWaitEncryptionKey")]
    WaitEncryptionKey {
        #[serde(default)]
        is_encrypted: bool,
    },
    #[serde(rename = "authorizationStateWaitPhoneNumber")]
    WaitPhoneNumber,
    #[serde(rename = "authorizationStateWaitCode")]
    WaitCode,
    #[serde(rename = "authorizationStateWaitPassword")]
    WaitPassword {
        #[serde(default)]
        password_hint: String,
        #[serde(default)]
        has_recovery_email_address: bool,
    },
    #[serde(rename = "authorizationStateReady")]
    Ready,
    #[serde(rename = "authorizationStateLoggingOut")]
    LoggingOut,
    #[serde(rename = "authorizationStateClosing")]
    Closing,
    #[serde(rename = "authorizationStateClosed")]
    Closed,
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum OptionValue {
    OptionValueBoolean { value: bool },
    OptionValueEmpty,
    // 64-bit integers arrive as JSON strings.
    OptionValueInteger { value: serde_json::Value },
    OptionValueString { value: String },
}

/// Everything the transport can deliver: call results and pushes alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum TdObject {
    Ok,
    Error(TdError),
    File(File),
    UpdateAuthorizationState {
        authorization_state: AuthorizationState,
    },
    UpdateFile {
        file: File,
    },
    UpdateOption {
        name: String,
        value: OptionValue,
    },
    #[serde(other)]
    Unsupported,
}

impl TdObject {
    pub fn name(&self) -> &'static str {
        match self {
            TdObject::Ok => "ok",
            TdObject::Error(_) => "error",
            TdObject::File(_) => "file",
            TdObject::UpdateAuthorizationState { .. } => "updateAuthorizationState",
            TdObject::UpdateFile { .. } => "updateFile",
            TdObject::UpdateOption { .. } => "updateOption",
            TdObject::Unsupported => "unsupported",
        }
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn auth_update(state: AuthorizationState) -> Self {
        TdObject::UpdateAuthorizationState {
            authorization_state: state,
        }
    }

    pub fn file_update(file: File) -> Self {
        TdObject::UpdateFile { file }
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
