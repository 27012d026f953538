use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident, $inner:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_newtype!(FileId, i32);

/// The adapter's view of sign-in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    #[default]
    Unknown,
    Unauthenticated,
    WaitingForPhoneNumber,
    WaitingForCode,
    WaitingForPassword,
    Authenticated,
}

impl AuthPhase {
    pub fn is_authenticated(self) -> bool {
        self == AuthPhase::Authenticated
    }
}

/// A file whose bytes are fully available on local disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadCompletion {
    pub file_id: FileId,
    pub local_path: String,
}

impl DownloadCompletion {
    pub fn new(file_id: FileId, local_path: impl Into<String>) -> Self {
        Self {
            file_id,
            local_path: local_path.into(),
        }
    }
}
