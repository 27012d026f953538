//! In-process backend simulation.
//!
//! Walks the sign-in flow and serves a fixed set of files without any
//! network. Every callback and push is delivered from one task in the order
//! it was produced, matching what the native library guarantees.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::{
    domain::FileId,
    error::TdError,
    protocol::{AuthorizationState, File, LocalFile, RemoteFile, TdFunction, TdObject},
};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::transport::{ResultCallback, ResultSink, Transport, TransportConnector};

#[derive(Debug, Clone)]
pub struct LoopbackFile {
    pub path: String,
    pub size: i64,
}

#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    pub encryption_key_required: bool,
    pub expected_code: String,
    pub password: Option<String>,
    pub password_hint: String,
    pub files: HashMap<FileId, LoopbackFile>,
    /// Push every completed update twice, as the real library sometimes does.
    pub repeat_completion: bool,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            encryption_key_required: true,
            expected_code: "12345".into(),
            password: None,
            password_hint: String::new(),
            files: HashMap::new(),
            repeat_completion: false,
        }
    }
}

impl LoopbackConfig {
    pub fn with_file(mut self, file_id: FileId, path: impl Into<String>, size: i64) -> Self {
        self.files.insert(
            file_id,
            LoopbackFile {
                path: path.into(),
                size,
            },
        );
        self
    }

    pub fn with_password(mut self, password: impl Into<String>, hint: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self.password_hint = hint.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    WaitParameters,
    WaitEncryptionKey,
    WaitPhoneNumber,
    WaitCode,
    WaitPassword,
    Ready,
    Closed,
}

enum Delivery {
    Push(TdObject),
    Reply(ResultCallback, TdObject),
}

struct Session {
    stage: Stage,
    downloaded: HashSet<FileId>,
    deliveries: Option<mpsc::UnboundedSender<Delivery>>,
}

struct Shared {
    config: LoopbackConfig,
    requests: Mutex<Vec<TdFunction>>,
    session: Mutex<Session>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connector and inspection handle for the simulated backend.
#[derive(Clone)]
pub struct Loopback {
    shared: Arc<Shared>,
}

impl Loopback {
    pub fn new(config: LoopbackConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                requests: Mutex::new(Vec::new()),
                session: Mutex::new(Session {
                    stage: Stage::WaitParameters,
                    downloaded: HashSet::new(),
                    deliveries: None,
                }),
            }),
        }
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<TdFunction> {
        lock(&self.shared.requests).clone()
    }

    pub fn request_names(&self) -> Vec<&'static str> {
        lock(&self.shared.requests)
            .iter()
            .map(TdFunction::name)
            .collect()
    }

    /// Injects an unsolicited update behind everything already queued.
    pub fn push(&self, object: TdObject) {
        let session = lock(&self.shared.session);
        deliver(&session, Delivery::Push(object));
    }
}

impl TransportConnector for Loopback {
    fn connect(&self, sink: Arc<dyn ResultSink>) -> anyhow::Result<Arc<dyn Transport>> {
        let mut session = lock(&self.shared.session);
        if session.deliveries.is_some() {
            anyhow::bail!("loopback backend already has an open handle");
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                match delivery {
                    Delivery::Push(object) => sink.on_push(object),
                    Delivery::Reply(callback, object) => callback(object),
                }
            }
            debug!("loopback delivery loop stopped");
        });

        session.stage = Stage::WaitParameters;
        session.deliveries = Some(tx);
        deliver(
            &session,
            Delivery::Push(TdObject::auth_update(
                AuthorizationState::WaitTdlibParameters,
            )),
        );
        drop(session);

        Ok(Arc::new(LoopbackTransport {
            shared: Arc::clone(&self.shared),
        }))
    }
}

fn deliver(session: &Session, delivery: Delivery) {
    match (&session.deliveries, delivery) {
        (Some(tx), delivery) => {
            if let Err(mpsc::error::SendError(delivery)) = tx.send(delivery) {
                drop_delivery(delivery);
            }
        }
        (None, delivery) => drop_delivery(delivery),
    }
}

fn drop_delivery(delivery: Delivery) {
    match delivery {
        Delivery::Reply(callback, _) => callback(TdObject::Error(TdError::aborted())),
        Delivery::Push(object) => trace!(push = object.name(), "loopback closed; push dropped"),
    }
}

struct LoopbackTransport {
    shared: Arc<Shared>,
}

impl Transport for LoopbackTransport {
    fn send(&self, request: TdFunction, on_result: ResultCallback) {
        lock(&self.shared.requests).push(request.clone());

        let mut session = lock(&self.shared.session);
        let (reply, pushes) = handle(&self.shared.config, &mut session, &request);
        trace!(
            request = request.name(),
            result = reply.name(),
            pushes = pushes.len(),
            "loopback handled request"
        );
        deliver(&session, Delivery::Reply(on_result, reply));
        for push in pushes {
            deliver(&session, Delivery::Push(push));
        }
        if session.stage == Stage::Closed {
            session.deliveries = None;
        }
    }

    fn close(&self) {
        let mut session = lock(&self.shared.session);
        if session.stage != Stage::Closed {
            for state in [AuthorizationState::Closing, AuthorizationState::Closed] {
                deliver(&session, Delivery::Push(TdObject::auth_update(state)));
            }
            session.stage = Stage::Closed;
        }
        session.deliveries = None;
    }
}

fn unexpected(request: &TdFunction) -> TdObject {
    TdObject::Error(TdError::new(
        TdError::BAD_REQUEST,
        format!("Call to {} unexpected", request.name()),
    ))
}

fn rejected(message: &str) -> TdObject {
    TdObject::Error(TdError::new(TdError::BAD_REQUEST, message))
}

fn advance(session: &mut Session, stage: Stage, state: AuthorizationState) -> Vec<TdObject> {
    session.stage = stage;
    vec![TdObject::auth_update(state)]
}

fn is_valid_phone_number(phone_number: &str) -> bool {
    phone_number
        .strip_prefix('+')
        .is_some_and(|digits| digits.len() >= 7 && digits.chars().all(|c| c.is_ascii_digit()))
}

fn file_state(file_id: FileId, file: &LoopbackFile, downloaded: i64, active: bool) -> File {
    let completed = downloaded >= file.size;
    File {
        id: file_id,
        size: file.size,
        expected_size: file.size,
        local: LocalFile {
            path: if completed {
                file.path.clone()
            } else {
                String::new()
            },
            can_be_downloaded: true,
            is_downloading_active: active,
            is_downloading_completed: completed,
            downloaded_size: downloaded,
        },
        remote: RemoteFile {
            id: format!("remote-{file_id}"),
            size: file.size,
        },
    }
}

fn handle(
    config: &LoopbackConfig,
    session: &mut Session,
    request: &TdFunction,
) -> (TdObject, Vec<TdObject>) {
    if session.stage == Stage::Closed {
        return (TdObject::Error(TdError::aborted()), Vec::new());
    }

    match (session.stage, request) {
        (_, TdFunction::SetLogVerbosityLevel { .. }) => (TdObject::Ok, Vec::new()),
        (Stage::WaitParameters, TdFunction::SetTdlibParameters { .. }) => {
            let pushes = if config.encryption_key_required {
                advance(
                    session,
                    Stage::WaitEncryptionKey,
                    AuthorizationState::WaitEncryptionKey {
                        is_encrypted: false,
                    },
                )
            } else {
                advance(
                    session,
                    Stage::WaitPhoneNumber,
                    AuthorizationState::WaitPhoneNumber,
                )
            };
            (TdObject::Ok, pushes)
        }
        (Stage::WaitEncryptionKey, TdFunction::CheckDatabaseEncryptionKey { .. }) => (
            TdObject::Ok,
            advance(
                session,
                Stage::WaitPhoneNumber,
                AuthorizationState::WaitPhoneNumber,
            ),
        ),
        (
            Stage::WaitPhoneNumber,
            TdFunction::SetAuthenticationPhoneNumber { phone_number, .. },
        ) => {
            if !is_valid_phone_number(phone_number) {
                return (rejected("PHONE_NUMBER_INVALID"), Vec::new());
            }
            (
                TdObject::Ok,
                advance(session, Stage::WaitCode, AuthorizationState::WaitCode),
            )
        }
        (Stage::WaitCode, TdFunction::CheckAuthenticationCode { code }) => {
            if *code != config.expected_code {
                return (rejected("PHONE_CODE_INVALID"), Vec::new());
            }
            let pushes = if config.password.is_some() {
                advance(
                    session,
                    Stage::WaitPassword,
                    AuthorizationState::WaitPassword {
                        password_hint: config.password_hint.clone(),
                        has_recovery_email_address: false,
                    },
                )
            } else {
                advance(session, Stage::Ready, AuthorizationState::Ready)
            };
            (TdObject::Ok, pushes)
        }
        (Stage::WaitPassword, TdFunction::CheckAuthenticationPassword { password }) => {
            if config.password.as_deref() != Some(password.as_str()) {
                return (rejected("PASSWORD_HASH_INVALID"), Vec::new());
            }
            (
                TdObject::Ok,
                advance(session, Stage::Ready, AuthorizationState::Ready),
            )
        }
        (Stage::Ready, TdFunction::DownloadFile { file_id, .. }) => {
            let Some(file) = config.files.get(file_id) else {
                return (rejected("Invalid file identifier"), Vec::new());
            };
            let mut pushes = vec![
                TdObject::file_update(file_state(*file_id, file, file.size / 2, true)),
                TdObject::file_update(file_state(*file_id, file, file.size, false)),
            ];
            if config.repeat_completion {
                pushes.push(TdObject::file_update(file_state(
                    *file_id, file, file.size, false,
                )));
            }
            session.downloaded.insert(*file_id);
            (
                TdObject::File(file_state(*file_id, file, 0, true)),
                pushes,
            )
        }
        (Stage::Ready, TdFunction::GetFile { file_id }) => match config.files.get(file_id) {
            Some(file) => {
                let downloaded = if session.downloaded.contains(file_id) {
                    file.size
                } else {
                    0
                };
                (
                    TdObject::File(file_state(*file_id, file, downloaded, false)),
                    Vec::new(),
                )
            }
            None => (
                TdObject::Error(TdError::new(TdError::NOT_FOUND, "Not Found")),
                Vec::new(),
            ),
        },
        (_, TdFunction::DownloadFile { .. } | TdFunction::GetFile { .. }) => (
            TdObject::Error(TdError::new(TdError::UNAUTHORIZED, "Unauthorized")),
            Vec::new(),
        ),
        (_, TdFunction::LogOut) => {
            session.stage = Stage::Closed;
            (
                TdObject::Ok,
                [
                    AuthorizationState::LoggingOut,
                    AuthorizationState::Closing,
                    AuthorizationState::Closed,
                ]
                .into_iter()
                .map(TdObject::auth_update)
                .collect(),
            )
        }
        (_, TdFunction::Close) => {
            session.stage = Stage::Closed;
            (
                TdObject::Ok,
                [AuthorizationState::Closing, AuthorizationState::Closed]
                    .into_iter()
                    .map(TdObject::auth_update)
                    .collect(),
            )
        }
        _ => (unexpected(request), Vec::new()),
    }
}

#[cfg(test)]
#[path = "tests/loopback_tests.rs"]
mod tests;
