use std::sync::Arc;

use shared::{domain::AuthPhase, protocol::AuthorizationState, protocol::TdFunction};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{correlator::Correlator, error::ClientError};

/// Request the machine issues on its own while handling an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFollowUp {
    CheckEncryptionKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthTransition {
    /// `None` keeps the current phase.
    pub phase: Option<AuthPhase>,
    pub follow_up: Option<AuthFollowUp>,
}

impl AuthTransition {
    fn to(phase: AuthPhase) -> Self {
        Self {
            phase: Some(phase),
            follow_up: None,
        }
    }

    fn unchanged() -> Self {
        Self {
            phase: None,
            follow_up: None,
        }
    }
}

pub fn transition(state: &AuthorizationState) -> AuthTransition {
    match state {
        AuthorizationState::WaitTdlibParameters => AuthTransition::to(AuthPhase::Unauthenticated),
        AuthorizationState::WaitEncryptionKey { .. } => AuthTransition {
            phase: None,
            follow_up: Some(AuthFollowUp::CheckEncryptionKey),
        },
        AuthorizationState::WaitPhoneNumber => {
            AuthTransition::to(AuthPhase::WaitingForPhoneNumber)
        }
        AuthorizationState::WaitCode => AuthTransition::to(AuthPhase::WaitingForCode),
        AuthorizationState::WaitPassword { .. } => {
            AuthTransition::to(AuthPhase::WaitingForPassword)
        }
        AuthorizationState::Ready => AuthTransition::to(AuthPhase::Authenticated),
        AuthorizationState::LoggingOut => AuthTransition::to(AuthPhase::Unauthenticated),
        AuthorizationState::Closing
        | AuthorizationState::Closed
        | AuthorizationState::Unsupported => AuthTransition::unchanged(),
    }
}

pub(crate) fn ensure_phase(
    operation: &'static str,
    expected: AuthPhase,
    actual: AuthPhase,
) -> Result<(), ClientError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ClientError::InvalidState {
            operation,
            expected,
            actual,
        })
    }
}

/// Sole writer of the auth phase. Lives on the dispatcher.
pub(crate) struct AuthStateMachine {
    phase: watch::Sender<AuthPhase>,
    correlator: Arc<Correlator>,
    encryption_key: String,
}

impl AuthStateMachine {
    pub(crate) fn new(
        phase: watch::Sender<AuthPhase>,
        correlator: Arc<Correlator>,
        encryption_key: String,
    ) -> Self {
        Self {
            phase,
            correlator,
            encryption_key,
        }
    }

    pub(crate) fn on_auth_update(&self, state: &AuthorizationState) {
        let step = transition(state);

        match step.phase {
            Some(next) => {
                let previous = *self.phase.borrow();
                self.phase.send_if_modified(|current| {
                    let changed = *current != next;
                    *current = next;
                    changed
                });
                info!(update = ?state, ?previous, phase = ?next, "auth phase updated");
            }
            None => match state {
                AuthorizationState::Closing | AuthorizationState::Closed => {
                    info!(update = ?state, "backend session shutting down")
                }
                AuthorizationState::Unsupported => {
                    debug!("unhandled authorization state")
                }
                _ => debug!(update = ?state, "auth phase unchanged"),
            },
        }

        if let Some(AuthFollowUp::CheckEncryptionKey) = step.follow_up {
            self.correlator
                .call_detached(TdFunction::CheckDatabaseEncryptionKey {
                    encryption_key: self.encryption_key.clone(),
                });
        }
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
