use super::*;
use crate::{
    test_support::FakeBackend,
    transport::{ResultSink, TransportConnector},
};
use shared::protocol::TdObject;

struct NullSink;

impl ResultSink for NullSink {
    fn on_push(&self, _object: TdObject) {}
}

fn machine(backend: &FakeBackend, key: &str) -> (AuthStateMachine, watch::Receiver<AuthPhase>) {
    let transport = backend.connect(Arc::new(NullSink)).expect("connect");
    let (tx, rx) = watch::channel(AuthPhase::Unknown);
    (
        AuthStateMachine::new(tx, Arc::new(Correlator::new(transport)), key.to_string()),
        rx,
    )
}

#[test]
fn transition_table_matches_sign_in_flow() {
    let cases = [
        (
            AuthorizationState::WaitTdlibParameters,
            Some(AuthPhase::Unauthenticated),
        ),
        (
            AuthorizationState::WaitEncryptionKey { is_encrypted: true },
            None,
        ),
        (
            AuthorizationState::WaitPhoneNumber,
            Some(AuthPhase::WaitingForPhoneNumber),
        ),
        (AuthorizationState::WaitCode, Some(AuthPhase::WaitingForCode)),
        (
            AuthorizationState::WaitPassword {
                password_hint: String::new(),
                has_recovery_email_address: false,
            },
            Some(AuthPhase::WaitingForPassword),
        ),
        (AuthorizationState::Ready, Some(AuthPhase::Authenticated)),
        (
            AuthorizationState::LoggingOut,
            Some(AuthPhase::Unauthenticated),
        ),
        (AuthorizationState::Closing, None),
        (AuthorizationState::Closed, None),
        (AuthorizationState::Unsupported, None),
    ];

    for (state, expected) in cases {
        assert_eq!(transition(&state).phase, expected, "state {state:?}");
    }
}

#[test]
fn only_encryption_key_request_triggers_follow_up() {
    assert_eq!(
        transition(&AuthorizationState::WaitEncryptionKey {
            is_encrypted: false
        })
        .follow_up,
        Some(AuthFollowUp::CheckEncryptionKey)
    );
    assert_eq!(transition(&AuthorizationState::WaitCode).follow_up, None);
    assert_eq!(transition(&AuthorizationState::Ready).follow_up, None);
}

#[test]
fn ensure_phase_reports_expected_and_actual() {
    assert!(ensure_phase("op", AuthPhase::Unauthenticated, AuthPhase::Unauthenticated).is_ok());
    assert_eq!(
        ensure_phase("op", AuthPhase::Unauthenticated, AuthPhase::Authenticated),
        Err(ClientError::InvalidState {
            operation: "op",
            expected: AuthPhase::Unauthenticated,
            actual: AuthPhase::Authenticated,
        })
    );
}

#[tokio::test]
async fn phase_sequence_follows_updates() {
    let backend = FakeBackend::accepting();
    let (machine, rx) = machine(&backend, "");

    let mut observed = Vec::new();
    for state in [
        AuthorizationState::WaitPhoneNumber,
        AuthorizationState::WaitCode,
        AuthorizationState::WaitPassword {
            password_hint: "hint".into(),
            has_recovery_email_address: false,
        },
        AuthorizationState::Ready,
    ] {
        machine.on_auth_update(&state);
        observed.push(*rx.borrow());
    }

    assert_eq!(
        observed,
        vec![
            AuthPhase::WaitingForPhoneNumber,
            AuthPhase::WaitingForCode,
            AuthPhase::WaitingForPassword,
            AuthPhase::Authenticated,
        ]
    );
}

#[tokio::test]
async fn closing_states_keep_the_current_phase() {
    let backend = FakeBackend::accepting();
    let (machine, rx) = machine(&backend, "");

    machine.on_auth_update(&AuthorizationState::Ready);
    machine.on_auth_update(&AuthorizationState::Closing);
    machine.on_auth_update(&AuthorizationState::Closed);
    machine.on_auth_update(&AuthorizationState::Unsupported);

    assert_eq!(*rx.borrow(), AuthPhase::Authenticated);
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn encryption_key_request_is_answered_with_configured_key() {
    let backend = FakeBackend::accepting();
    let (machine, rx) = machine(&backend, "s3cret");

    machine.on_auth_update(&AuthorizationState::WaitEncryptionKey {
        is_encrypted: true,
    });

    assert_eq!(*rx.borrow(), AuthPhase::Unknown);
    assert_eq!(
        backend.requests(),
        vec![TdFunction::CheckDatabaseEncryptionKey {
            encryption_key: "s3cret".into(),
        }]
    );
}
