use std::sync::Arc;

use super::*;
use crate::{
    correlator::Correlator,
    downloads::CompletionBroadcast,
    test_support::{completed_file, FakeBackend},
    transport::TransportConnector,
};
use shared::{
    domain::{AuthPhase, DownloadCompletion},
    protocol::OptionValue,
};
use tokio::sync::watch;

fn router() -> (
    mpsc::UnboundedSender<Dispatch>,
    Router,
    mpsc::UnboundedReceiver<Dispatch>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let router = Router::new(tx.downgrade());
    (tx, router, rx)
}

#[test]
fn classifies_auth_and_file_updates() {
    let (_tx, router, mut rx) = router();

    router.on_push(TdObject::auth_update(AuthorizationState::WaitCode));
    router.on_push(TdObject::file_update(completed_file(7, "/x/7.jpg")));

    assert!(matches!(
        rx.try_recv(),
        Ok(Dispatch::AuthUpdate(AuthorizationState::WaitCode))
    ));
    assert!(matches!(
        rx.try_recv(),
        Ok(Dispatch::FileUpdate(file)) if file.id == FileId(7)
    ));
}

#[test]
fn options_and_unrecognized_pushes_are_dropped() {
    let (_tx, router, mut rx) = router();

    router.on_push(TdObject::UpdateOption {
        name: "version".into(),
        value: OptionValue::OptionValueString {
            value: "1.8.0".into(),
        },
    });
    router.on_push(TdObject::Unsupported);
    router.on_push(TdObject::Ok);

    assert!(rx.try_recv().is_err());
}

#[test]
fn pushes_after_dispatcher_stopped_do_not_panic() {
    let (_tx, router, rx) = router();
    drop(rx);

    router.on_push(TdObject::auth_update(AuthorizationState::Ready));
}

#[test]
fn router_does_not_keep_the_dispatcher_alive() {
    let (tx, router, mut rx) = router();
    drop(tx);

    router.on_push(TdObject::auth_update(AuthorizationState::Ready));

    assert!(matches!(
        rx.try_recv(),
        Err(mpsc::error::TryRecvError::Disconnected)
    ));
}

#[tokio::test]
async fn dispatcher_applies_updates_in_arrival_order() {
    let backend = FakeBackend::accepting();
    let (sink_tx, _sink_rx) = mpsc::unbounded_channel();
    let transport = backend
        .connect(Arc::new(Router::new(sink_tx.downgrade())))
        .expect("connect");
    let correlator = Arc::new(Correlator::new(transport));

    let (phase_tx, phase_rx) = watch::channel(AuthPhase::Unknown);
    let completions = CompletionBroadcast::new(8);
    let mut completed = completions.subscribe();

    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::new(
        rx,
        AuthStateMachine::new(phase_tx, correlator, String::new()),
        DownloadTracker::new(completions),
    );

    let file = completed_file(7, "/x/7.jpg");
    for dispatch in [
        Dispatch::AuthUpdate(AuthorizationState::Ready),
        Dispatch::FileUpdate(file.clone()),
        Dispatch::FileUpdate(file.clone()),
        Dispatch::DownloadRequested(FileId(7)),
        Dispatch::FileUpdate(file),
    ] {
        tx.send(dispatch).expect("queued");
    }
    drop(tx);

    dispatcher.run().await;

    assert_eq!(*phase_rx.borrow(), AuthPhase::Authenticated);
    let expected = DownloadCompletion::new(FileId(7), "/x/7.jpg");
    assert_eq!(completed.try_recv().expect("first"), expected);
    assert_eq!(completed.try_recv().expect("second"), expected);
    assert!(completed.try_recv().is_err());
}
