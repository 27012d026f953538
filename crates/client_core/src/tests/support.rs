//! Recording transport for unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use shared::{
    domain::FileId,
    protocol::{AuthorizationState, File, TdFunction, TdObject},
};

use crate::{
    transport::{ResultCallback, ResultSink, Transport, TransportConnector},
    ClientConfig,
};

pub(crate) const WAIT: Duration = Duration::from_secs(2);

type Responder = Box<dyn Fn(&TdFunction) -> Option<TdObject> + Send + Sync>;

struct FakeInner {
    sink: Mutex<Option<Arc<dyn ResultSink>>>,
    requests: Mutex<Vec<TdFunction>>,
    held: Mutex<VecDeque<(TdFunction, ResultCallback)>>,
    responder: Responder,
    closed: AtomicBool,
}

/// Answers requests inline through `responder`; requests it returns `None`
/// for are held until the test resolves them.
#[derive(Clone)]
pub(crate) struct FakeBackend {
    inner: Arc<FakeInner>,
}

impl FakeBackend {
    pub(crate) fn new(
        responder: impl Fn(&TdFunction) -> Option<TdObject> + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(FakeInner {
                sink: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
                held: Mutex::new(VecDeque::new()),
                responder: Box::new(responder),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// `File` for downloads, `ok` for everything else.
    pub(crate) fn accepting() -> Self {
        Self::new(|request| match request {
            TdFunction::DownloadFile { file_id, .. } | TdFunction::GetFile { file_id } => {
                Some(TdObject::File(File::new(*file_id)))
            }
            _ => Some(TdObject::Ok),
        })
    }

    pub(crate) fn holding() -> Self {
        Self::new(|_| None)
    }

    pub(crate) fn push(&self, object: TdObject) {
        let sink = self.inner.sink.lock().expect("sink lock").clone();
        sink.expect("client connected").on_push(object);
    }

    pub(crate) fn push_auth(&self, state: AuthorizationState) {
        self.push(TdObject::auth_update(state));
    }

    pub(crate) fn requests(&self) -> Vec<TdFunction> {
        self.inner.requests.lock().expect("requests lock").clone()
    }

    pub(crate) fn count(&self, name: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.name() == name)
            .count()
    }

    pub(crate) fn held(&self) -> usize {
        self.inner.held.lock().expect("held lock").len()
    }

    /// Answers the oldest held request.
    pub(crate) fn resolve_next(&self, object: TdObject) {
        let (_, callback) = self
            .inner
            .held
            .lock()
            .expect("held lock")
            .pop_front()
            .expect("a held request");
        callback(object);
    }

    /// Drops every held callback without invoking it.
    pub(crate) fn forget_held(&self) {
        self.inner.held.lock().expect("held lock").clear();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

struct FakeTransport {
    inner: Arc<FakeInner>,
}

impl Transport for FakeTransport {
    fn send(&self, request: TdFunction, on_result: ResultCallback) {
        self.inner
            .requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        match (self.inner.responder)(&request) {
            Some(object) => on_result(object),
            None => self
                .inner
                .held
                .lock()
                .expect("held lock")
                .push_back((request, on_result)),
        }
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}

impl TransportConnector for FakeBackend {
    fn connect(&self, sink: Arc<dyn ResultSink>) -> anyhow::Result<Arc<dyn Transport>> {
        *self.inner.sink.lock().expect("sink lock") = Some(sink);
        Ok(Arc::new(FakeTransport {
            inner: Arc::clone(&self.inner),
        }))
    }
}

pub(crate) fn test_config() -> ClientConfig {
    ClientConfig {
        log_verbosity: None,
        ..ClientConfig::default()
    }
}

pub(crate) fn completed_file(id: i32, path: &str) -> File {
    let mut file = File::new(FileId(id));
    file.local.path = path.to_string();
    file.local.is_downloading_completed = true;
    file.local.can_be_downloaded = true;
    file
}

pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
