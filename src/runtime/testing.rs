//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::SessionOrchestrator;
use crate::conversation::TemplateRegistry;
use crate::exchange_log::{ExchangeLogError, ExchangeRecord, ExchangeStore};
use crate::translate::{TranslateError, Translator, ENGLISH};
use crate::worker::{
    FrameStream, GenerateParams, LocatorError, RelayError, WorkerClient, WorkerFrame,
    WorkerLocator,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Stub HTTP servers
// ============================================================================

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_stub_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// ============================================================================
// Mock Worker Locator
// ============================================================================

/// Controller stand-in with a fixed model → worker table
#[derive(Default)]
pub struct MockWorkerLocator {
    workers: Mutex<HashMap<String, String>>,
    models: Mutex<Vec<String>>,
    fail: bool,
    lookups: Mutex<Vec<String>>,
}

impl MockWorkerLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(self, models: &[&str]) -> Self {
        *self.models.lock().unwrap() = models.iter().map(ToString::to_string).collect();
        self
    }

    /// Every call fails as if the controller were down
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn add_worker(&self, model: &str, address: &str) {
        self.workers
            .lock()
            .unwrap()
            .insert(model.to_string(), address.to_string());
    }

    /// Models that were resolved, in order
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerLocator for MockWorkerLocator {
    async fn resolve(&self, model_id: &str) -> Result<String, LocatorError> {
        self.lookups.lock().unwrap().push(model_id.to_string());
        if self.fail {
            return Err(LocatorError::Transport("controller unreachable".to_string()));
        }
        Ok(self
            .workers
            .lock()
            .unwrap()
            .get(model_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_models(&self) -> Result<Vec<String>, LocatorError> {
        if self.fail {
            return Err(LocatorError::Transport("controller unreachable".to_string()));
        }
        Ok(self.models.lock().unwrap().clone())
    }
}

// ============================================================================
// Mock Worker Client
// ============================================================================

enum ScriptedStream {
    Frames(Vec<Result<WorkerFrame, RelayError>>),
    /// The same frame forever
    Endless(String),
    /// Some frames, then silence without closing
    Stalled(Vec<Result<WorkerFrame, RelayError>>),
    ConnectError(RelayError),
}

/// Worker stand-in replaying queued streams and unary replies
#[derive(Default)]
pub struct MockWorkerClient {
    streams: Mutex<VecDeque<ScriptedStream>>,
    unary: Mutex<VecDeque<Result<WorkerFrame, RelayError>>>,
    requests: Mutex<Vec<(String, GenerateParams)>>,
}

impl MockWorkerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_frames(&self, frames: Vec<Result<WorkerFrame, RelayError>>) {
        self.push_stream(ScriptedStream::Frames(frames));
    }

    pub fn queue_endless_frames(&self, text: &str) {
        self.push_stream(ScriptedStream::Endless(text.to_string()));
    }

    pub fn queue_stalled_frames(&self, frames: Vec<Result<WorkerFrame, RelayError>>) {
        self.push_stream(ScriptedStream::Stalled(frames));
    }

    pub fn fail_next_connect(&self, error: RelayError) {
        self.push_stream(ScriptedStream::ConnectError(error));
    }

    pub fn queue_unary(&self, reply: Result<WorkerFrame, RelayError>) {
        self.unary.lock().unwrap().push_back(reply);
    }

    /// Every (worker, params) pair sent, unary and streaming alike
    pub fn recorded_requests(&self) -> Vec<(String, GenerateParams)> {
        self.requests.lock().unwrap().clone()
    }

    fn push_stream(&self, script: ScriptedStream) {
        self.streams.lock().unwrap().push_back(script);
    }

    fn record(&self, worker: &str, params: &GenerateParams) {
        self.requests
            .lock()
            .unwrap()
            .push((worker.to_string(), params.clone()));
    }
}

#[async_trait]
impl WorkerClient for MockWorkerClient {
    async fn generate(
        &self,
        worker: &str,
        params: &GenerateParams,
    ) -> Result<WorkerFrame, RelayError> {
        self.record(worker, params);
        self.unary
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RelayError::Connect("No mock reply queued".to_string())))
    }

    async fn generate_stream(
        &self,
        worker: &str,
        params: &GenerateParams,
    ) -> Result<FrameStream, RelayError> {
        self.record(worker, params);
        let script = self.streams.lock().unwrap().pop_front();
        match script {
            Some(ScriptedStream::Frames(frames)) => Ok(stream::iter(frames).boxed()),
            Some(ScriptedStream::Endless(text)) => {
                Ok(stream::repeat_with(move || Ok(WorkerFrame::ok(text.clone()))).boxed())
            }
            Some(ScriptedStream::Stalled(frames)) => {
                Ok(stream::iter(frames).chain(stream::pending()).boxed())
            }
            Some(ScriptedStream::ConnectError(error)) => Err(error),
            None => Err(RelayError::Connect("No mock stream queued".to_string())),
        }
    }
}

// ============================================================================
// Mock Translator
// ============================================================================

/// Translator with canned detections and translations.
///
/// Unknown text is detected as English; unknown translations come back
/// tagged with the target language.
#[derive(Default)]
pub struct MockTranslator {
    languages: HashMap<String, String>,
    translations: HashMap<(String, String), String>,
    fail: bool,
    translation_calls: Mutex<usize>,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, text: &str, language: &str) -> Self {
        self.languages.insert(text.to_string(), language.to_string());
        self
    }

    pub fn with_translation(mut self, text: &str, target: &str, result: &str) -> Self {
        self.translations
            .insert((text.to_string(), target.to_string()), result.to_string());
        self
    }

    /// Every call fails as if the service were down
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Number of translate calls made (detection not included)
    pub fn translation_calls(&self) -> usize {
        *self.translation_calls.lock().unwrap()
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn detect(&self, text: &str) -> Result<String, TranslateError> {
        if self.fail {
            return Err(TranslateError::Transport("translator unreachable".to_string()));
        }
        Ok(self
            .languages
            .get(text)
            .cloned()
            .unwrap_or_else(|| ENGLISH.to_string()))
    }

    async fn translate(
        &self,
        text: &str,
        _source: &str,
        target: &str,
    ) -> Result<String, TranslateError> {
        *self.translation_calls.lock().unwrap() += 1;
        if self.fail {
            return Err(TranslateError::Transport("translator unreachable".to_string()));
        }
        Ok(self
            .translations
            .get(&(text.to_string(), target.to_string()))
            .cloned()
            .unwrap_or_else(|| format!("[{target}] {text}")))
    }
}

// ============================================================================
// Mock Exchange Store
// ============================================================================

/// In-memory exchange log
#[derive(Default)]
pub struct MockExchangeStore {
    records: Mutex<Vec<ExchangeRecord>>,
    fail: bool,
}

impl MockExchangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every append fails as if the disk were full
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn records(&self) -> Vec<ExchangeRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeStore for MockExchangeStore {
    async fn append(&self, record: &ExchangeRecord) -> Result<(), ExchangeLogError> {
        if self.fail {
            return Err(ExchangeLogError::Io(std::io::Error::other("disk full")));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ============================================================================
// Orchestrator harness
// ============================================================================

pub type TestOrchestrator =
    SessionOrchestrator<MockWorkerLocator, MockWorkerClient, MockTranslator, MockExchangeStore>;

/// An orchestrator wired to mocks the test can still reach
pub struct Harness {
    pub locator: Arc<MockWorkerLocator>,
    pub client: Arc<MockWorkerClient>,
    pub translator: Arc<MockTranslator>,
    pub store: Arc<MockExchangeStore>,
    pub orchestrator: Arc<TestOrchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(
            Arc::new(MockWorkerLocator::new()),
            Arc::new(MockTranslator::new()),
            Arc::new(MockExchangeStore::new()),
        )
    }

    pub fn with_locator(self, locator: MockWorkerLocator) -> Self {
        Self::build(Arc::new(locator), self.translator, self.store)
    }

    pub fn with_translator(self, translator: MockTranslator) -> Self {
        Self::build(self.locator, Arc::new(translator), self.store)
    }

    pub fn with_store(self, store: MockExchangeStore) -> Self {
        Self::build(self.locator, self.translator, Arc::new(store))
    }

    pub fn locator_has_worker(&self, model: &str, address: &str) {
        self.locator.add_worker(model, address);
    }

    fn build(
        locator: Arc<MockWorkerLocator>,
        translator: Arc<MockTranslator>,
        store: Arc<MockExchangeStore>,
    ) -> Self {
        let client = Arc::new(MockWorkerClient::new());
        let orchestrator = Arc::new(SessionOrchestrator::new(
            Arc::new(TemplateRegistry::builtin()),
            locator.clone(),
            client.clone(),
            translator.clone(),
            store.clone(),
            Duration::from_millis(1),
        ));
        Self {
            locator,
            client,
            translator,
            store,
            orchestrator,
        }
    }
}
