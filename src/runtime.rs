//! Session orchestration
//!
//! Sessions are held by callers and sent back with every turn. Each turn
//! runs on its own [`TurnRuntime`](executor::TurnRuntime) driven by the pure
//! state machine; the orchestrator only owns the shared services and a lock
//! per session id while a turn is in flight.

mod executor;

#[cfg(test)]
pub mod testing;

use crate::conversation::{
    ConversationError, ConversationTemplate, DisplayPair, Session, TemplateRegistry,
};
use crate::exchange_log::{
    ExchangeLogError, ExchangeLogger, ExchangeRecord, ExchangeStore, VoteKind,
};
use crate::state_machine::{TransitionError, TurnPhase};
use crate::translate::{TextTransformPipeline, Translator};
use crate::worker::{
    ControllerClient, HttpWorkerClient, LocatorError, StreamingRelay, WorkerClient, WorkerLocator,
};
use executor::TurnRuntime;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, OwnedMutexGuard};

/// Orchestrator wired to the real controller, workers and log files
pub type ProductionOrchestrator =
    SessionOrchestrator<ControllerClient, HttpWorkerClient, dyn Translator, ExchangeLogger>;

const REPLY_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid session: {0}")]
    InvalidSession(ConversationError),
    #[error("Session {0} already has a generation in flight")]
    SessionBusy(String),
    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Controller error: {0}")]
    Locator(#[from] LocatorError),
    #[error(transparent)]
    ExchangeLog(#[from] ExchangeLogError),
}

/// One user turn against a model
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub model: String,
    /// Session from a previous reply; a fresh one is created when absent
    pub session: Option<Session>,
    pub text: String,
    pub temperature: f32,
    pub max_new_tokens: u32,
}

/// Session state handed back to the caller
#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub model: String,
    pub session: Session,
    pub phase: TurnPhase,
    pub display: Vec<DisplayPair>,
    /// Degraded-quality messages (translation fallback, log write failure)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<String>,
}

/// A validated turn holding its session lock
struct PreparedTurn {
    request: TurnRequest,
    session: Session,
    template: Arc<ConversationTemplate>,
    guard: OwnedMutexGuard<()>,
}

/// Per-session locks, dropped once no turn holds them
#[derive(Default)]
struct SessionLocks {
    locks: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    /// Lock `session_id` without waiting; `None` if a turn already holds it
    fn try_acquire(&self, session_id: &str) -> Option<OwnedMutexGuard<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| lock.strong_count() > 0);

        let lock = if let Some(lock) = locks.get(session_id).and_then(Weak::upgrade) {
            lock
        } else {
            let lock = Arc::new(tokio::sync::Mutex::new(()));
            locks.insert(session_id.to_string(), Arc::downgrade(&lock));
            lock
        };
        lock.try_lock_owned().ok()
    }

    /// Point `session_id` at the lock `guard` holds, so the id is busy for
    /// as long as the guard lives
    fn alias(&self, guard: &OwnedMutexGuard<()>, session_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.insert(
            session_id.to_string(),
            Arc::downgrade(OwnedMutexGuard::mutex(guard)),
        );
    }
}

pub struct SessionOrchestrator<L, W, T: ?Sized, X> {
    templates: Arc<TemplateRegistry>,
    locator: Arc<L>,
    relay: StreamingRelay<W>,
    pipeline: TextTransformPipeline<T>,
    exchange_log: Arc<X>,
    locks: SessionLocks,
}

impl<L, W, T, X> SessionOrchestrator<L, W, T, X>
where
    L: WorkerLocator + 'static,
    W: WorkerClient + 'static,
    T: Translator + ?Sized + 'static,
    X: ExchangeStore + 'static,
{
    pub fn new(
        templates: Arc<TemplateRegistry>,
        locator: Arc<L>,
        worker_client: Arc<W>,
        translator: Arc<T>,
        exchange_log: Arc<X>,
        pacing: Duration,
    ) -> Self {
        Self {
            templates,
            locator,
            relay: StreamingRelay::new(worker_client, pacing),
            pipeline: TextTransformPipeline::new(translator),
            exchange_log,
            locks: SessionLocks::default(),
        }
    }

    /// Empty session from the default template
    pub fn new_session(&self) -> Session {
        self.templates.new_session()
    }

    /// Models currently served, in display order
    pub async fn list_models(&self) -> Result<Vec<String>, OrchestratorError> {
        Ok(self.locator.list_models().await?)
    }

    /// Run a whole turn and return the final state
    pub async fn generate(
        &self,
        request: TurnRequest,
        client_ip: &str,
    ) -> Result<TurnReply, OrchestratorError> {
        let turn = self.prepare(request)?;
        TurnRuntime::new(self, turn, client_ip, None).run().await
    }

    /// Run a turn in the background, publishing every state change.
    ///
    /// Dropping the receiver cancels the turn and its relay.
    pub fn generate_stream(
        self: &Arc<Self>,
        request: TurnRequest,
        client_ip: String,
    ) -> Result<mpsc::Receiver<TurnReply>, OrchestratorError> {
        let turn = self.prepare(request)?;
        let (tx, rx) = mpsc::channel(REPLY_CHANNEL_CAPACITY);
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let runtime = TurnRuntime::new(&orchestrator, turn, &client_ip, Some(tx));
            if let Err(e) = runtime.run().await {
                tracing::error!(error = %e, "Streaming turn failed");
            }
        });
        Ok(rx)
    }

    /// Append a feedback vote on `session` to the exchange log
    pub async fn record_vote(
        &self,
        kind: VoteKind,
        model: &str,
        comments: Option<String>,
        session: &Session,
        client_ip: &str,
    ) -> Result<(), OrchestratorError> {
        let template = self.validated_template(session)?;
        let record = ExchangeRecord::vote(kind, model, comments, session.snapshot(&template), client_ip);
        self.exchange_log.append(&record).await?;
        tracing::info!(session_id = %session.session_id, model = %model, kind = ?kind, "Recorded vote");
        Ok(())
    }

    fn validated_template(
        &self,
        session: &Session,
    ) -> Result<Arc<ConversationTemplate>, OrchestratorError> {
        let template = self
            .templates
            .get(&session.template_id)
            .map_err(OrchestratorError::InvalidSession)?;
        session
            .validate(&template)
            .map_err(OrchestratorError::InvalidSession)?;
        Ok(template)
    }

    fn prepare(&self, mut request: TurnRequest) -> Result<PreparedTurn, OrchestratorError> {
        if !(0.0..=1.0).contains(&request.temperature) {
            return Err(OrchestratorError::InvalidRequest(format!(
                "temperature must be within [0, 1], got {}",
                request.temperature
            )));
        }
        if request.max_new_tokens == 0 {
            return Err(OrchestratorError::InvalidRequest(
                "max_new_tokens must be positive".to_string(),
            ));
        }

        let session = request
            .session
            .take()
            .unwrap_or_else(|| self.templates.new_session());
        let template = self.validated_template(&session)?;
        session
            .ensure_accepts_input()
            .map_err(OrchestratorError::InvalidSession)?;

        let guard = self
            .locks
            .try_acquire(&session.session_id)
            .ok_or_else(|| OrchestratorError::SessionBusy(session.session_id.clone()))?;

        Ok(PreparedTurn {
            request,
            session,
            template,
            guard,
        })
    }
}
