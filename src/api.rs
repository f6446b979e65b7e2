//! HTTP API for the chat relay

mod handlers;
mod stream;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::conversation::Session;
use crate::exchange_log::{ExchangeStore, VoteKind};
use crate::runtime::{OrchestratorError, SessionOrchestrator, TurnReply, TurnRequest};
use crate::translate::Translator;
use crate::worker::{WorkerClient, WorkerLocator};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What the handlers need from the orchestrator
#[async_trait]
pub trait ChatService: Send + Sync {
    fn new_session(&self) -> Session;

    async fn list_models(&self) -> Result<Vec<String>, OrchestratorError>;

    async fn generate(
        &self,
        request: TurnRequest,
        client_ip: &str,
    ) -> Result<TurnReply, OrchestratorError>;

    fn generate_stream(
        self: Arc<Self>,
        request: TurnRequest,
        client_ip: String,
    ) -> Result<mpsc::Receiver<TurnReply>, OrchestratorError>;

    async fn record_vote(
        &self,
        kind: VoteKind,
        model: &str,
        comments: Option<String>,
        session: &Session,
        client_ip: &str,
    ) -> Result<(), OrchestratorError>;
}

#[async_trait]
impl<L, W, T, X> ChatService for SessionOrchestrator<L, W, T, X>
where
    L: WorkerLocator + 'static,
    W: WorkerClient + 'static,
    T: Translator + ?Sized + 'static,
    X: ExchangeStore + 'static,
{
    fn new_session(&self) -> Session {
        SessionOrchestrator::new_session(self)
    }

    async fn list_models(&self) -> Result<Vec<String>, OrchestratorError> {
        SessionOrchestrator::list_models(self).await
    }

    async fn generate(
        &self,
        request: TurnRequest,
        client_ip: &str,
    ) -> Result<TurnReply, OrchestratorError> {
        SessionOrchestrator::generate(self, request, client_ip).await
    }

    fn generate_stream(
        self: Arc<Self>,
        request: TurnRequest,
        client_ip: String,
    ) -> Result<mpsc::Receiver<TurnReply>, OrchestratorError> {
        SessionOrchestrator::generate_stream(&self, request, client_ip)
    }

    async fn record_vote(
        &self,
        kind: VoteKind,
        model: &str,
        comments: Option<String>,
        session: &Session,
        client_ip: &str,
    ) -> Result<(), OrchestratorError> {
        SessionOrchestrator::record_vote(self, kind, model, comments, session, client_ip).await
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<dyn ChatService>,
}

impl AppState {
    pub fn new(chat: Arc<dyn ChatService>) -> Self {
        Self { chat }
    }
}
