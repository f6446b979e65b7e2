//! Turn executor
//!
//! Drives one turn through the state machine, executing effects against the
//! orchestrator's services and feeding their results back in as events.

use super::{OrchestratorError, PreparedTurn, SessionOrchestrator, TurnReply};
use crate::conversation::{ConversationTemplate, Session};
use crate::exchange_log::{unix_seconds, ExchangeRecord, ExchangeStore};
use crate::state_machine::{transition, AbortReason, Effect, Event, TurnContext, TurnPhase};
use crate::translate::{Translator, ENGLISH};
use crate::worker::{
    GenerateParams, RelayOutcome, RelayRequest, RelayUpdate, WorkerClient, WorkerLocator,
};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

const INBOUND_TRANSLATION_NOTICE: &str =
    "Translation unavailable: your message was sent to the model untranslated.";
const OUTBOUND_TRANSLATION_NOTICE: &str =
    "Translation unavailable: the response is shown in English.";
const LOG_FAILURE_NOTICE: &str = "Exchange log unavailable: this turn was not recorded.";

/// State for one in-flight turn
pub(super) struct TurnRuntime<'a, L, W, T: ?Sized, X> {
    orchestrator: &'a SessionOrchestrator<L, W, T, X>,
    context: TurnContext,
    state: TurnPhase,
    session: Session,
    template: Arc<ConversationTemplate>,
    text: String,
    temperature: f32,
    max_new_tokens: u32,
    client_ip: String,
    /// Present when the caller wants every state change
    replies: Option<mpsc::Sender<TurnReply>>,
    relay_updates: Option<mpsc::Receiver<RelayUpdate>>,
    relay_cancel: CancellationToken,
    relay_started_at: Option<f64>,
    notices: Vec<String>,
    client_gone: bool,
    guard: OwnedMutexGuard<()>,
}

impl<'a, L, W, T, X> TurnRuntime<'a, L, W, T, X>
where
    L: WorkerLocator + 'static,
    W: WorkerClient + 'static,
    T: Translator + ?Sized + 'static,
    X: ExchangeStore + 'static,
{
    pub(super) fn new(
        orchestrator: &'a SessionOrchestrator<L, W, T, X>,
        turn: PreparedTurn,
        client_ip: &str,
        replies: Option<mpsc::Sender<TurnReply>>,
    ) -> Self {
        let PreparedTurn {
            request,
            session,
            template,
            guard,
        } = turn;
        let first_round = session.awaits_first_round();
        Self {
            orchestrator,
            context: TurnContext::new(request.model, first_round),
            state: TurnPhase::Idle,
            session,
            template,
            text: request.text,
            temperature: request.temperature,
            max_new_tokens: request.max_new_tokens,
            client_ip: client_ip.to_string(),
            replies,
            relay_updates: None,
            relay_cancel: CancellationToken::new(),
            relay_started_at: None,
            notices: Vec::new(),
            client_gone: false,
            guard,
        }
    }

    pub(super) async fn run(mut self) -> Result<TurnReply, OrchestratorError> {
        // Whatever way this returns, the relay task stops with it
        let _relay_guard = self.relay_cancel.clone().drop_guard();

        tracing::info!(
            session_id = %self.session.session_id,
            model = %self.context.model_id,
            first_round = self.context.first_round,
            streaming = self.replies.is_some(),
            "Starting turn"
        );

        let text = std::mem::take(&mut self.text);
        self.process_event(Event::RequestStarted).await?;
        self.process_event(Event::InputSubmitted { text }).await?;
        while let Some(event) = self.next_relay_event().await {
            self.process_event(event).await?;
        }

        tracing::info!(
            session_id = %self.session.session_id,
            model = %self.context.model_id,
            phase = ?self.state,
            notices = self.notices.len(),
            "Turn finished"
        );
        Ok(self.reply())
    }

    async fn process_event(&mut self, event: Event) -> Result<(), OrchestratorError> {
        let mut events_to_process = vec![event];

        while let Some(mut current_event) = events_to_process.pop() {
            if self.client_gone
                && !self.state.is_at_rest()
                && !matches!(current_event, Event::ClientDisconnected)
            {
                current_event = Event::ClientDisconnected;
            }

            let result = transition(&self.state, &self.context, current_event)?;
            self.state = result.new_state;

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect).await? {
                    events_to_process.push(generated_event);
                }
            }
        }

        Ok(())
    }

    /// Next event from the running relay, or `None` once there is nothing
    /// left to wait for
    async fn next_relay_event(&mut self) -> Option<Event> {
        if self.state.is_at_rest() {
            return None;
        }
        let updates = self.relay_updates.as_mut()?;

        let update = if let Some(replies) = &self.replies {
            tokio::select! {
                biased;
                () = replies.closed() => None,
                update = updates.recv() => Some(update),
            }
        } else {
            Some(updates.recv().await)
        };

        let Some(update) = update else {
            tracing::info!(session_id = %self.session.session_id, "Caller disconnected mid-stream");
            self.client_gone = true;
            return Some(Event::ClientDisconnected);
        };

        match update {
            Some(RelayUpdate::Partial(visible)) => Some(Event::PartialOutput { visible }),
            Some(RelayUpdate::Done(outcome)) => {
                self.relay_updates = None;
                Some(outcome_event(outcome))
            }
            None => {
                self.relay_updates = None;
                Some(outcome_event(RelayOutcome::transport_failed()))
            }
        }
    }

    /// Execute an effect and optionally return a generated event
    #[allow(clippy::too_many_lines)]
    async fn execute_effect(&mut self, effect: Effect) -> Result<Option<Event>, OrchestratorError> {
        match effect {
            Effect::NormalizeInput { text } => {
                let event = match self.orchestrator.pipeline.normalize_inbound(&text).await {
                    Ok(normalized) => Event::InputNormalized {
                        canonical: normalized.canonical,
                        display: text,
                        language: normalized.language,
                        notice: None,
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "Inbound translation failed, using raw text");
                        Event::InputNormalized {
                            canonical: text.clone(),
                            display: text,
                            language: ENGLISH.to_string(),
                            notice: Some(INBOUND_TRANSLATION_NOTICE.to_string()),
                        }
                    }
                };
                Ok(Some(event))
            }

            Effect::MarkSkipped => {
                self.session.skip_next = true;
                Ok(None)
            }

            Effect::AppendExchange {
                canonical,
                display,
                language,
            } => {
                self.session.append_exchange(canonical, display, language);
                Ok(None)
            }

            Effect::Retemplate => {
                let template = self
                    .orchestrator
                    .templates
                    .template_for_model(&self.context.model_id);
                let session = self.session.retemplate(&template);
                self.orchestrator.locks.alias(&self.guard, &session.session_id);
                tracing::info!(
                    model = %self.context.model_id,
                    from = %self.session.template_id,
                    to = %template.id,
                    style = template.separator_style.as_str(),
                    session_id = %session.session_id,
                    "Re-templated session after first round"
                );
                self.session = session;
                self.template = template;
                Ok(None)
            }

            Effect::ResolveWorker => {
                let address = match self.orchestrator.locator.resolve(&self.context.model_id).await
                {
                    Ok(address) => address,
                    Err(e) => {
                        tracing::warn!(
                            model = %self.context.model_id,
                            error = %e,
                            "Worker lookup failed"
                        );
                        String::new()
                    }
                };
                if address.is_empty() {
                    tracing::warn!(model = %self.context.model_id, "No worker available");
                }
                Ok(Some(Event::WorkerResolved { address }))
            }

            Effect::StartRelay { worker } => {
                let request = RelayRequest::new(GenerateParams {
                    model: self.context.model_id.clone(),
                    prompt: self.session.render_prompt(&self.template),
                    temperature: self.temperature,
                    max_new_tokens: self.max_new_tokens,
                    stop: self.template.stop_sequence().to_string(),
                });
                self.relay_started_at = Some(unix_seconds());

                if self.replies.is_some() {
                    self.relay_updates = Some(self.orchestrator.relay.spawn_stream(
                        worker,
                        request,
                        self.relay_cancel.clone(),
                    ));
                    Ok(None)
                } else {
                    let outcome = self.orchestrator.relay.run_unary(&worker, &request).await;
                    Ok(Some(outcome_event(outcome)))
                }
            }

            Effect::StopRelay => {
                self.relay_cancel.cancel();
                self.relay_updates = None;
                Ok(None)
            }

            Effect::SetPartial { visible } => {
                if let Some(pending) = self.session.pending_turn_mut() {
                    pending.partial = visible;
                }
                Ok(None)
            }

            Effect::LocalizeResponse { text } => {
                let language = self
                    .session
                    .pending_turn()
                    .map_or_else(|| ENGLISH.to_string(), |turn| turn.language.clone());
                let event = match self
                    .orchestrator
                    .pipeline
                    .localize_outbound(&text, &language)
                    .await
                {
                    Ok(display) => Event::ResponseLocalized {
                        display,
                        notice: None,
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, language = %language, "Outbound translation failed");
                        Event::ResponseLocalized {
                            display: text,
                            notice: Some(OUTBOUND_TRANSLATION_NOTICE.to_string()),
                        }
                    }
                };
                Ok(Some(event))
            }

            Effect::CompleteResponse { text, display } => {
                self.session.complete_response(text, display)?;
                Ok(None)
            }

            Effect::FailResponse { message } => {
                self.session.complete_response(message.clone(), message)?;
                Ok(None)
            }

            Effect::RecordNotice { message } => {
                self.notices.push(message);
                Ok(None)
            }

            Effect::PublishSnapshot => {
                self.publish().await;
                Ok(None)
            }

            Effect::AppendRecord => {
                let finish = unix_seconds();
                let record = ExchangeRecord::chat(
                    self.context.model_id.clone(),
                    self.relay_started_at.unwrap_or(finish),
                    finish,
                    self.session.snapshot(&self.template),
                    self.client_ip.clone(),
                );
                if let Err(e) = self.orchestrator.exchange_log.append(&record).await {
                    tracing::error!(
                        session_id = %self.session.session_id,
                        error = %e,
                        "Failed to append exchange record"
                    );
                    self.notices.push(LOG_FAILURE_NOTICE.to_string());
                    self.publish().await;
                }
                Ok(None)
            }
        }
    }

    /// Send the current state to a streaming caller
    async fn publish(&mut self) {
        if self.client_gone {
            return;
        }
        let reply = self.reply();
        if let Some(replies) = &self.replies {
            if replies.send(reply).await.is_err() {
                self.client_gone = true;
            }
        }
    }

    fn reply(&self) -> TurnReply {
        TurnReply {
            model: self.context.model_id.clone(),
            session: self.session.clone(),
            phase: self.state.clone(),
            display: self.session.display_pairs(),
            notices: self.notices.clone(),
        }
    }
}

fn outcome_event(outcome: RelayOutcome) -> Event {
    match outcome {
        RelayOutcome::Completed { text } => Event::StreamCompleted { text },
        RelayOutcome::WorkerError { message, code } => Event::StreamFailed {
            message,
            reason: AbortReason::WorkerError { code },
        },
        RelayOutcome::TransportFailed { message } => Event::StreamFailed {
            message,
            reason: AbortReason::Transport,
        },
    }
}
