//! Pure turn transition function

use super::{AbortReason, Effect, Event, TurnContext, TurnPhase};
use crate::conversation::truncate_input;
use crate::worker::SERVER_ERROR_MSG;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TurnPhase,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: TurnPhase) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("A generation is already in flight for this session")]
    GenerationInFlight,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function: same inputs, same outputs, no I/O
pub fn transition(
    state: &TurnPhase,
    context: &TurnContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Request start
        // ============================================================
        (TurnPhase::Idle | TurnPhase::Aborted { .. }, Event::RequestStarted) => {
            Ok(TransitionResult::new(TurnPhase::AwaitingInput))
        }
        (_, Event::RequestStarted) => Err(TransitionError::GenerationInFlight),

        // Empty input skips generation entirely
        (TurnPhase::AwaitingInput, Event::InputSubmitted { text }) if text.is_empty() => {
            Ok(TransitionResult::new(TurnPhase::Idle)
                .with_effect(Effect::MarkSkipped)
                .with_effect(Effect::PublishSnapshot))
        }

        (TurnPhase::AwaitingInput, Event::InputSubmitted { text }) => {
            Ok(TransitionResult::new(TurnPhase::Normalizing).with_effect(Effect::NormalizeInput {
                text: truncate_input(&text),
            }))
        }

        // ============================================================
        // Normalized input: append and look for a worker
        // ============================================================
        (
            TurnPhase::Normalizing,
            Event::InputNormalized {
                canonical,
                display,
                language,
                notice,
            },
        ) => Ok(TransitionResult::new(TurnPhase::AwaitingWorker)
            .with_effects(Effect::notice(notice))
            .with_effect(Effect::AppendExchange {
                canonical,
                display,
                language,
            })
            .with_effects(context.first_round.then_some(Effect::Retemplate))
            .with_effect(Effect::PublishSnapshot)
            .with_effect(Effect::ResolveWorker)),

        (TurnPhase::AwaitingWorker, Event::WorkerResolved { address }) if address.is_empty() => {
            Ok(TransitionResult::new(TurnPhase::Aborted {
                reason: AbortReason::NoWorker,
            })
            .with_effect(Effect::FailResponse {
                message: SERVER_ERROR_MSG.to_string(),
            })
            .with_effect(Effect::PublishSnapshot))
        }

        (TurnPhase::AwaitingWorker, Event::WorkerResolved { address }) => {
            Ok(TransitionResult::new(TurnPhase::Streaming {
                worker: address.clone(),
            })
            .with_effect(Effect::StartRelay { worker: address }))
        }

        // ============================================================
        // Relay progress
        // ============================================================
        (TurnPhase::Streaming { .. }, Event::PartialOutput { visible }) => {
            Ok(TransitionResult::new(state.clone())
                .with_effect(Effect::SetPartial { visible })
                .with_effect(Effect::PublishSnapshot))
        }

        (TurnPhase::Streaming { .. }, Event::StreamCompleted { text }) => {
            Ok(TransitionResult::new(TurnPhase::Finalizing { text: text.clone() })
                .with_effect(Effect::LocalizeResponse { text }))
        }

        (TurnPhase::Streaming { .. }, Event::StreamFailed { message, reason }) => {
            Ok(TransitionResult::new(TurnPhase::Aborted { reason })
                .with_effect(Effect::FailResponse { message })
                .with_effect(Effect::PublishSnapshot)
                .with_effect(Effect::AppendRecord))
        }

        (TurnPhase::Finalizing { text }, Event::ResponseLocalized { display, notice }) => {
            Ok(TransitionResult::new(TurnPhase::Idle)
                .with_effect(Effect::CompleteResponse {
                    text: text.clone(),
                    display,
                })
                .with_effects(Effect::notice(notice))
                .with_effect(Effect::PublishSnapshot)
                .with_effect(Effect::AppendRecord))
        }

        // ============================================================
        // Caller disconnect
        // ============================================================
        (TurnPhase::Idle | TurnPhase::Aborted { .. }, Event::ClientDisconnected) => {
            Ok(TransitionResult::new(state.clone()))
        }

        (TurnPhase::Streaming { .. } | TurnPhase::Finalizing { .. }, Event::ClientDisconnected) => {
            Ok(TransitionResult::new(TurnPhase::Aborted {
                reason: AbortReason::Cancelled,
            })
            .with_effect(Effect::StopRelay)
            .with_effect(Effect::AppendRecord))
        }

        (_, Event::ClientDisconnected) => Ok(TransitionResult::new(TurnPhase::Aborted {
            reason: AbortReason::Cancelled,
        })),

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {state:?} on {event:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(first_round: bool) -> TurnContext {
        TurnContext::new("medgpt", first_round)
    }

    fn normalized(notice: Option<&str>) -> Event {
        Event::InputNormalized {
            canonical: "hello doctor".to_string(),
            display: "bonjour docteur".to_string(),
            language: "fr".to_string(),
            notice: notice.map(ToString::to_string),
        }
    }

    #[test]
    fn test_happy_path_walks_every_phase() {
        let ctx = context(false);
        let mut state = TurnPhase::Idle;
        let events = [
            Event::RequestStarted,
            Event::InputSubmitted {
                text: "bonjour docteur".to_string(),
            },
            normalized(None),
            Event::WorkerResolved {
                address: "http://w1".to_string(),
            },
            Event::PartialOutput {
                visible: "Hel▌".to_string(),
            },
            Event::StreamCompleted {
                text: "Hello".to_string(),
            },
            Event::ResponseLocalized {
                display: "Bonjour".to_string(),
                notice: None,
            },
        ];
        let mut phases = Vec::new();
        for event in events {
            state = transition(&state, &ctx, event).unwrap().new_state;
            phases.push(state.clone());
        }
        assert_eq!(
            phases,
            vec![
                TurnPhase::AwaitingInput,
                TurnPhase::Normalizing,
                TurnPhase::AwaitingWorker,
                TurnPhase::Streaming {
                    worker: "http://w1".to_string()
                },
                TurnPhase::Streaming {
                    worker: "http://w1".to_string()
                },
                TurnPhase::Finalizing {
                    text: "Hello".to_string()
                },
                TurnPhase::Idle,
            ]
        );
    }

    #[test]
    fn test_empty_input_marks_skip() {
        let result = transition(
            &TurnPhase::AwaitingInput,
            &context(true),
            Event::InputSubmitted {
                text: String::new(),
            },
        )
        .unwrap();
        assert_eq!(result.new_state, TurnPhase::Idle);
        assert_eq!(
            result.effects,
            vec![Effect::MarkSkipped, Effect::PublishSnapshot]
        );
    }

    #[test]
    fn test_long_input_is_truncated_before_normalizing() {
        let text = "x".repeat(6000);
        let result = transition(
            &TurnPhase::AwaitingInput,
            &context(false),
            Event::InputSubmitted { text },
        )
        .unwrap();
        match &result.effects[..] {
            [Effect::NormalizeInput { text }] => assert_eq!(text.chars().count(), 5000),
            other => panic!("Expected NormalizeInput, got {other:?}"),
        }
    }

    #[test]
    fn test_first_round_retemplates_after_append() {
        let result = transition(&TurnPhase::Normalizing, &context(true), normalized(None)).unwrap();
        let append = result
            .effects
            .iter()
            .position(|e| matches!(e, Effect::AppendExchange { .. }))
            .unwrap();
        let retemplate = result
            .effects
            .iter()
            .position(|e| matches!(e, Effect::Retemplate))
            .unwrap();
        assert!(append < retemplate);
        assert_eq!(result.effects.last(), Some(&Effect::ResolveWorker));

        let later = transition(&TurnPhase::Normalizing, &context(false), normalized(None)).unwrap();
        assert!(!later.effects.contains(&Effect::Retemplate));
    }

    #[test]
    fn test_degraded_normalization_records_notice() {
        let result = transition(
            &TurnPhase::Normalizing,
            &context(false),
            normalized(Some("translation unavailable")),
        )
        .unwrap();
        assert_eq!(
            result.effects[0],
            Effect::RecordNotice {
                message: "translation unavailable".to_string()
            }
        );
    }

    #[test]
    fn test_no_worker_aborts_with_message_and_no_record() {
        let result = transition(
            &TurnPhase::AwaitingWorker,
            &context(false),
            Event::WorkerResolved {
                address: String::new(),
            },
        )
        .unwrap();
        assert_eq!(
            result.new_state,
            TurnPhase::Aborted {
                reason: AbortReason::NoWorker
            }
        );
        assert!(result.effects.contains(&Effect::FailResponse {
            message: SERVER_ERROR_MSG.to_string()
        }));
        assert!(!result.effects.contains(&Effect::AppendRecord));
    }

    #[test]
    fn test_stream_failure_aborts_and_logs() {
        let result = transition(
            &TurnPhase::Streaming {
                worker: "w".to_string(),
            },
            &context(false),
            Event::StreamFailed {
                message: "oom (error_code: 1)".to_string(),
                reason: AbortReason::WorkerError { code: 1 },
            },
        )
        .unwrap();
        assert_eq!(
            result.new_state,
            TurnPhase::Aborted {
                reason: AbortReason::WorkerError { code: 1 }
            }
        );
        assert_eq!(
            result.effects,
            vec![
                Effect::FailResponse {
                    message: "oom (error_code: 1)".to_string()
                },
                Effect::PublishSnapshot,
                Effect::AppendRecord,
            ]
        );
    }

    #[test]
    fn test_busy_session_rejects_new_request() {
        for state in [
            TurnPhase::AwaitingInput,
            TurnPhase::Normalizing,
            TurnPhase::AwaitingWorker,
            TurnPhase::Streaming {
                worker: "w".to_string(),
            },
            TurnPhase::Finalizing {
                text: "t".to_string(),
            },
        ] {
            let result = transition(&state, &context(false), Event::RequestStarted);
            assert!(matches!(result, Err(TransitionError::GenerationInFlight)));
        }
    }

    #[test]
    fn test_disconnect_while_streaming_stops_relay() {
        let result = transition(
            &TurnPhase::Streaming {
                worker: "w".to_string(),
            },
            &context(false),
            Event::ClientDisconnected,
        )
        .unwrap();
        assert_eq!(
            result.new_state,
            TurnPhase::Aborted {
                reason: AbortReason::Cancelled
            }
        );
        assert_eq!(result.effects, vec![Effect::StopRelay, Effect::AppendRecord]);
    }

    #[test]
    fn test_partial_output_outside_streaming_is_invalid() {
        let result = transition(
            &TurnPhase::AwaitingWorker,
            &context(false),
            Event::PartialOutput {
                visible: "x".to_string(),
            },
        );
        assert!(matches!(result, Err(TransitionError::InvalidTransition(_))));
    }
}
