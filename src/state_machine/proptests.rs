//! Property-based tests for the turn state machine
//!
//! These check invariants that must hold for any event sequence.

use super::transition::*;
use super::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_abort_reason() -> impl Strategy<Value = AbortReason> {
    prop_oneof![
        Just(AbortReason::NoWorker),
        (1i64..100).prop_map(|code| AbortReason::WorkerError { code }),
        Just(AbortReason::Transport),
        Just(AbortReason::Cancelled),
    ]
}

fn arb_state() -> impl Strategy<Value = TurnPhase> {
    prop_oneof![
        Just(TurnPhase::Idle),
        Just(TurnPhase::AwaitingInput),
        Just(TurnPhase::Normalizing),
        Just(TurnPhase::AwaitingWorker),
        "http://[a-z]{1,8}:2100[0-9]".prop_map(|worker| TurnPhase::Streaming { worker }),
        "[a-zA-Z ]{0,20}".prop_map(|text| TurnPhase::Finalizing { text }),
        arb_abort_reason().prop_map(|reason| TurnPhase::Aborted { reason }),
    ]
}

fn arb_busy_state() -> impl Strategy<Value = TurnPhase> {
    arb_state().prop_filter("busy", |state| !state.is_at_rest())
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        Just(Event::RequestStarted),
        "[a-zA-Z ]{0,20}".prop_map(|text| Event::InputSubmitted { text }),
        Just(Event::ClientDisconnected),
        ("[a-zA-Z ]{1,20}", "[a-z]{2}", proptest::option::of("[a-z ]{1,20}")).prop_map(
            |(text, language, notice)| Event::InputNormalized {
                canonical: text.clone(),
                display: text,
                language,
                notice,
            }
        ),
        ("[a-zA-Z ]{0,20}", proptest::option::of("[a-z ]{1,20}"))
            .prop_map(|(display, notice)| Event::ResponseLocalized { display, notice }),
        prop_oneof![Just(String::new()), Just("http://w:21002".to_string())]
            .prop_map(|address| Event::WorkerResolved { address }),
        "[a-zA-Z ]{0,20}".prop_map(|visible| Event::PartialOutput { visible }),
        "[a-zA-Z ]{0,20}".prop_map(|text| Event::StreamCompleted { text }),
        ("[a-zA-Z ]{1,20}", arb_abort_reason())
            .prop_map(|(message, reason)| Event::StreamFailed { message, reason }),
    ]
}

fn context() -> TurnContext {
    TurnContext::new("medgpt", false)
}

fn count(effects: &[Effect], pred: impl Fn(&Effect) -> bool) -> usize {
    effects.iter().filter(|e| pred(e)).count()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Applying any event sequence (skipping rejected events) never panics
    /// and records at most one chat log entry per turn
    #[test]
    fn prop_one_record_per_turn(events in proptest::collection::vec(arb_event(), 0..30)) {
        let ctx = context();
        let mut state = TurnPhase::Idle;
        let mut records_this_turn = 0;
        for event in events {
            let starts_turn = matches!(event, Event::RequestStarted);
            if let Ok(result) = transition(&state, &ctx, event) {
                if starts_turn {
                    records_this_turn = 0;
                }
                records_this_turn += count(&result.effects, |e| matches!(e, Effect::AppendRecord));
                state = result.new_state;
            }
            prop_assert!(records_this_turn <= 1);
        }
    }

    /// A busy session never accepts a second request
    #[test]
    fn prop_busy_rejects_requests(state in arb_busy_state()) {
        let result = transition(&state, &context(), Event::RequestStarted);
        prop_assert!(matches!(result, Err(TransitionError::GenerationInFlight)));
    }

    /// A session at rest always accepts a new request
    #[test]
    fn prop_rest_accepts_requests(reason in proptest::option::of(arb_abort_reason())) {
        let state = reason.map_or(TurnPhase::Idle, |reason| TurnPhase::Aborted { reason });
        let result = transition(&state, &context(), Event::RequestStarted).unwrap();
        prop_assert_eq!(result.new_state, TurnPhase::AwaitingInput);
    }

    /// Disconnecting always leaves the session at rest and never fails
    #[test]
    fn prop_disconnect_always_rests(state in arb_state()) {
        let result = transition(&state, &context(), Event::ClientDisconnected).unwrap();
        prop_assert!(result.new_state.is_at_rest());
        // Only a started relay needs stopping
        let stops = count(&result.effects, |e| matches!(e, Effect::StopRelay));
        prop_assert_eq!(stops, usize::from(state.relay_attempted()));
    }

    /// Streaming only ever ends in Finalizing or Aborted
    #[test]
    fn prop_streaming_exits(worker in "[a-z]{1,8}", event in arb_event()) {
        let state = TurnPhase::Streaming { worker };
        if let Ok(result) = transition(&state, &context(), event) {
            let exited = matches!(
                result.new_state,
                TurnPhase::Streaming { .. } | TurnPhase::Finalizing { .. } | TurnPhase::Aborted { .. }
            );
            prop_assert!(exited, "unexpected phase {:?}", result.new_state);
        }
    }

    /// Every abort puts a user-visible message in place of the response,
    /// except a disconnect, where nobody is left to see it
    #[test]
    fn prop_abort_fills_response(state in arb_busy_state(), event in arb_event()) {
        let disconnect = matches!(event, Event::ClientDisconnected);
        if let Ok(result) = transition(&state, &context(), event) {
            if matches!(result.new_state, TurnPhase::Aborted { .. }) && !disconnect {
                let fails = count(&result.effects, |e| matches!(e, Effect::FailResponse { .. }));
                prop_assert_eq!(fails, 1);
            }
        }
    }

    /// Input reaching the translator never exceeds the length limit
    #[test]
    fn prop_normalized_input_is_bounded(len in 0usize..12_000) {
        let text = "é".repeat(len);
        let result = transition(&TurnPhase::AwaitingInput, &context(), Event::InputSubmitted { text }).unwrap();
        for effect in result.effects {
            if let Effect::NormalizeInput { text } = effect {
                prop_assert!(text.chars().count() <= crate::conversation::MAX_INPUT_CHARS);
            }
        }
    }

    /// The first round re-templates exactly once, later rounds never do
    #[test]
    fn prop_retemplate_only_on_first_round(first_round in any::<bool>(), language in "[a-z]{2}") {
        let ctx = TurnContext::new("medgpt", first_round);
        let event = Event::InputNormalized {
            canonical: "q".to_string(),
            display: "q".to_string(),
            language,
            notice: None,
        };
        let result = transition(&TurnPhase::Normalizing, &ctx, event).unwrap();
        let retemplates = count(&result.effects, |e| matches!(e, Effect::Retemplate));
        prop_assert_eq!(retemplates, usize::from(first_round));
    }
}
