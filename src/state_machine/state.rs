//! Turn phase and context types

use serde::{Deserialize, Serialize};

/// Why a turn ended without a normal response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// Controller had no worker for the model
    NoWorker,
    /// Worker answered with a non-zero error code
    WorkerError { code: i64 },
    /// Worker unreachable, timed out or sent a malformed frame
    Transport,
    /// Caller went away mid-turn
    Cancelled,
}

/// Where the current turn is.
///
/// `Idle` and `Aborted` are at rest; every other phase means a generation
/// is in flight for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnPhase {
    #[default]
    Idle,

    /// Session locked for this request, input not yet inspected
    AwaitingInput,

    /// Detecting language and translating the input to English
    Normalizing,

    /// Exchange appended, looking up a worker
    AwaitingWorker,

    /// Relay running against `worker`
    Streaming { worker: String },

    /// Relay done, localizing the final text for display
    Finalizing { text: String },

    Aborted { reason: AbortReason },
}

impl TurnPhase {
    /// No generation in flight
    pub fn is_at_rest(&self) -> bool {
        matches!(self, TurnPhase::Idle | TurnPhase::Aborted { .. })
    }

    /// A relay has been started for this turn
    pub fn relay_attempted(&self) -> bool {
        matches!(
            self,
            TurnPhase::Streaming { .. } | TurnPhase::Finalizing { .. }
        )
    }
}

/// Per-turn facts the transition function needs
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub model_id: String,
    /// The session holds only its template preamble, so this turn completes
    /// the first round
    pub first_round: bool,
}

impl TurnContext {
    pub fn new(model_id: impl Into<String>, first_round: bool) -> Self {
        Self {
            model_id: model_id.into(),
            first_round,
        }
    }
}
