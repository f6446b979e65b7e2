//! Effects produced by turn transitions

/// Effects to be executed after a transition, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Detect and translate the (already truncated) input
    NormalizeInput { text: String },

    /// Empty input: flag the session so no generation runs
    MarkSkipped,

    /// Append the user turn and a pending response turn
    AppendExchange {
        canonical: String,
        display: String,
        language: String,
    },

    /// Swap the session onto the model's template, keeping the latest exchange
    Retemplate,

    /// Look up a worker for the turn's model
    ResolveWorker,

    /// Render the prompt and start relaying from `worker`
    StartRelay { worker: String },

    /// Stop consuming the relay and release the worker connection
    StopRelay,

    /// Show partial output on the pending turn
    SetPartial { visible: String },

    /// Translate the final text into the turn's language
    LocalizeResponse { text: String },

    /// Replace the pending turn with the final response
    CompleteResponse { text: String, display: String },

    /// Replace the pending turn with a user-facing error message
    FailResponse { message: String },

    /// Add a degraded-quality notice to the reply
    RecordNotice { message: String },

    /// Hand the current session state to the caller
    PublishSnapshot,

    /// Append a chat record to the exchange log
    AppendRecord,
}

impl Effect {
    pub fn notice(message: Option<String>) -> Option<Effect> {
        message.map(|message| Effect::RecordNotice { message })
    }
}
