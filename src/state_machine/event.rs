//! Events that drive a turn

use super::state::AbortReason;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // Caller events
    RequestStarted,
    InputSubmitted {
        text: String,
    },
    ClientDisconnected,

    // Translation events
    InputNormalized {
        canonical: String,
        /// What the user typed, shown back to them
        display: String,
        language: String,
        /// Set when normalization degraded
        notice: Option<String>,
    },
    ResponseLocalized {
        display: String,
        notice: Option<String>,
    },

    // Worker events
    /// Empty address means no worker is available
    WorkerResolved {
        address: String,
    },
    PartialOutput {
        visible: String,
    },
    StreamCompleted {
        text: String,
    },
    StreamFailed {
        /// User-facing message shown in place of the response
        message: String,
        reason: AbortReason,
    },
}
