//! Per-turn state machine
//!
//! Elm-style: a pure transition function maps (phase, event) to a new phase
//! and a list of effects. The runtime executes the effects and feeds their
//! results back in as events.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{AbortReason, TurnContext, TurnPhase};
pub use transition::{transition, TransitionError};
