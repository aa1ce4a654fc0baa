// Copyright (c) 2022-2023 The MobileCoin Foundation

use strum::{Display, EnumIter, EnumString, EnumVariantNames};

/// Listener phase for a confirmation session
///
/// Phases advance along `None → Starting → SetupDone → Interactive → Terminating → None`.
/// An abort may force `Terminating` from any active phase, and a failed setup
/// returns directly to `None`.
#[derive(
    Copy, Clone, PartialEq, Eq, Debug, Default, EnumString, Display, EnumVariantNames, EnumIter,
)]
pub enum ListenerState {
    /// Idle, no session running
    #[default]
    None,
    /// Listener spawned, connecting and setting up the display
    Starting,
    /// Channel, display and prompt are ready
    SetupDone,
    /// Prompt is shown and awaiting user input
    Interactive,
    /// Tearing down display and channel
    Terminating,
}

impl ListenerState {
    /// Check whether a transition to `next` is permitted
    pub fn can_transition_to(&self, next: ListenerState) -> bool {
        use ListenerState::*;

        match (self, next) {
            (None, Starting) => true,
            (Starting, SetupDone) => true,
            (SetupDone, Interactive) => true,
            (Interactive, Terminating) => true,
            // Abort from any active phase
            (Starting | SetupDone, Terminating) => true,
            // Completion or failed setup
            (Starting | SetupDone | Interactive | Terminating, None) => true,
            _ => false,
        }
    }

    /// Check whether the session has released (or is releasing) its resources
    pub fn is_settled(&self) -> bool {
        matches!(self, ListenerState::None | ListenerState::Terminating)
    }
}

/// Shared session phase, the single lock-protected value observed by both
/// the public API and the listener
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Phase {
    /// Current listener state
    pub state: ListenerState,

    /// Set by `abort`, cleared only when a new session starts
    pub abort_called: bool,

    /// Set once a secure input event has been forwarded to the peer
    pub input_delivered: bool,
}
