//! Hierarchical session state machine.
//!
//! State hierarchy:
//! ```text
//! NOT_CONNECTED
//! CONNECTED
//! ├── SESSION_NOT_READY   (initial child)
//! └── SESSION_READY
//!     └── ACTIVE          (initial child)
//! ```
//!
//! Transitions:
//! ```text
//! NOT_CONNECTED     --CONNECT-->       CONNECTED (enters SESSION_NOT_READY)
//! CONNECTED         --DISCONNECT-->    NOT_CONNECTED
//! SESSION_NOT_READY --START_SESSION--> SESSION_READY (enters ACTIVE)
//! SESSION_READY     --STOP_SESSION-->  SESSION_NOT_READY
//! ```
//!
//! The machine always occupies exactly one leaf; composite states are
//! matched through their ancestor chain. All transitions are atomic
//! compare-and-apply behind a mutex, so duplicate lifecycle events are
//! rejected instead of being race-applied.

use std::sync::Mutex;

/// A state of the session lifecycle, leaf or composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NotConnected,
    Connected,
    SessionNotReady,
    SessionReady,
    Active,
}

impl State {
    /// Parent in the state hierarchy, if any.
    fn parent(self) -> Option<State> {
        match self {
            State::SessionNotReady | State::SessionReady => Some(State::Connected),
            State::Active => Some(State::SessionReady),
            State::NotConnected | State::Connected => None,
        }
    }

    /// Descend into initial children until a leaf is reached.
    fn initial_leaf(self) -> State {
        match self {
            State::Connected => State::SessionNotReady,
            State::SessionReady => State::Active,
            leaf => leaf,
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            State::NotConnected => "not connected",
            State::Connected => "connected",
            State::SessionNotReady => "session not ready",
            State::SessionReady => "session ready",
            State::Active => "active",
        };
        write!(f, "{}", name)
    }
}

/// Lifecycle events driving the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Connect,
    Disconnect,
    StartSession,
    StopSession,
}

/// The session state machine. Internally synchronized.
#[derive(Debug)]
pub struct StateMachine {
    current: Mutex<State>,
}

impl StateMachine {
    /// Create a machine in `NOT_CONNECTED`.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(State::NotConnected),
        }
    }

    /// Transition declared for `state` (not its ancestors) on `event`.
    fn transition_for(state: State, event: Event) -> Option<State> {
        match (state, event) {
            (State::NotConnected, Event::Connect) => Some(State::Connected),
            (State::Connected, Event::Disconnect) => Some(State::NotConnected),
            (State::SessionNotReady, Event::StartSession) => Some(State::SessionReady),
            (State::SessionReady, Event::StopSession) => Some(State::SessionNotReady),
            _ => None,
        }
    }

    fn matches(leaf: State, queried: State) -> bool {
        let mut probe = Some(leaf);
        while let Some(state) = probe {
            if state == queried {
                return true;
            }
            probe = state.parent();
        }
        false
    }

    /// Apply `event` if the current leaf or one of its ancestors declares a
    /// transition for it, and the optional parent constraint holds.
    ///
    /// Returns false without changing state otherwise.
    pub fn go_to_next_state(&self, event: Event, required_parent: Option<State>) -> bool {
        let mut current = self.current.lock().unwrap();

        if let Some(required) = required_parent {
            if !Self::matches(*current, required) {
                return false;
            }
        }

        let mut probe = Some(*current);
        while let Some(state) = probe {
            if let Some(target) = Self::transition_for(state, event) {
                *current = target.initial_leaf();
                return true;
            }
            probe = state.parent();
        }
        false
    }

    /// Check whether the machine is in `state`, as leaf or ancestor.
    pub fn is_in_state(&self, state: State) -> bool {
        Self::matches(*self.current.lock().unwrap(), state)
    }

    /// Current leaf state.
    pub fn current(&self) -> State {
        *self.current.lock().unwrap()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
