/*!
Session state management for the Cryptor.

This module defines session states and the state machine for session progression.
*/

use std::fmt;

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// Session state for tracking handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// No engine state exists yet
    Uninitialized,
    /// Identity, context, session and buffers are in place
    Initialized,
    /// At least one handshake step has run
    Handshaking,
    /// Handshake completed, bulk encrypt/decrypt allowed
    Active,
    /// Engine state released
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "Uninitialized"),
            SessionState::Initialized => write!(f, "Initialized"),
            SessionState::Handshaking => write!(f, "Handshaking"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Endpoint role in the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde-support", serde(rename_all = "lowercase"))]
pub enum Role {
    /// Client role (connect state, speaks first)
    #[default]
    Client,
    /// Server role (accept state)
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "Client"),
            Role::Server => write!(f, "Server"),
        }
    }
}

/// Session state manager
///
/// Handles state transitions and validation of operations
/// based on the current session state.
#[derive(Debug, Clone, Copy)]
pub struct StateManager {
    /// Current state of the session
    state: SessionState,
    /// Role of this endpoint
    role: Role,
}

impl StateManager {
    /// Create a new state manager
    pub fn new(role: Role) -> Self {
        Self {
            state: SessionState::Uninitialized,
            role,
        }
    }

    /// Get the current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get the role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Check if init is allowed (fresh or previously torn down)
    pub fn can_init(&self) -> bool {
        matches!(self.state, SessionState::Uninitialized | SessionState::Closed)
    }

    /// Check if a handshake step is allowed
    pub fn can_handshake(&self) -> bool {
        matches!(
            self.state,
            SessionState::Initialized | SessionState::Handshaking | SessionState::Active
        )
    }

    /// Check if data transfer is allowed
    pub fn can_transfer_data(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Check if engine state exists
    pub fn has_engine_state(&self) -> bool {
        matches!(
            self.state,
            SessionState::Initialized | SessionState::Handshaking | SessionState::Active
        )
    }

    /// Transition to the initialized state
    pub fn transition_to_initialized(&mut self) {
        if self.can_init() {
            self.state = SessionState::Initialized;
        }
    }

    /// Transition to the handshaking state
    pub fn transition_to_handshaking(&mut self) {
        if self.state == SessionState::Initialized {
            self.state = SessionState::Handshaking;
        }
    }

    /// Transition to the active state
    pub fn transition_to_active(&mut self) {
        if matches!(self.state, SessionState::Initialized | SessionState::Handshaking) {
            self.state = SessionState::Active;
        }
    }

    /// Transition to the closed state
    pub fn transition_to_closed(&mut self) {
        self.state = SessionState::Closed;
    }
}
