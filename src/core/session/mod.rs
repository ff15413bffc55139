/*!
Session management for the secure transport.

This module provides the Cryptor and the state machine it follows.
*/

// State management
pub mod state;

// Cryptor
pub mod cryptor;

pub use self::cryptor::Cryptor;
pub use self::state::{Role, SessionState};
