//! Core components of the secure transport.
//!
//! This module contains the building blocks of a secured channel,
//! including the engine adapter, the Cryptor session, buffer views and
//! error handling.

// Engine adapter and identity material
pub mod crypto;

// Cryptor and its state machine
pub mod session;

// Buffer views
pub mod buffer;

// Hex previews for trace logging
pub mod hex;

// Constants
pub mod constants;

// Error handling
pub mod error;

// Re-exports for convenience
pub use self::buffer::Data;
pub use self::error::{Error, Result, TransportError};
pub use self::session::{Cryptor, Role, SessionState};
