/*!
Error handling for the secure transport.

Cryptor failures are raised synchronously from the call that detects them.
Transport failures travel only through a failed completion.
*/

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::crypto::engine::ErrorCode;

/// Result type for the secure transport
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the secure transport
#[derive(Error, Debug)]
pub enum Error {
    /// Identity material could not be loaded
    #[error("Identity provisioning failed: {0}")]
    Provisioning(#[source] ProvisioningError),

    /// Engine object creation or binding failed
    #[error("Engine setup failed: {0}")]
    Engine(#[source] EngineError),

    /// Unrecoverable handshake result
    #[error("Handshake failed ({code}): {detail}")]
    Handshake {
        code: ErrorCode,
        detail: String,
    },

    /// Non-positive engine read or write
    #[error("{op} failed ({code}): {detail}")]
    Io {
        op: IoOperation,
        code: ErrorCode,
        detail: String,
    },

    /// Raw channel failure
    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),

    /// Operation not allowed in the current session state
    #[error("Session not in correct state: expected {expected}, but was {actual}")]
    InvalidState {
        expected: String,
        actual: String,
    },
}

/// Identity material load failures
#[derive(Error, Debug)]
pub enum ProvisioningError {
    /// Certificate PEM could not be parsed
    #[error("could not read certificate")]
    ReadCertificate,

    /// Private key PEM could not be parsed
    #[error("could not read private key")]
    ReadPrivateKey,

    /// Identity file could not be read from disk
    #[error("could not read {path}: {reason}")]
    Unreadable {
        path: PathBuf,
        reason: String,
    },
}

/// Engine object creation and binding failures, one per init step
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error("no protocol method available")]
    Method,

    #[error("context creation failed")]
    ContextCreation,

    #[error("certificate rejected by context")]
    UseCertificate,

    #[error("private key rejected by context")]
    UsePrivateKey,

    #[error("session creation failed")]
    HandlerCreation,

    #[error("incoming buffer creation failed")]
    ReadBufferCreation,

    #[error("outgoing buffer creation failed")]
    WriteBufferCreation,

    #[error("could not set session role")]
    SetRole,
}

/// Which in-memory transfer failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOperation {
    /// Plaintext into the session
    SslWrite,
    /// Plaintext out of the session
    SslRead,
    /// Wire bytes out of the outgoing buffer
    BufferRead,
    /// Wire bytes into the incoming buffer
    BufferWrite,
}

impl fmt::Display for IoOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoOperation::SslWrite => write!(f, "Session write"),
            IoOperation::SslRead => write!(f, "Session read"),
            IoOperation::BufferRead => write!(f, "Buffer read"),
            IoOperation::BufferWrite => write!(f, "Buffer write"),
        }
    }
}

/// Raw channel failures delivered through a completion
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The underlying read or write failed
    #[error("I/O error ({kind:?}, os code {os_code:?}): {message}")]
    Io {
        kind: io::ErrorKind,
        os_code: Option<i32>,
        message: String,
    },

    /// The peer closed the channel
    #[error("channel disconnected")]
    Disconnected,

    /// The transport was stopped before the operation completed
    #[error("operation cancelled")]
    Cancelled,

    /// No async runtime to run the transport on
    #[error("no async runtime available")]
    NoRuntime,
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::UnexpectedEof => TransportError::Disconnected,
            kind => TransportError::Io {
                kind,
                os_code: error.raw_os_error(),
                message: error.to_string(),
            },
        }
    }
}

/// Create an invalid state error
#[macro_export]
macro_rules! invalid_state_err {
    ($expected:expr, $actual:expr) => {
        Err($crate::core::error::Error::InvalidState {
            expected: $expected.to_string(),
            actual: $actual.to_string(),
        })
    };
}

/// Convert from Error to io::Error (for compatibility)
impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Provisioning(e) => io::Error::new(io::ErrorKind::InvalidInput, e.to_string()),
            Error::Engine(e) => io::Error::other(e.to_string()),
            Error::Handshake { code, detail } => io::Error::new(
                io::ErrorKind::ConnectionAborted,
                format!("Handshake failed ({}): {}", code, detail),
            ),
            Error::Io { op, code, detail } => io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} failed ({}): {}", op, code, detail),
            ),
            Error::Transport(TransportError::Io { kind, message, .. }) => {
                io::Error::new(kind, message)
            }
            Error::Transport(TransportError::Disconnected) => {
                io::Error::new(io::ErrorKind::UnexpectedEof, "channel disconnected")
            }
            Error::Transport(e) => io::Error::other(e.to_string()),
            Error::InvalidState { expected, actual } => io::Error::new(
                io::ErrorKind::NotConnected,
                format!("Invalid state: expected {}, but was {}", expected, actual),
            ),
        }
    }
}
