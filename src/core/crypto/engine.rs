/*!
Engine adapter interface.

This module defines the primitive operations a Cryptor needs from a TLS
engine: loading identity material, building a context and a session,
creating the in-memory buffer pair, stepping the handshake and moving
bytes in and out of the session. Handles release their engine resources
when dropped.
*/

use std::fmt;

/// Result code of an engine operation, modelled on the classic TLS
/// library error queue codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Operation completed
    None,
    /// More input from the peer is needed
    WantRead,
    /// Output could not be accepted right now
    WantWrite,
    /// Peer closed the session cleanly
    ZeroReturn,
    /// Failure outside the protocol (buffer, I/O)
    Syscall,
    /// Protocol failure
    Ssl,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::None => "SSL_ERROR_NONE",
            ErrorCode::WantRead => "SSL_ERROR_WANT_READ",
            ErrorCode::WantWrite => "SSL_ERROR_WANT_WRITE",
            ErrorCode::ZeroReturn => "SSL_ERROR_ZERO_RETURN",
            ErrorCode::Syscall => "SSL_ERROR_SYSCALL",
            ErrorCode::Ssl => "SSL_ERROR_SSL",
        };
        f.write_str(name)
    }
}

/// Primitive TLS engine operations consumed by [`crate::Cryptor`].
///
/// Optional results mirror engines that hand back null handles on failure;
/// the Cryptor maps each `None`/`false` to the error naming that step.
pub trait TlsEngine: Send + Sync {
    /// Parsed certificate chain
    type Certificate: Send;
    /// Parsed private key
    type PrivateKey: Send;
    /// Protocol method (provider and versions)
    type Method: Send;
    /// Configuration bound to certificate and key
    type Context: Send;
    /// Per-connection handshake/record state
    type Session: Send;
    /// One in-memory byte queue
    type Buffer: Send;

    /// Parse a PEM certificate
    fn read_certificate(&self, pem: &[u8]) -> Option<Self::Certificate>;

    /// Parse a PEM private key
    fn read_private_key(&self, pem: &[u8]) -> Option<Self::PrivateKey>;

    /// Resolve the protocol method
    fn get_method(&self) -> Option<Self::Method>;

    /// Create a context for the method
    fn create_context(&self, method: &Self::Method) -> Option<Self::Context>;

    /// Bind the certificate to the context
    fn use_certificate(&self, context: &mut Self::Context, certificate: &Self::Certificate) -> bool;

    /// Bind the private key to the context
    fn use_private_key(&self, context: &mut Self::Context, key: &Self::PrivateKey) -> bool;

    /// Create a session from the context
    fn create_session(&self, context: &Self::Context) -> Option<Self::Session>;

    /// Create the (incoming, outgoing) buffer pair
    fn create_buffers(&self) -> (Option<Self::Buffer>, Option<Self::Buffer>);

    /// Attach the buffer pair to the session with the given capacity
    fn set_buffers(
        &self,
        session: &mut Self::Session,
        incoming: &Self::Buffer,
        outgoing: &Self::Buffer,
        max_buffer_size: usize,
    );

    /// Put the session in accept (server) state
    fn set_accept_state(&self, session: &mut Self::Session) -> bool;

    /// Put the session in connect (client) state
    fn set_connect_state(&self, session: &mut Self::Session) -> bool;

    /// Whether the handshake already completed
    fn is_init_finished(&self, session: &Self::Session) -> bool;

    /// Run one non-blocking handshake step
    fn do_handshake(&self, session: &mut Self::Session) -> ErrorCode;

    /// Feed plaintext to the session; returns how much was accepted
    fn ssl_write(&self, session: &mut Self::Session, data: &[u8]) -> Result<usize, ErrorCode>;

    /// Read decrypted plaintext from the session
    fn ssl_read(&self, session: &mut Self::Session, output: &mut [u8]) -> Result<usize, ErrorCode>;

    /// Plaintext bytes the session can hand out right now
    fn available_bytes(&self, session: &Self::Session) -> usize;

    /// Read wire bytes out of a buffer
    fn buffer_read(&self, buffer: &mut Self::Buffer, output: &mut [u8]) -> Result<usize, ErrorCode>;

    /// Write wire bytes into a buffer; may accept only part of `data`
    fn buffer_write(&self, buffer: &mut Self::Buffer, data: &[u8]) -> Result<usize, ErrorCode>;

    /// Bytes waiting in a buffer
    fn buffer_pending(&self, buffer: &Self::Buffer) -> usize;

    /// Describe a failure code in the context of the session
    fn describe_error(&self, session: &Self::Session, code: ErrorCode) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_names() {
        assert_eq!(ErrorCode::None.to_string(), "SSL_ERROR_NONE");
        assert_eq!(ErrorCode::WantRead.to_string(), "SSL_ERROR_WANT_READ");
        assert_eq!(ErrorCode::Ssl.to_string(), "SSL_ERROR_SSL");
    }
}
