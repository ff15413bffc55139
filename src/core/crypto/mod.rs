/*!
TLS engine components.

This module provides the engine adapter interface, its rustls
implementation, server certificate pinning and the identity material
handed to a Cryptor.
*/

// Engine adapter interface
pub mod engine;

// rustls-backed engine
pub mod rustls_engine;

// Server certificate pinning
pub mod verifier;

// Certificate and private key
pub mod identity;

// Config
pub mod config;

pub use config::CryptorConfig;
pub use engine::{ErrorCode, TlsEngine};
pub use identity::Identity;
pub use rustls_engine::{MemoryBuffer, RustlsEngine};
pub use verifier::certificate_fingerprint;
