/*!
# tlslink

A secure, asynchronous byte transport for point-to-point raw channels such
as USB bulk endpoints or sockets.

## Overview

This library pairs two pieces:

- A [`Cryptor`] that drives a TLS session purely through in-memory buffers.
  It runs a resumable, non-blocking handshake and encrypts and decrypts
  bulk data without ever touching the network itself.
- A [`Transport`] that moves bytes over the raw channel with one-shot
  completions, keeping receives in order among themselves and sends in
  order among themselves.

The TLS engine sits behind the [`TlsEngine`] adapter trait. The default
[`RustlsEngine`] is built on rustls with TLS 1.2 and 1.3.

## Example

```no_run
use tlslink::{Cryptor, Identity, Role};

# fn main() -> tlslink::Result<()> {
let identity = Identity::from_pem_files("cert.pem", "key.pem")?;
let cryptor = Cryptor::with_rustls(identity, Role::Client);
cryptor.init()?;

// the first step produces the ClientHello; ship it to the peer
assert!(!cryptor.do_handshake()?);
let hello = cryptor.read_handshake_buffer()?;
# let _ = hello;
# Ok(())
# }
```
*/

// Core components
pub mod core;

// Raw channel transport (enabled with the "async" feature)
#[cfg(feature = "async")]
pub mod transport;

// Re-export commonly used types for convenience
pub use self::core::buffer::{Data, DataBuffer, DataConstBuffer};
pub use self::core::constants::{DEFAULT_SERVER_NAME, MAX_BUFFER_SIZE, MAX_RECEIVE_SIZE};
pub use self::core::crypto::{
    CryptorConfig, ErrorCode, Identity, RustlsEngine, TlsEngine, certificate_fingerprint,
};
pub use self::core::error::{
    EngineError, Error, IoOperation, ProvisioningError, Result, TransportError,
};
pub use self::core::session::{Cryptor, Role, SessionState};

#[cfg(feature = "async")]
pub use transport::{Completion, RawTransport, Transport, TransportResult};
