/*!
Engine adapter backed by rustls.

rustls never touches a socket: wire bytes are pushed in with `read_tls` and
pulled out with `write_tls`. This module wires those calls to a pair of
shared in-memory queues so the Cryptor can ferry handshake and record
bytes to and from any raw channel.
*/

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{
    ClientConfig, ClientConnection, Connection, ServerConfig, ServerConnection,
    SupportedProtocolVersion,
};

use crate::core::constants::{DEFAULT_SERVER_NAME, MAX_BUFFER_SIZE};
use crate::core::crypto::engine::{ErrorCode, TlsEngine};
use crate::core::crypto::verifier::{certificate_fingerprint, PinnedCertVerifier};

/// In-memory byte queue shared between a session and its Cryptor.
///
/// Writes made on the Cryptor side accept at most `capacity` bytes per call;
/// writes made by the session are never truncated.
#[derive(Clone)]
pub struct MemoryBuffer {
    shared: Arc<Mutex<BufferState>>,
}

struct BufferState {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl MemoryBuffer {
    /// Create an empty buffer with the default capacity
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(BufferState {
                bytes: VecDeque::new(),
                capacity: MAX_BUFFER_SIZE,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bytes waiting in the queue
    pub fn pending(&self) -> usize {
        self.lock().bytes.len()
    }

    /// Per-call write capacity
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    fn set_capacity(&self, capacity: usize) {
        self.lock().capacity = capacity.max(1);
    }

    /// Append up to `capacity` bytes of `data`, returning how many were taken
    pub fn write_limited(&self, data: &[u8]) -> usize {
        let mut state = self.lock();
        let accepted = data.len().min(state.capacity);
        state.bytes.extend(&data[..accepted]);
        accepted
    }

    /// Move queued bytes into `output`, returning how many were moved
    pub fn read_into(&self, output: &mut [u8]) -> usize {
        let mut state = self.lock();
        let count = output.len().min(state.bytes.len());
        for (slot, byte) in output.iter_mut().zip(state.bytes.drain(..count)) {
            *slot = byte;
        }
        count
    }

    fn push(&self, data: &[u8]) {
        self.lock().bytes.extend(data);
    }
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryBuffer")
            .field("pending", &state.bytes.len())
            .field("capacity", &state.capacity)
            .finish()
    }
}

impl Read for &MemoryBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_into(buf))
    }
}

impl Write for &MemoryBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Parsed certificate chain (end-entity first)
pub struct CertificateChain(Vec<CertificateDer<'static>>);

impl CertificateChain {
    /// DER certificates in the chain
    pub fn certificates(&self) -> &[CertificateDer<'static>] {
        &self.0
    }
}

/// Parsed private key
pub struct PrivateKey(PrivateKeyDer<'static>);

/// Crypto provider plus the protocol versions sessions may negotiate
#[derive(Clone)]
pub struct TlsMethod {
    provider: Arc<CryptoProvider>,
    versions: Vec<&'static SupportedProtocolVersion>,
}

/// Method with the bound certificate chain and key
pub struct TlsContext {
    method: TlsMethod,
    certificates: Option<Vec<CertificateDer<'static>>>,
    private_key: Option<PrivateKeyDer<'static>>,
}

/// One connection's handshake and record state.
///
/// The rustls connection is only created once a role is set.
pub struct TlsSession {
    method: TlsMethod,
    certificates: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
    connection: Option<Connection>,
    incoming: Option<MemoryBuffer>,
    outgoing: Option<MemoryBuffer>,
    max_buffer_size: usize,
    available: usize,
    last_error: Option<String>,
}

impl TlsSession {
    fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::debug!("TLS session error: {}", message);
        self.last_error = Some(message);
    }

    fn attach(&mut self, mut connection: Connection) {
        connection.set_buffer_limit(Some(self.max_buffer_size));
        self.connection = Some(connection);
    }

    /// Move everything the connection wants to send into the outgoing queue
    fn flush_outgoing(&mut self) {
        let (Some(connection), Some(outgoing)) = (self.connection.as_mut(), self.outgoing.as_ref())
        else {
            return;
        };
        let mut writer: &MemoryBuffer = outgoing;
        while connection.wants_write() {
            match connection.write_tls(&mut writer) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    self.last_error = Some(e.to_string());
                    break;
                }
            }
        }
    }

    /// Feed queued incoming wire bytes to the connection.
    ///
    /// Stops early, leaving bytes queued, when rustls refuses more input
    /// because its decrypted plaintext backlog is full.
    fn pump_incoming(&mut self) -> Result<(), rustls::Error> {
        let (Some(connection), Some(incoming)) = (self.connection.as_mut(), self.incoming.as_ref())
        else {
            return Ok(());
        };
        let mut reader: &MemoryBuffer = incoming;
        while incoming.pending() > 0 {
            match connection.read_tls(&mut reader) {
                Ok(0) => break,
                Ok(_) => {
                    let state = connection.process_new_packets()?;
                    self.available = state.plaintext_bytes_to_read();
                }
                Err(e) => {
                    log::trace!("Deferring {} incoming bytes: {}", incoming.pending(), e);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Pump input, then flush output (including any alert raised by the input)
    fn advance(&mut self) -> Result<(), ErrorCode> {
        let result = self.pump_incoming();
        self.flush_outgoing();
        result.map_err(|e| {
            self.record_error(e.to_string());
            ErrorCode::Ssl
        })
    }

    fn refresh_available(&mut self) {
        if let Some(connection) = self.connection.as_mut() {
            if let Ok(state) = connection.process_new_packets() {
                self.available = state.plaintext_bytes_to_read();
            }
        }
    }
}

/// rustls-backed [`TlsEngine`]
#[derive(Clone)]
pub struct RustlsEngine {
    provider: Arc<CryptoProvider>,
    versions: Vec<&'static SupportedProtocolVersion>,
    server_name: String,
    fingerprints: BTreeSet<[u8; 32]>,
}

impl Default for RustlsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RustlsEngine {
    /// Engine using the ring provider, TLS 1.2 and 1.3, no certificate pin
    pub fn new() -> Self {
        Self {
            provider: Arc::new(rustls::crypto::ring::default_provider()),
            versions: rustls::DEFAULT_VERSIONS.to_vec(),
            server_name: DEFAULT_SERVER_NAME.to_string(),
            fingerprints: BTreeSet::new(),
        }
    }

    /// Server name a client session sends and checks against
    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = server_name.into();
        self
    }

    /// Restrict negotiable protocol versions
    pub fn with_protocol_versions(
        mut self,
        versions: &[&'static SupportedProtocolVersion],
    ) -> Self {
        self.versions = versions.to_vec();
        self
    }

    /// Only accept servers whose certificate has one of these SHA-256 fingerprints
    pub fn with_pinned_fingerprints(
        mut self,
        fingerprints: impl IntoIterator<Item = [u8; 32]>,
    ) -> Self {
        self.fingerprints.extend(fingerprints);
        self
    }

    /// Pin the end-entity certificate of a PEM chain; `None` if it does not parse
    pub fn with_pinned_certificate_pem(self, pem: &[u8]) -> Option<Self> {
        let certificate = CertificateDer::from_pem_slice(pem).ok()?;
        Some(self.with_pinned_fingerprints([certificate_fingerprint(certificate.as_ref())]))
    }
}

impl TlsEngine for RustlsEngine {
    type Certificate = CertificateChain;
    type PrivateKey = PrivateKey;
    type Method = TlsMethod;
    type Context = TlsContext;
    type Session = TlsSession;
    type Buffer = MemoryBuffer;

    fn read_certificate(&self, pem: &[u8]) -> Option<Self::Certificate> {
        let chain = CertificateDer::pem_slice_iter(pem)
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        if chain.is_empty() {
            return None;
        }
        Some(CertificateChain(chain))
    }

    fn read_private_key(&self, pem: &[u8]) -> Option<Self::PrivateKey> {
        PrivateKeyDer::from_pem_slice(pem).ok().map(PrivateKey)
    }

    fn get_method(&self) -> Option<Self::Method> {
        if self.versions.is_empty() {
            return None;
        }
        Some(TlsMethod {
            provider: self.provider.clone(),
            versions: self.versions.clone(),
        })
    }

    fn create_context(&self, method: &Self::Method) -> Option<Self::Context> {
        Some(TlsContext {
            method: method.clone(),
            certificates: None,
            private_key: None,
        })
    }

    fn use_certificate(
        &self,
        context: &mut Self::Context,
        certificate: &Self::Certificate,
    ) -> bool {
        context.certificates = Some(certificate.0.clone());
        true
    }

    fn use_private_key(&self, context: &mut Self::Context, key: &Self::PrivateKey) -> bool {
        match context.method.provider.key_provider.load_private_key(key.0.clone_key()) {
            Ok(_) => {
                context.private_key = Some(key.0.clone_key());
                true
            }
            Err(e) => {
                log::warn!("Private key not usable with provider: {}", e);
                false
            }
        }
    }

    fn create_session(&self, context: &Self::Context) -> Option<Self::Session> {
        let certificates = context.certificates.clone()?;
        let private_key = context.private_key.as_ref()?.clone_key();
        Some(TlsSession {
            method: context.method.clone(),
            certificates,
            private_key,
            connection: None,
            incoming: None,
            outgoing: None,
            max_buffer_size: MAX_BUFFER_SIZE,
            available: 0,
            last_error: None,
        })
    }

    fn create_buffers(&self) -> (Option<Self::Buffer>, Option<Self::Buffer>) {
        (Some(MemoryBuffer::new()), Some(MemoryBuffer::new()))
    }

    fn set_buffers(
        &self,
        session: &mut Self::Session,
        incoming: &Self::Buffer,
        outgoing: &Self::Buffer,
        max_buffer_size: usize,
    ) {
        incoming.set_capacity(max_buffer_size);
        outgoing.set_capacity(max_buffer_size);
        session.incoming = Some(incoming.clone());
        session.outgoing = Some(outgoing.clone());
        session.max_buffer_size = max_buffer_size.max(1);
        if let Some(connection) = session.connection.as_mut() {
            connection.set_buffer_limit(Some(session.max_buffer_size));
        }
    }

    fn set_accept_state(&self, session: &mut Self::Session) -> bool {
        let config = ServerConfig::builder_with_provider(session.method.provider.clone())
            .with_protocol_versions(&session.method.versions)
            .and_then(|builder| {
                builder
                    .with_no_client_auth()
                    .with_single_cert(session.certificates.clone(), session.private_key.clone_key())
            });

        let connection = config.and_then(|mut config| {
            config.send_tls13_tickets = 0;
            ServerConnection::new(Arc::new(config))
        });

        match connection {
            Ok(connection) => {
                log::debug!("TLS session set to accept state");
                session.attach(Connection::Server(connection));
                true
            }
            Err(e) => {
                session.record_error(e.to_string());
                false
            }
        }
    }

    fn set_connect_state(&self, session: &mut Self::Session) -> bool {
        let server_name = match ServerName::try_from(self.server_name.clone()) {
            Ok(name) => name,
            Err(e) => {
                session.record_error(format!("invalid server name {:?}: {}", self.server_name, e));
                return false;
            }
        };

        let verifier = Arc::new(PinnedCertVerifier::new(
            session.method.provider.signature_verification_algorithms,
            self.fingerprints.clone(),
        ));

        let config = ClientConfig::builder_with_provider(session.method.provider.clone())
            .with_protocol_versions(&session.method.versions)
            .and_then(|builder| {
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(verifier)
                    .with_client_auth_cert(
                        session.certificates.clone(),
                        session.private_key.clone_key(),
                    )
            });

        let connection =
            config.and_then(|config| ClientConnection::new(Arc::new(config), server_name));

        match connection {
            Ok(connection) => {
                log::debug!("TLS session set to connect state");
                session.attach(Connection::Client(connection));
                true
            }
            Err(e) => {
                session.record_error(e.to_string());
                false
            }
        }
    }

    fn is_init_finished(&self, session: &Self::Session) -> bool {
        session
            .connection
            .as_ref()
            .is_some_and(|connection| !connection.is_handshaking())
    }

    fn do_handshake(&self, session: &mut Self::Session) -> ErrorCode {
        if session.connection.is_none() {
            session.record_error("session has no role");
            return ErrorCode::Ssl;
        }
        if let Err(code) = session.advance() {
            return code;
        }
        match session.connection.as_ref() {
            Some(connection) if connection.is_handshaking() => ErrorCode::WantRead,
            _ => ErrorCode::None,
        }
    }

    fn ssl_write(&self, session: &mut Self::Session, data: &[u8]) -> Result<usize, ErrorCode> {
        let Some(connection) = session.connection.as_mut() else {
            session.record_error("session has no role");
            return Err(ErrorCode::Ssl);
        };
        let result = connection.writer().write(data);
        let written = match result {
            Ok(written) => written,
            Err(e) => {
                session.record_error(e.to_string());
                return Err(ErrorCode::Syscall);
            }
        };
        session.flush_outgoing();
        if written == 0 && !data.is_empty() {
            session.record_error("outgoing plaintext buffer full");
            return Err(ErrorCode::WantWrite);
        }
        Ok(written)
    }

    fn ssl_read(&self, session: &mut Self::Session, output: &mut [u8]) -> Result<usize, ErrorCode> {
        if session.connection.is_none() {
            session.record_error("session has no role");
            return Err(ErrorCode::Ssl);
        }
        session.advance()?;

        let Some(connection) = session.connection.as_mut() else {
            return Err(ErrorCode::Ssl);
        };
        let read = connection.reader().read(output);
        let result = match read {
            Ok(0) if !output.is_empty() => {
                session.record_error("peer closed the session");
                Err(ErrorCode::ZeroReturn)
            }
            Ok(count) => Ok(count),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                session.record_error("no complete record available");
                Err(ErrorCode::WantRead)
            }
            Err(e) => {
                session.record_error(e.to_string());
                Err(ErrorCode::Syscall)
            }
        };

        // Reading may have freed room for input deferred by pump_incoming.
        let _ = session.advance();
        session.refresh_available();
        result
    }

    fn available_bytes(&self, session: &Self::Session) -> usize {
        session.available
    }

    fn buffer_read(
        &self,
        buffer: &mut Self::Buffer,
        output: &mut [u8],
    ) -> Result<usize, ErrorCode> {
        Ok(buffer.read_into(output))
    }

    fn buffer_write(&self, buffer: &mut Self::Buffer, data: &[u8]) -> Result<usize, ErrorCode> {
        Ok(buffer.write_limited(data))
    }

    fn buffer_pending(&self, buffer: &Self::Buffer) -> usize {
        buffer.pending()
    }

    fn describe_error(&self, session: &Self::Session, code: ErrorCode) -> String {
        format!(
            "{}: {}",
            code,
            session.last_error.as_deref().unwrap_or("no further detail")
        )
    }
}
