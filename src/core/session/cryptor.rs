/*!
The Cryptor: one TLS session driven entirely through memory buffers.

A Cryptor owns its identity material, context, session and buffer pair.
It converts plaintext into the session's wire bytes and back, and drives a
resumable, non-blocking handshake whose bytes the caller ferries to the
peer with [`Cryptor::read_handshake_buffer`] and
[`Cryptor::write_handshake_buffer`].

Every public operation takes the same lock. No operation performs real
I/O or suspends, so the lock is never held across an await point.
*/

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::buffer::{Data, DataBuffer, DataConstBuffer};
use crate::core::crypto::config::CryptorConfig;
use crate::core::crypto::engine::{ErrorCode, TlsEngine};
use crate::core::crypto::identity::Identity;
use crate::core::crypto::rustls_engine::RustlsEngine;
use crate::core::error::{EngineError, Error, IoOperation, ProvisioningError, Result};
use crate::core::hex::HexPreview;
use crate::core::session::state::{Role, SessionState, StateManager};
use crate::invalid_state_err;

/// Incoming and outgoing memory buffers attached to one session
struct BufferPair<B> {
    /// Wire bytes from the peer, consumed by the session
    incoming: B,
    /// Wire bytes produced by the session for the peer
    outgoing: B,
}

/// Session and its buffers; created and released together
struct SessionLink<E: TlsEngine> {
    session: E::Session,
    buffers: BufferPair<E::Buffer>,
}

/// Engine state owned by a Cryptor
struct Inner<E: TlsEngine> {
    certificate: Option<E::Certificate>,
    private_key: Option<E::PrivateKey>,
    context: Option<E::Context>,
    link: Option<SessionLink<E>>,
    state: StateManager,
}

impl<E: TlsEngine> Inner<E> {
    fn new(role: Role) -> Self {
        Self {
            certificate: None,
            private_key: None,
            context: None,
            link: None,
            state: StateManager::new(role),
        }
    }

    fn link_mut(&mut self) -> Result<&mut SessionLink<E>> {
        let actual = self.state.state();
        match self.link.as_mut() {
            Some(link) => Ok(link),
            None => invalid_state_err!("Initialized", actual),
        }
    }
}

/// Encrypts and decrypts one session's traffic through in-memory buffers
pub struct Cryptor<E: TlsEngine = RustlsEngine> {
    engine: E,
    identity: Identity,
    config: CryptorConfig,
    inner: Mutex<Inner<E>>,
}

impl Cryptor<RustlsEngine> {
    /// Cryptor on the default rustls engine
    pub fn with_rustls(identity: Identity, role: Role) -> Self {
        Self::new(RustlsEngine::new(), identity, role)
    }
}

impl<E: TlsEngine> Cryptor<E> {
    /// Create a Cryptor with the default buffer capacity
    pub fn new(engine: E, identity: Identity, role: Role) -> Self {
        let config = CryptorConfig {
            role,
            ..CryptorConfig::default()
        };
        Self::with_config(engine, identity, config)
    }

    /// Create a Cryptor from a full configuration
    pub fn with_config(engine: E, identity: Identity, config: CryptorConfig) -> Self {
        Self {
            engine,
            identity,
            config,
            inner: Mutex::new(Inner::new(config.role)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept or connect role
    pub fn role(&self) -> Role {
        self.lock().state.role()
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.lock().state.state()
    }

    /// Establish all engine state.
    ///
    /// Steps run in a fixed order and the first failure is raised. Handles
    /// are only stored once every step succeeded, so a failed init leaves
    /// nothing behind.
    pub fn init(&self) -> Result<()> {
        let mut inner = self.lock();
        if !inner.state.can_init() {
            return invalid_state_err!("Uninitialized or Closed", inner.state.state());
        }

        let engine = &self.engine;

        let certificate = engine
            .read_certificate(self.identity.certificate_pem())
            .ok_or(Error::Provisioning(ProvisioningError::ReadCertificate))?;

        let private_key = engine
            .read_private_key(self.identity.private_key_pem())
            .ok_or(Error::Provisioning(ProvisioningError::ReadPrivateKey))?;

        let method = engine.get_method().ok_or(Error::Engine(EngineError::Method))?;

        let mut context = engine
            .create_context(&method)
            .ok_or(Error::Engine(EngineError::ContextCreation))?;

        if !engine.use_certificate(&mut context, &certificate) {
            return Err(Error::Engine(EngineError::UseCertificate));
        }

        if !engine.use_private_key(&mut context, &private_key) {
            return Err(Error::Engine(EngineError::UsePrivateKey));
        }

        let mut session = engine
            .create_session(&context)
            .ok_or(Error::Engine(EngineError::HandlerCreation))?;

        let (incoming, outgoing) = engine.create_buffers();
        let incoming = incoming.ok_or(Error::Engine(EngineError::ReadBufferCreation))?;
        let outgoing = outgoing.ok_or(Error::Engine(EngineError::WriteBufferCreation))?;

        engine.set_buffers(&mut session, &incoming, &outgoing, self.config.max_buffer_size);

        let role = inner.state.role();
        let role_set = match role {
            Role::Server => engine.set_accept_state(&mut session),
            Role::Client => engine.set_connect_state(&mut session),
        };
        if !role_set {
            return Err(Error::Engine(EngineError::SetRole));
        }

        inner.certificate = Some(certificate);
        inner.private_key = Some(private_key);
        inner.context = Some(context);
        inner.link = Some(SessionLink {
            session,
            buffers: BufferPair { incoming, outgoing },
        });
        inner.state.transition_to_initialized();

        log::debug!("{} cryptor initialized", role);
        Ok(())
    }

    /// Release all engine state.
    ///
    /// Session and buffers go first, then context, certificate and key.
    /// Safe to call repeatedly or before `init`.
    pub fn deinit(&self) {
        let mut inner = self.lock();

        if let Some(link) = inner.link.take() {
            let SessionLink { session, buffers } = link;
            drop(session);
            drop(buffers);
        }
        drop(inner.context.take());
        drop(inner.certificate.take());
        drop(inner.private_key.take());

        if inner.state.has_engine_state() {
            log::debug!("{} cryptor released", inner.state.role());
            inner.state.transition_to_closed();
        }
    }

    /// Run one non-blocking handshake step.
    ///
    /// Returns `Ok(false)` when more bytes from the peer are needed and
    /// `Ok(true)` once the handshake has completed.
    pub fn do_handshake(&self) -> Result<bool> {
        let mut inner = self.lock();
        if !inner.state.can_handshake() {
            return invalid_state_err!("Initialized", inner.state.state());
        }

        let role = inner.state.role();
        let link = inner.link_mut()?;

        let code = if role == Role::Server && self.engine.is_init_finished(&link.session) {
            ErrorCode::None
        } else {
            self.engine.do_handshake(&mut link.session)
        };

        match code {
            ErrorCode::WantRead => {
                inner.state.transition_to_handshaking();
                Ok(false)
            }
            ErrorCode::None => {
                if !inner.state.can_transfer_data() {
                    log::debug!("{} handshake complete", role);
                }
                inner.state.transition_to_active();
                Ok(true)
            }
            code => {
                let detail = self.engine.describe_error(&link.session, code);
                log::error!("{} handshake failed: {}", role, detail);
                Err(Error::Handshake { code, detail })
            }
        }
    }

    /// Encrypt all of `input`, appending the produced wire bytes to `output`.
    ///
    /// Returns the number of wire bytes appended.
    pub fn encrypt(&self, output: &mut Data, input: &[u8]) -> Result<usize> {
        let mut inner = self.lock();
        if !inner.state.can_transfer_data() {
            return invalid_state_err!(SessionState::Active, inner.state.state());
        }
        let link = inner.link_mut()?;

        let mut total_written = 0;
        while total_written < input.len() {
            let current = DataConstBuffer::with_offset(input, total_written);
            match self.engine.ssl_write(&mut link.session, current.as_slice()) {
                Ok(written) if written > 0 => total_written += written,
                result => {
                    let code = result.err().unwrap_or(ErrorCode::Syscall);
                    return Err(self.io_error(&link.session, IoOperation::SslWrite, code));
                }
            }
        }

        let produced = self.drain(link, output)?;
        log::trace!("Encrypted {} -> {} bytes: {}", input.len(), produced, HexPreview(input));
        Ok(produced)
    }

    /// Decrypt `input`, appending every currently decryptable byte to `output`.
    ///
    /// Returns the number of plaintext bytes appended. On error `output` is
    /// restored to its previous length.
    pub fn decrypt(&self, output: &mut Data, input: &[u8]) -> Result<usize> {
        let mut inner = self.lock();
        if !inner.state.can_transfer_data() {
            return invalid_state_err!(SessionState::Active, inner.state.state());
        }
        let link = inner.link_mut()?;

        self.fill(link, input)?;

        let begin_offset = output.len();
        output.resize(begin_offset + 1, 0);

        let mut available_bytes = 1;
        let mut total_read = 0;

        while available_bytes > 0 {
            let mut current = DataBuffer::with_offset(output, begin_offset + total_read);
            match self.engine.ssl_read(&mut link.session, current.as_mut_slice()) {
                Ok(read) if read > 0 => total_read += read,
                result => {
                    output.truncate(begin_offset);
                    let code = result.err().unwrap_or(ErrorCode::Syscall);
                    return Err(self.io_error(&link.session, IoOperation::SslRead, code));
                }
            }

            available_bytes = self.engine.available_bytes(&link.session);
            output.resize(output.len() + available_bytes, 0);
        }

        output.truncate(begin_offset + total_read);
        log::trace!(
            "Decrypted {} -> {} bytes: {}",
            input.len(),
            total_read,
            HexPreview(&output[begin_offset..])
        );
        Ok(total_read)
    }

    /// Take the wire bytes the session produced during the handshake
    pub fn read_handshake_buffer(&self) -> Result<Data> {
        let mut inner = self.lock();
        let link = inner.link_mut()?;

        let mut output = Data::new();
        self.drain(link, &mut output)?;
        Ok(output)
    }

    /// Hand handshake wire bytes received from the peer to the session
    pub fn write_handshake_buffer(&self, input: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        let link = inner.link_mut()?;
        self.fill(link, input)
    }

    /// Whether the handshake completed and the session was not torn down
    pub fn is_active(&self) -> bool {
        self.lock().state.can_transfer_data()
    }

    /// Empty the outgoing buffer into `output`
    fn drain(&self, link: &mut SessionLink<E>, output: &mut Data) -> Result<usize> {
        let pending = self.engine.buffer_pending(&link.buffers.outgoing);

        let begin_offset = output.len();
        output.resize(begin_offset + pending, 0);
        let mut total_read = 0;

        while total_read < pending {
            let mut current = DataBuffer::with_offset(output, begin_offset + total_read);
            match self
                .engine
                .buffer_read(&mut link.buffers.outgoing, current.as_mut_slice())
            {
                Ok(read) if read > 0 => total_read += read,
                result => {
                    output.truncate(begin_offset + total_read);
                    let code = result.err().unwrap_or(ErrorCode::Syscall);
                    return Err(self.io_error(&link.session, IoOperation::BufferRead, code));
                }
            }
        }

        if pending > 0 {
            log::trace!("Outgoing {} bytes: {}", pending, HexPreview(&output[begin_offset..]));
        }
        Ok(total_read)
    }

    /// Push all of `input` into the incoming buffer
    fn fill(&self, link: &mut SessionLink<E>, input: &[u8]) -> Result<()> {
        let mut total_written = 0;

        while total_written < input.len() {
            let current = DataConstBuffer::with_offset(input, total_written);
            match self
                .engine
                .buffer_write(&mut link.buffers.incoming, current.as_slice())
            {
                Ok(written) if written > 0 => total_written += written,
                result => {
                    let code = result.err().unwrap_or(ErrorCode::Syscall);
                    return Err(self.io_error(&link.session, IoOperation::BufferWrite, code));
                }
            }
        }

        if !input.is_empty() {
            log::trace!("Incoming {} bytes: {}", input.len(), HexPreview(input));
        }
        Ok(())
    }

    fn io_error(&self, session: &E::Session, op: IoOperation, code: ErrorCode) -> Error {
        let detail = self.engine.describe_error(session, code);
        log::warn!("{} failed: {}", op, detail);
        Error::Io { op, code, detail }
    }
}

impl<E: TlsEngine> Drop for Cryptor<E> {
    fn drop(&mut self) {
        self.deinit();
    }
}
