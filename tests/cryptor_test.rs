// tests/cryptor_test.rs
use rustls::pki_types::CertificateDer;
use rustls::pki_types::pem::PemObject;
use tlslink::{
    Cryptor, Data, Error, ErrorCode, Identity, Result, Role, RustlsEngine, SessionState,
    certificate_fingerprint,
};

fn identity() -> Identity {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    Identity::from_pem(certified.cert.pem(), certified.key_pair.serialize_pem())
}

fn pair_with(client_engine: RustlsEngine, server_engine: RustlsEngine) -> (Cryptor, Cryptor) {
    let client = Cryptor::new(client_engine, identity(), Role::Client);
    let server = Cryptor::new(server_engine, identity(), Role::Server);
    (client, server)
}

/// Alternate handshake steps, ferrying bytes in memory, until both sides
/// report completion or the round limit is hit.
fn run_handshake(client: &Cryptor, server: &Cryptor) -> Result<usize> {
    for round in 1..=10 {
        let client_done = client.do_handshake()?;
        let to_server = client.read_handshake_buffer()?;
        server.write_handshake_buffer(&to_server)?;

        let server_done = server.do_handshake()?;
        let to_client = server.read_handshake_buffer()?;
        client.write_handshake_buffer(&to_client)?;

        if client_done && server_done && to_server.is_empty() && to_client.is_empty() {
            return Ok(round);
        }
    }
    panic!("handshake did not converge");
}

fn transfer(from: &Cryptor, to: &Cryptor, payload: &[u8]) -> Result<Data> {
    let mut wire = Data::new();
    let produced = from.encrypt(&mut wire, payload)?;
    assert_eq!(produced, wire.len());

    let mut plain = Data::new();
    let consumed = to.decrypt(&mut plain, &wire)?;
    assert_eq!(consumed, plain.len());
    Ok(plain)
}

#[test]
fn test_handshake_converges() -> Result<()> {
    let (client, server) = pair_with(RustlsEngine::new(), RustlsEngine::new());
    client.init()?;
    server.init()?;
    assert_eq!(client.state(), SessionState::Initialized);

    assert!(run_handshake(&client, &server)? <= 4);
    assert!(client.is_active());
    assert!(server.is_active());

    // once complete, further steps keep reporting completion
    assert!(client.do_handshake()?);
    assert!(server.do_handshake()?);
    Ok(())
}

#[test]
fn test_first_handshake_step_produces_hello() -> Result<()> {
    let (client, server) = pair_with(RustlsEngine::new(), RustlsEngine::new());
    client.init()?;
    server.init()?;

    assert!(!client.do_handshake()?);
    let hello = client.read_handshake_buffer()?;
    assert!(!hello.is_empty());
    assert_eq!(hello[0], 0x16, "handshake record expected");

    // nothing more is produced until the peer answers
    assert!(client.read_handshake_buffer()?.is_empty());

    // the server has nothing to say before it hears from the client
    assert!(!server.do_handshake()?);
    assert!(server.read_handshake_buffer()?.is_empty());
    Ok(())
}

#[test]
fn test_ping_round_trip() -> Result<()> {
    let (client, server) = pair_with(RustlsEngine::new(), RustlsEngine::new());
    client.init()?;
    server.init()?;
    run_handshake(&client, &server)?;

    let mut wire = Data::new();
    client.encrypt(&mut wire, b"ping")?;
    assert!(wire.len() > 4);
    assert!(!wire.windows(4).any(|w| w == b"ping"));

    let mut plain = Data::new();
    assert_eq!(server.decrypt(&mut plain, &wire)?, 4);
    assert_eq!(plain, b"ping");

    assert_eq!(transfer(&server, &client, b"pong")?, b"pong");
    Ok(())
}

#[test]
fn test_outputs_are_appended() -> Result<()> {
    let (client, server) = pair_with(RustlsEngine::new(), RustlsEngine::new());
    client.init()?;
    server.init()?;
    run_handshake(&client, &server)?;

    let mut wire = vec![0xAA];
    let produced = client.encrypt(&mut wire, b"data")?;
    assert_eq!(wire.len(), produced + 1);
    assert_eq!(wire[0], 0xAA);

    let mut plain = b"prefix:".to_vec();
    server.decrypt(&mut plain, &wire[1..])?;
    assert_eq!(plain, b"prefix:data");
    Ok(())
}

#[test]
fn test_large_payloads_both_directions() -> Result<()> {
    let (client, server) = pair_with(RustlsEngine::new(), RustlsEngine::new());
    client.init()?;
    server.init()?;
    run_handshake(&client, &server)?;

    for size in [1, 1000, 16 * 1024, 20 * 1024 + 1, 100 * 1024] {
        let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let to_server = transfer(&client, &server, &payload)?;
        assert_eq!(to_server, payload, "client to server, {} bytes", size);
        let to_client = transfer(&server, &client, &payload)?;
        assert_eq!(to_client, payload, "server to client, {} bytes", size);
    }
    Ok(())
}

#[test]
fn test_small_buffer_capacity() -> Result<()> {
    let config = tlslink::CryptorConfig::client().with_buffer_size(512);
    let client = Cryptor::with_config(RustlsEngine::new(), identity(), config);
    let server = Cryptor::with_config(
        RustlsEngine::new(),
        identity(),
        tlslink::CryptorConfig::server().with_buffer_size(512),
    );
    client.init()?;
    server.init()?;
    run_handshake(&client, &server)?;

    let payload = vec![7u8; 8 * 1024];
    assert_eq!(transfer(&client, &server, &payload)?, payload);
    Ok(())
}

#[test]
fn test_tls12_only() -> Result<()> {
    let versions = [&rustls::version::TLS12];
    let (client, server) = pair_with(
        RustlsEngine::new().with_protocol_versions(&versions),
        RustlsEngine::new().with_protocol_versions(&versions),
    );
    client.init()?;
    server.init()?;
    run_handshake(&client, &server)?;

    assert_eq!(transfer(&client, &server, b"legacy")?, b"legacy");
    Ok(())
}

#[test]
fn test_pinned_fingerprint() -> Result<()> {
    let server_identity = identity();
    let pinned = RustlsEngine::new()
        .with_pinned_certificate_pem(server_identity.certificate_pem())
        .expect("server certificate parses");

    let client = Cryptor::new(pinned, identity(), Role::Client);
    let server = Cryptor::new(RustlsEngine::new(), server_identity, Role::Server);
    client.init()?;
    server.init()?;
    run_handshake(&client, &server)?;
    assert!(client.is_active());
    Ok(())
}

#[test]
fn test_fingerprint_mismatch_fails_handshake() -> Result<()> {
    let other = identity();
    let der = CertificateDer::from_pem_slice(other.certificate_pem()).unwrap();
    let client_engine =
        RustlsEngine::new().with_pinned_fingerprints([certificate_fingerprint(&der)]);
    let (client, server) = pair_with(client_engine, RustlsEngine::new());
    client.init()?;
    server.init()?;

    match run_handshake(&client, &server) {
        Err(Error::Handshake { code, detail }) => {
            assert_eq!(code, ErrorCode::Ssl);
            assert!(detail.contains("fingerprint"), "{}", detail);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!client.is_active());
    Ok(())
}

#[test]
fn test_bad_identity_fails_init() {
    let broken = Identity::from_pem("not a certificate", "not a key");
    let cryptor = Cryptor::with_rustls(broken, Role::Server);

    assert!(matches!(cryptor.init(), Err(Error::Provisioning(_))));
    assert_eq!(cryptor.state(), SessionState::Uninitialized);
    cryptor.deinit();
}

#[test]
fn test_teardown_and_reinit() -> Result<()> {
    let (client, server) = pair_with(RustlsEngine::new(), RustlsEngine::new());
    client.init()?;
    server.init()?;
    run_handshake(&client, &server)?;

    client.deinit();
    assert!(!client.is_active());
    assert_eq!(client.state(), SessionState::Closed);

    let mut out = Data::new();
    assert!(matches!(client.encrypt(&mut out, b"late"), Err(Error::InvalidState { .. })));
    client.deinit();

    // a fresh session after re-provisioning
    server.deinit();
    client.init()?;
    server.init()?;
    run_handshake(&client, &server)?;
    assert_eq!(transfer(&client, &server, b"again")?, b"again");
    Ok(())
}

#[test]
fn test_tampered_record_is_rejected() -> Result<()> {
    let (client, server) = pair_with(RustlsEngine::new(), RustlsEngine::new());
    client.init()?;
    server.init()?;
    run_handshake(&client, &server)?;

    let mut wire = Data::new();
    client.encrypt(&mut wire, b"integrity")?;
    let last = wire.len() - 1;
    wire[last] ^= 0x01;

    let mut plain = b"kept".to_vec();
    match server.decrypt(&mut plain, &wire) {
        Err(Error::Io { code, .. }) => assert_eq!(code, ErrorCode::Ssl),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(plain, b"kept");
    Ok(())
}

#[test]
fn test_dropped_record_breaks_following_decrypt() -> Result<()> {
    let (client, server) = pair_with(RustlsEngine::new(), RustlsEngine::new());
    client.init()?;
    server.init()?;
    run_handshake(&client, &server)?;

    // records carry an implicit sequence number, so one lost record desynchronizes the pair
    let mut lost = Data::new();
    client.encrypt(&mut lost, b"never delivered")?;

    let mut wire = Data::new();
    client.encrypt(&mut wire, b"next")?;
    let mut plain = Data::new();
    match server.decrypt(&mut plain, &wire) {
        Err(Error::Io { code, .. }) => assert_eq!(code, ErrorCode::Ssl),
        other => panic!("unexpected {:?}", other),
    }

    // a fresh pair is unaffected
    let (client, server) = pair_with(RustlsEngine::new(), RustlsEngine::new());
    client.init()?;
    server.init()?;
    run_handshake(&client, &server)?;
    assert_eq!(transfer(&client, &server, b"next")?, b"next");
    Ok(())
}

#[test]
fn test_concurrent_encrypt_and_decrypt() -> Result<()> {
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;

    const MESSAGES: usize = 500;

    let (client, server) = pair_with(RustlsEngine::new(), RustlsEngine::new());
    client.init()?;
    server.init()?;
    run_handshake(&client, &server)?;
    let client = Arc::new(client);
    let server = Arc::new(server);

    fn sender(
        from: Arc<Cryptor>,
        tag: &'static str,
        records: mpsc::Sender<Data>,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            for i in 0..MESSAGES {
                let mut wire = Data::new();
                from.encrypt(&mut wire, format!("{tag}-{i}").as_bytes()).unwrap();
                records.send(wire).unwrap();
            }
        })
    }

    fn receiver(
        to: Arc<Cryptor>,
        tag: &'static str,
        records: mpsc::Receiver<Data>,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            for i in 0..MESSAGES {
                let wire = records.recv().unwrap();
                let mut plain = Data::new();
                to.decrypt(&mut plain, &wire).unwrap();
                assert_eq!(plain, format!("{tag}-{i}").into_bytes());
            }
        })
    }

    let (to_server, from_client) = mpsc::channel();
    let (to_client, from_server) = mpsc::channel();

    let handles = [
        sender(client.clone(), "client", to_server),
        sender(server.clone(), "server", to_client),
        receiver(server.clone(), "client", from_client),
        receiver(client.clone(), "server", from_server),
    ];
    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    assert!(client.is_active());
    assert!(server.is_active());
    assert_eq!(transfer(&client, &server, b"after")?, b"after");
    Ok(())
}
