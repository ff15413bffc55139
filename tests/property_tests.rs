use tlslink::{Cryptor, Data, Identity, Result, Role};

use proptest::prelude::*;

// Strategy for generating payloads that span several records
fn payloads() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..40_000)
}

// Strategy for generating a few small messages
fn message_batches() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 1..500), 1..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_encrypt_decrypt_roundtrip(data in payloads()) {
        let (client, server) = established_pair().unwrap();

        let mut wire = Data::new();
        client.encrypt(&mut wire, &data).unwrap();

        let mut plain = Data::new();
        server.decrypt(&mut plain, &wire).unwrap();
        prop_assert_eq!(data, plain);
    }

    #[test]
    fn test_concatenated_records_decrypt_together(batch in message_batches()) {
        let (client, server) = established_pair().unwrap();

        let mut wire = Data::new();
        for message in &batch {
            client.encrypt(&mut wire, message).unwrap();
        }

        let mut plain = Data::new();
        server.decrypt(&mut plain, &wire).unwrap();
        prop_assert_eq!(batch.concat(), plain);
    }

    #[test]
    fn test_message_tampering(
        data in prop::collection::vec(any::<u8>(), 1..1000),
        position in any::<prop::sample::Index>(),
    ) {
        let (client, server) = established_pair().unwrap();

        let mut wire = Data::new();
        client.encrypt(&mut wire, &data).unwrap();

        // skip the 5-byte record header so the record stays complete
        let index = 5 + position.index(wire.len() - 5);
        wire[index] ^= 0xFF;

        let mut plain = Data::new();
        prop_assert!(server.decrypt(&mut plain, &wire).is_err());
        prop_assert!(plain.is_empty());
    }
}

// Helper function to set up an established pair of sessions
fn established_pair() -> Result<(Cryptor, Cryptor)> {
    let client = Cryptor::with_rustls(identity(), Role::Client);
    let server = Cryptor::with_rustls(identity(), Role::Server);
    client.init()?;
    server.init()?;

    while !(client.is_active() && server.is_active()) {
        client.do_handshake()?;
        server.write_handshake_buffer(&client.read_handshake_buffer()?)?;
        server.do_handshake()?;
        client.write_handshake_buffer(&server.read_handshake_buffer()?)?;
    }
    // deliver the client's final flight
    server.write_handshake_buffer(&client.read_handshake_buffer()?)?;
    server.do_handshake()?;

    Ok((client, server))
}

fn identity() -> Identity {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    Identity::from_pem(certified.cert.pem(), certified.key_pair.serialize_pem())
}
