use bytes::Bytes;
use tlslink::{
    Cryptor, Data, Identity, MAX_BUFFER_SIZE, RawTransport, Result, Role, Transport, TransportError,
};
use tokio::net::{TcpListener, TcpStream};

/// TLS record header: type, version, length
const RECORD_HEADER_LEN: usize = 5;

fn identity() -> Identity {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .expect("Failed to generate certificate");
    Identity::from_pem(certified.cert.pem(), certified.key_pair.serialize_pem())
}

/// Step the handshake, shipping each produced flight, until it completes
async fn handshake(cryptor: &Cryptor, transport: &impl Transport) -> Result<()> {
    loop {
        let done = cryptor.do_handshake()?;
        let outgoing = cryptor.read_handshake_buffer()?;
        if !outgoing.is_empty() {
            transport.send(Bytes::from(outgoing)).await?;
        }
        if done {
            return Ok(());
        }

        let incoming = transport.receive(MAX_BUFFER_SIZE).await?;
        cryptor.write_handshake_buffer(&incoming)?;
    }
}

/// Receive until one complete record is buffered, then decrypt it
async fn receive_message(cryptor: &Cryptor, transport: &impl Transport) -> Result<Data> {
    let mut wire = Data::new();
    loop {
        if wire.len() >= RECORD_HEADER_LEN {
            let length = u16::from_be_bytes([wire[3], wire[4]]) as usize;
            if wire.len() >= RECORD_HEADER_LEN + length {
                break;
            }
        }
        wire.extend_from_slice(&transport.receive(MAX_BUFFER_SIZE).await?);
    }

    let mut plain = Data::new();
    cryptor.decrypt(&mut plain, &wire)?;
    Ok(plain)
}

async fn send_message(cryptor: &Cryptor, transport: &impl Transport, message: &[u8]) -> Result<()> {
    let mut wire = Data::new();
    cryptor.encrypt(&mut wire, message)?;
    transport.send(Bytes::from(wire)).await?;
    Ok(())
}

async fn run_server(listener: TcpListener, identity: Identity) -> Result<()> {
    let (stream, peer) = listener.accept().await.map_err(TransportError::from)?;
    println!("[server] accepted {}", peer);

    let transport = RawTransport::from_stream(stream)?;
    let cryptor = Cryptor::with_rustls(identity, Role::Server);
    cryptor.init()?;

    handshake(&cryptor, &transport).await?;
    println!("[server] handshake complete");

    // the server speaks first so no data rides along with its final handshake flight
    send_message(&cryptor, &transport, b"ping").await?;
    let reply = receive_message(&cryptor, &transport).await?;
    println!("[server] received {:?}", String::from_utf8_lossy(&reply));

    transport.stop();
    cryptor.deinit();
    Ok(())
}

async fn run_client(address: std::net::SocketAddr, identity: Identity) -> Result<()> {
    let stream = TcpStream::connect(address).await.map_err(TransportError::from)?;
    let transport = RawTransport::from_stream(stream)?;
    let cryptor = Cryptor::with_rustls(identity, Role::Client);
    cryptor.init()?;

    handshake(&cryptor, &transport).await?;
    println!("[client] handshake complete");

    let message = receive_message(&cryptor, &transport).await?;
    println!("[client] received {:?}", String::from_utf8_lossy(&message));
    send_message(&cryptor, &transport, b"pong").await?;

    transport.stop();
    cryptor.deinit();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("Secure Transport Loopback Example");
    println!("=================================");

    let listener = TcpListener::bind("127.0.0.1:0").await.map_err(TransportError::from)?;
    let address = listener.local_addr().map_err(TransportError::from)?;
    println!("Listening on {}", address);

    let server = tokio::spawn(run_server(listener, identity()));
    run_client(address, identity()).await?;

    server.await.expect("Server task panicked")?;
    println!("Done");
    Ok(())
}
