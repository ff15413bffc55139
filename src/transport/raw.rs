/*!
Transport over a raw duplex channel.

`RawTransport` binds the [`Transport`] operations to an inbound reader and
an outbound writer, e.g. the bulk-in/bulk-out endpoint files of a USB
function or the two halves of a socket. Each direction has its own
[`Strand`], so receives are serialized among themselves and sends among
themselves, and the two directions never wait on each other.
*/

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::runtime::Handle;
use tokio::sync::{Mutex, watch};

use super::promise::{self, Completion, TransportResult};
use super::strand::Strand;
use super::Transport;
use crate::core::constants::MAX_RECEIVE_SIZE;
use crate::core::error::TransportError;
use crate::core::hex::HexPreview;

/// Concrete transport over an `AsyncRead`/`AsyncWrite` pair.
///
/// A receive reads at most [`MAX_RECEIVE_SIZE`] bytes, whatever size was
/// requested.
pub struct RawTransport<R, W> {
    reader: Arc<Mutex<R>>,
    writer: Arc<Mutex<W>>,
    receive_strand: Strand,
    send_strand: Strand,
    stopped: watch::Sender<bool>,
}

impl<R, W> RawTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Bind to an inbound and an outbound endpoint.
    ///
    /// Must be called from within a Tokio runtime; the strands are spawned
    /// on it.
    pub fn new(reader: R, writer: W) -> TransportResult<Self> {
        let handle = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let (stopped, _) = watch::channel(false);

        Ok(Self {
            reader: Arc::new(Mutex::new(reader)),
            writer: Arc::new(Mutex::new(writer)),
            receive_strand: Strand::spawn_on(&handle, "receive"),
            send_strand: Strand::spawn_on(&handle, "send"),
            stopped,
        })
    }

    /// Whether `stop` was called
    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }
}

impl<S> RawTransport<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Bind to one bidirectional descriptor
    pub fn from_stream(stream: S) -> TransportResult<Self> {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

impl RawTransport<tokio::fs::File, tokio::fs::File> {
    /// Bind to two already opened endpoint files (inbound, outbound)
    pub fn from_endpoints(
        inbound: std::fs::File,
        outbound: std::fs::File,
    ) -> TransportResult<Self> {
        Self::new(
            tokio::fs::File::from_std(inbound),
            tokio::fs::File::from_std(outbound),
        )
    }
}

impl<R, W> Transport for RawTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn receive(&self, size: usize) -> Completion<Bytes> {
        let (promise, completion) = promise::channel();
        let reader = self.reader.clone();
        let mut stopped = self.stopped.subscribe();

        self.receive_strand.post(async move {
            if *stopped.borrow() {
                promise.reject(TransportError::Cancelled);
                return;
            }
            if promise.is_abandoned() {
                trace!("Skipping abandoned receive of {} bytes", size);
                return;
            }
            if size == 0 {
                promise.resolve(Bytes::new());
                return;
            }

            let mut buffer = BytesMut::zeroed(size.min(MAX_RECEIVE_SIZE));
            let mut reader = reader.lock().await;

            let result = tokio::select! {
                biased;
                _ = stopped.wait_for(|stopped| *stopped) => Err(TransportError::Cancelled),
                read = reader.read(&mut buffer) => read.map_err(TransportError::from),
            };

            match result {
                Ok(0) => {
                    debug!("Receive of {} bytes hit end of channel", size);
                    promise.reject(TransportError::Disconnected);
                }
                Ok(read) => {
                    buffer.truncate(read);
                    trace!("Received {} of {} bytes: {}", read, size, HexPreview(&buffer));
                    promise.resolve(buffer.freeze());
                }
                Err(e) => {
                    if e != TransportError::Cancelled {
                        warn!("Receive failed: {}", e);
                    }
                    promise.reject(e);
                }
            }
        });

        completion
    }

    fn send(&self, data: Bytes) -> Completion<()> {
        let (promise, completion) = promise::channel();
        let writer = self.writer.clone();
        let stopped = self.stopped.subscribe();

        self.send_strand.post(async move {
            if *stopped.borrow() {
                promise.reject(TransportError::Cancelled);
                return;
            }

            // Started writes run to the end even if stop() arrives meanwhile
            let mut writer = writer.lock().await;
            let result = async {
                writer.write_all(&data).await?;
                writer.flush().await
            }
            .await;

            match result {
                Ok(()) => {
                    trace!("Sent {} bytes: {}", data.len(), HexPreview(&data));
                    promise.resolve(());
                }
                Err(e) => {
                    let error = TransportError::from(e);
                    warn!("Send of {} bytes failed: {}", data.len(), error);
                    promise.reject(error);
                }
            }
        });

        completion
    }

    fn stop(&self) {
        if !self.stopped.send_replace(true) {
            debug!(
                "Transport stopped ({} and {} strands draining)",
                self.receive_strand.name(),
                self.send_strand.name()
            );
        }
    }
}

impl<R, W> Drop for RawTransport<R, W> {
    fn drop(&mut self) {
        self.stopped.send_replace(true);
    }
}
