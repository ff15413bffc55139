/*!
Asynchronous byte transport over a raw duplex channel.

Submitting an operation never blocks and never resolves on the caller's
stack; the result arrives through the returned [`Completion`]. Operations
in one direction complete strictly in submission order, while the two
directions proceed independently.
*/

use bytes::Bytes;

pub mod promise;
pub mod raw;
pub mod strand;

pub use promise::{Completion, Promise, TransportResult};
pub use raw::RawTransport;
pub use strand::Strand;

/// Non-blocking send/receive over a raw channel
pub trait Transport: Send + Sync {
    /// Obtain up to `size` bytes from the channel.
    ///
    /// Resolves with however many bytes one read produced; short reads are
    /// a normal outcome.
    fn receive(&self, size: usize) -> Completion<Bytes>;

    /// Write all of `data` to the channel
    fn send(&self, data: Bytes) -> Completion<()>;

    /// Quiesce pending operations.
    ///
    /// Queued operations fail with `TransportError::Cancelled`.
    fn stop(&self);
}
