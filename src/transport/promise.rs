/*!
One-shot completions for transport operations.

A [`Promise`] is the producing half held by the transport; the matching
[`Completion`] is handed to the caller and resolves exactly once. A promise
dropped without being resolved fails its completion with
[`TransportError::Cancelled`].
*/

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::FusedFuture;
use futures::ready;
use tokio::sync::oneshot;

use crate::core::error::TransportError;

/// Outcome delivered through a completion
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Create a linked promise/completion pair
pub fn channel<T>() -> (Promise<T>, Completion<T>) {
    let (sender, receiver) = oneshot::channel();
    (
        Promise { sender },
        Completion {
            receiver,
            terminated: false,
        },
    )
}

/// Producing half of a one-shot result
#[derive(Debug)]
pub struct Promise<T> {
    sender: oneshot::Sender<TransportResult<T>>,
}

impl<T> Promise<T> {
    /// Resolve with a value
    pub fn resolve(self, value: T) {
        self.complete(Ok(value));
    }

    /// Fail with an error
    pub fn reject(self, error: TransportError) {
        self.complete(Err(error));
    }

    /// Deliver `result`; a completion nobody awaits any more is ignored
    pub fn complete(self, result: TransportResult<T>) {
        let _ = self.sender.send(result);
    }

    /// Whether the caller dropped the completion
    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Future resolving once with the result of a transport operation
#[derive(Debug)]
#[must_use = "completions do nothing unless awaited"]
pub struct Completion<T> {
    receiver: oneshot::Receiver<TransportResult<T>>,
    terminated: bool,
}

impl<T> Completion<T> {
    /// Non-blocking check; `None` while pending or once the result was taken
    pub fn try_result(&mut self) -> Option<TransportResult<T>> {
        if self.terminated {
            return None;
        }
        let result = match self.receiver.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => Err(TransportError::Cancelled),
        };
        self.terminated = true;
        Some(result)
    }
}

impl<T> Future for Completion<T> {
    type Output = TransportResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = ready!(Pin::new(&mut self.receiver).poll(cx));
        self.terminated = true;
        Poll::Ready(result.unwrap_or(Err(TransportError::Cancelled)))
    }
}

impl<T> FusedFuture for Completion<T> {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}
