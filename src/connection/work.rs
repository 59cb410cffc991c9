//! In-flight request bookkeeping.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll},
};

use dashmap::DashMap;
use tokio::sync::oneshot;

use super::NetworkError;
use crate::message::DecodedMessage;

type Completion = Result<DecodedMessage, NetworkError>;
type Waiters = DashMap<i32, oneshot::Sender<Completion>>;

/// Pending callers keyed by the request id they wait on.
#[derive(Debug, Default)]
pub(super) struct WorkQueue(Arc<Waiters>);

impl WorkQueue {
    /// Register a caller for `request_id`, replacing any stale registration.
    ///
    /// `closed` is reported if the connection goes away without failing the
    /// caller explicitly.
    pub(super) fn register(&self, request_id: i32, closed: NetworkError) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        self.0.insert(request_id, tx);
        PendingResponse {
            request_id,
            rx,
            closed,
            waiters: Arc::downgrade(&self.0),
        }
    }

    /// Complete the caller waiting on `message`, if any.
    pub(super) fn complete(&self, message: &DecodedMessage) -> bool {
        match self.0.remove(&message.response_to()) {
            Some((_, tx)) => tx.send(Ok(message.clone())).is_ok(),
            None => false,
        }
    }

    /// Fail every pending caller with `error`.
    pub(super) fn fail_all(&self, error: &NetworkError) {
        let ids: Vec<i32> = self.0.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.0.remove(&id) {
                let _ = tx.send(Err(error.clone()));
            }
        }
    }

    pub(super) fn len(&self) -> usize { self.0.len() }
}

/// Future resolving to the response for a request sent with
/// [`Connection::send_request`](super::Connection::send_request).
///
/// Resolves to the connection's terminal [`NetworkError`] if the connection
/// is torn down first. Dropping it withdraws the request from the
/// connection's queue.
#[derive(Debug)]
pub struct PendingResponse {
    request_id: i32,
    rx: oneshot::Receiver<Completion>,
    closed: NetworkError,
    waiters: Weak<Waiters>,
}

impl PendingResponse {
    /// Request id this future waits on.
    #[must_use]
    pub const fn request_id(&self) -> i32 { self.request_id }
}

impl Future for PendingResponse {
    type Output = Completion;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(completion)) => Poll::Ready(completion),
            Poll::Ready(Err(_)) => Poll::Ready(Err(self.closed.clone())),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(waiters) = self.waiters.upgrade() {
            // A newer registration under the same id keeps an open sender.
            waiters.remove_if(&self.request_id, |_, tx| tx.is_closed());
        }
    }
}
