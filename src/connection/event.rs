//! Notifications emitted by connections.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc;

use super::{ConnectionId, NetworkError};
use crate::{
    frame::FramingError,
    message::{DecodeError, DecodedMessage},
};

/// What happened on a connection.
#[derive(Debug)]
pub enum EventKind {
    /// The transport is established and the connection is ready.
    Connect,
    /// The transport closed; carries a synthesized `Closed` error.
    Close(NetworkError),
    /// The transport failed.
    Error(NetworkError),
    /// The transport stayed idle past the socket timeout.
    Timeout(NetworkError),
    /// A frame was rejected by the frame parser. Not fatal.
    ParseError(FramingError),
    /// A complete message was decoded.
    Message(DecodedMessage),
    /// A complete frame could not be decoded. Not fatal.
    MessageError(DecodeError),
}

impl EventKind {
    /// Returns `true` for events after which the connection is destroyed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Close(_) | Self::Error(_) | Self::Timeout(_))
    }
}

/// An [`EventKind`] tagged with the connection that produced it.
#[derive(Debug)]
pub struct ConnectionEvent {
    /// Connection that produced the event.
    pub id: ConnectionId,
    /// The event itself.
    pub kind: EventKind,
}

/// Sending half of an event channel.
///
/// Several connections may share one sink; events stay distinguishable
/// through their [`ConnectionId`].
#[derive(Clone, Debug)]
pub struct EventSink(mpsc::UnboundedSender<ConnectionEvent>);

impl EventSink {
    /// Deliver `kind` for connection `id`. Dropped silently once the receiver
    /// is gone.
    pub(crate) fn emit(&self, id: ConnectionId, kind: EventKind) {
        let _ = self.0.send(ConnectionEvent { id, kind });
    }
}

/// Receiving half of an event channel.
#[derive(Debug)]
pub struct ConnectionEvents(mpsc::UnboundedReceiver<ConnectionEvent>);

impl ConnectionEvents {
    /// Wait for the next event.
    ///
    /// Returns `None` once every connection feeding this channel has been
    /// dropped and all events were received.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> { self.0.recv().await }

    /// Take an event if one is immediately available.
    pub fn try_recv(&mut self) -> Option<ConnectionEvent> { self.0.try_recv().ok() }
}

impl Stream for ConnectionEvents {
    type Item = ConnectionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.poll_recv(cx)
    }
}

/// Create an event channel shared by any number of connections.
#[must_use]
pub fn channel() -> (EventSink, ConnectionEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink(tx), ConnectionEvents(rx))
}
