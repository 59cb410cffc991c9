//! Reader task: the single handling point for inbound transport activity.
//!
//! Data, errors, timeouts and closure are handled to completion one at a
//! time, so the frame parser is never shared. Decoding is awaited inline,
//! which keeps message delivery in arrival order even when some frames need
//! decompression.

use std::{io, sync::Arc, time::Duration};

use bytes::BytesMut;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::{mpsc, watch},
};
use tracing::{trace, warn};

use super::{EventKind, Shared, Terminal, counter::ActiveConnection};
use crate::{
    frame::{FrameParser, ParseEvent},
    message::MessageDecoder,
    metrics::{self, Direction, ErrorKind},
};

const READ_CHUNK: usize = 64 * 1024;

enum Outcome {
    Data,
    Retimed,
    Cancelled,
    Terminal(Terminal),
}

pub(super) struct Reader<R> {
    shared: Arc<Shared>,
    read: R,
    buf: BytesMut,
    parser: FrameParser,
    decoder: MessageDecoder,
    timeout: watch::Receiver<Option<Duration>>,
    fault: mpsc::UnboundedReceiver<io::Error>,
    _active: ActiveConnection,
}

impl<R> Reader<R>
where
    R: AsyncRead + Unpin,
{
    pub(super) fn new(
        shared: Arc<Shared>,
        read: R,
        parser: FrameParser,
        decoder: MessageDecoder,
        timeout: watch::Receiver<Option<Duration>>,
        fault: mpsc::UnboundedReceiver<io::Error>,
    ) -> Self {
        Self {
            shared,
            read,
            buf: BytesMut::with_capacity(READ_CHUNK),
            parser,
            decoder,
            timeout,
            fault,
            _active: ActiveConnection::new(),
        }
    }

    pub(super) async fn run(mut self) {
        loop {
            match self.next_outcome().await {
                Outcome::Data => {
                    if !self.dispatch().await {
                        return;
                    }
                }
                Outcome::Retimed => {}
                Outcome::Cancelled => return,
                Outcome::Terminal(cause) => {
                    self.shared.terminate(cause);
                    return;
                }
            }
        }
    }

    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus operations internally"
    )]
    async fn next_outcome(&mut self) -> Outcome {
        let idle = *self.timeout.borrow_and_update();
        self.buf.clear();
        self.buf.reserve(READ_CHUNK);
        let read = read_idle(&mut self.read, &mut self.buf, idle);
        tokio::select! {
            biased;
            () = self.shared.reading.cancelled() => Outcome::Cancelled,
            Ok(()) = self.timeout.changed() => Outcome::Retimed,
            outcome = read => outcome,
            Some(error) = self.fault.recv() => Outcome::Terminal(Terminal::Failed(error)),
        }
    }

    /// Feed the last read into the parser and deliver what it yields.
    ///
    /// Returns `false` once the connection was destroyed mid-dispatch.
    async fn dispatch(&mut self) -> bool {
        trace!(bytes = self.buf.len(), "read from transport");
        for event in self.parser.feed(&self.buf) {
            if self.shared.reading.is_cancelled() {
                return false;
            }
            match event {
                ParseEvent::FrameReady(frame) => {
                    metrics::inc_frames(Direction::Inbound);
                    let decoded = tokio::select! {
                        biased;
                        () = self.shared.reading.cancelled() => return false,
                        decoded = self.decoder.decode(frame) => decoded,
                    };
                    if self.shared.reading.is_cancelled() {
                        return false;
                    }
                    match decoded {
                        Ok(message) => {
                            trace!(
                                kind = ?message.kind(),
                                response_to = message.response_to(),
                                "message decoded"
                            );
                            self.shared.work.complete(&message);
                            self.shared.emit(EventKind::Message(message));
                        }
                        Err(error) => {
                            warn!(%error, "failed to decode message");
                            metrics::inc_errors(ErrorKind::Decode);
                            self.shared.emit(EventKind::MessageError(error));
                        }
                    }
                }
                ParseEvent::ParseError(error) => {
                    warn!(%error, "rejected malformed frame");
                    metrics::inc_errors(ErrorKind::Framing);
                    self.shared.emit(EventKind::ParseError(error));
                }
            }
        }
        true
    }
}

async fn read_idle<R>(read: &mut R, buf: &mut BytesMut, idle: Option<Duration>) -> Outcome
where
    R: AsyncRead + Unpin,
{
    let result = match idle {
        Some(after) => match tokio::time::timeout(after, read.read_buf(buf)).await {
            Ok(result) => result,
            Err(_) => return Outcome::Terminal(Terminal::TimedOut(after)),
        },
        None => read.read_buf(buf).await,
    };
    match result {
        Ok(0) => Outcome::Terminal(Terminal::Closed),
        Ok(_) => Outcome::Data,
        Err(error) => Outcome::Terminal(Terminal::Failed(error)),
    }
}
