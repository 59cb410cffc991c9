//! Writer task owning the write half of the transport.

use std::io;

use bytes::Bytes;
use futures::SinkExt;
use tokio::{
    io::AsyncWrite,
    sync::{mpsc, oneshot},
};
use tokio_util::{
    codec::{BytesCodec, FramedWrite},
    sync::CancellationToken,
};
use tracing::debug;

use crate::metrics::{self, Direction};

/// Instructions for the writer task.
#[derive(Debug)]
pub(super) enum WriteCommand {
    /// Write the buffers in order, then flush.
    Frames(Vec<Bytes>),
    /// Flush pending writes, shut down the write side and report the outcome.
    Shutdown(oneshot::Sender<io::Result<()>>),
}

/// Drain `commands` into `write` until shutdown, cancellation or failure.
///
/// A write failure is reported once on `fault` and ends the task.
pub(super) async fn run<W>(
    write: W,
    mut commands: mpsc::UnboundedReceiver<WriteCommand>,
    cancel: CancellationToken,
    fault: mpsc::UnboundedSender<io::Error>,
) where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(write, BytesCodec::new());
    loop {
        let command = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            command = commands.recv() => command,
        };
        match command {
            Some(WriteCommand::Frames(frames)) => {
                let written = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    written = write_frames(&mut sink, frames) => written,
                };
                if let Err(error) = written {
                    debug!(%error, "write failed");
                    let _ = fault.send(error);
                    return;
                }
            }
            Some(WriteCommand::Shutdown(ack)) => {
                let _ = ack.send(SinkExt::<Bytes>::close(&mut sink).await);
                return;
            }
            None => {
                let _ = SinkExt::<Bytes>::close(&mut sink).await;
                return;
            }
        }
    }
}

async fn write_frames<W>(sink: &mut FramedWrite<W, BytesCodec>, frames: Vec<Bytes>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for frame in frames {
        sink.feed(frame).await?;
        metrics::inc_frames(Direction::Outbound);
    }
    SinkExt::<Bytes>::flush(sink).await
}
