//! Unit tests for connection logging and teardown bookkeeping.
//!
//! The `tracing-test` subscriber captures formatted output; the reader and
//! writer tasks run inside the `connection` span, so its fields prefix every
//! event they emit.

use std::time::Duration;

use bytes::Bytes;
use rstest::rstest;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tracing_test::traced_test;

use super::*;
use crate::{
    document::LengthPrefixedDocuments,
    frame::{OP_MSG, encode_frame},
};

fn build_pair(options: ConnectionOptions) -> (Connection, ConnectionEvents, DuplexStream) {
    let (client, server) = tokio::io::duplex(4096);
    let (sink, events) = event::channel();
    let connection = ConnectionBuilder::new(options)
        .document_codec(LengthPrefixedDocuments)
        .build(client, sink)
        .expect("codec supplied");
    (connection, events, server)
}

async fn next_kind(events: &mut ConnectionEvents) -> EventKind {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event before deadline")
        .expect("event channel open")
        .kind
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn establishment_is_logged_inside_connection_span() {
    let (connection, mut events, _server) =
        build_pair(ConnectionOptions::default().with_host("db.test"));
    assert!(matches!(next_kind(&mut events).await, EventKind::Connect));

    let id = connection.id().to_string();
    logs_assert(|lines: &[&str]| {
        lines
            .iter()
            .find(|line| {
                line.contains("connection established")
                    && line.contains("db.test:27017")
                    && line.contains(&id)
            })
            .map(|_| ())
            .ok_or_else(|| format!("establishment not logged in:\n{}", lines.join("\n")))
    });
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn rejected_frame_is_logged_at_warn() {
    let (_connection, mut events, mut server) = build_pair(ConnectionOptions::default());
    assert!(matches!(next_kind(&mut events).await, EventKind::Connect));

    server
        .write_all(&[0xff, 0xff, 0xff, 0xff, 1, 2, 3])
        .await
        .expect("write to duplex");
    assert!(matches!(
        next_kind(&mut events).await,
        EventKind::ParseError(crate::frame::FramingError::NegativeLength { length: -1 })
    ));

    logs_assert(|lines: &[&str]| {
        lines
            .iter()
            .find(|line| line.contains("WARN") && line.contains("rejected malformed frame"))
            .map(|_| ())
            .ok_or_else(|| format!("warning not found in:\n{}", lines.join("\n")))
    });
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn destroy_is_logged_once() {
    let (connection, _events, _server) = build_pair(ConnectionOptions::default());

    connection
        .destroy(DestroyOptions::forced())
        .await
        .expect("first destroy");
    connection
        .destroy(DestroyOptions::forced())
        .await
        .expect("second destroy is a no-op");

    logs_assert(|lines: &[&str]| {
        match lines
            .iter()
            .filter(|line| line.contains("connection destroyed"))
            .count()
        {
            1 => Ok(()),
            n => Err(format!("expected one destroy log, found {n}")),
        }
    });
}

#[tokio::test]
async fn destroy_after_peer_close_is_silent() {
    let (connection, mut events, server) = build_pair(ConnectionOptions::default());
    assert!(matches!(next_kind(&mut events).await, EventKind::Connect));

    drop(server);
    assert!(matches!(next_kind(&mut events).await, EventKind::Close(_)));
    assert!(!connection.is_connected());

    connection
        .destroy(DestroyOptions::default())
        .await
        .expect("destroying a closed connection succeeds");
    tokio::task::yield_now().await;
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn malformed_request_is_refused_before_writing() {
    let (connection, _events, _server) = build_pair(ConnectionOptions::default());

    let err = connection
        .send_request(Bytes::from_static(&[1, 2, 3]))
        .expect_err("too short for a header");
    assert!(matches!(err, ConnectionError::MalformedRequest { len: 3 }));
    assert_eq!(connection.pending_requests(), 0);
}

#[tokio::test]
async fn send_request_after_destroy_reports_closed() {
    let (connection, _events, _server) = build_pair(ConnectionOptions::default());
    connection
        .destroy(DestroyOptions::forced())
        .await
        .expect("destroy");

    let frame = encode_frame(5, 0, OP_MSG, &[0, 0, 0, 0]).expect("frame fits");
    let err = connection.send_request(frame).expect_err("closed");
    assert!(matches!(
        err,
        ConnectionError::Network(ref network) if network.kind() == NetworkErrorKind::Closed
    ));
}

#[tokio::test]
async fn display_names_id_and_address() {
    let (connection, _events, _server) =
        build_pair(ConnectionOptions::default().with_host("h").with_port(1));
    assert_eq!(
        connection.to_string(),
        format!("Connection {{ id: {}, address: h:1 }}", connection.id())
    );
    assert_eq!(connection.host(), "h");
    assert_eq!(connection.port(), 1);
    assert_eq!(connection.fingerprint(), builder::fingerprint("h:1"));
}

#[tokio::test]
async fn abandoned_request_leaves_the_queue() {
    let (connection, _events, _server) = build_pair(ConnectionOptions::default());

    let frame = encode_frame(11, 0, OP_MSG, &[0, 0, 0, 0]).expect("frame fits");
    let pending = connection.send_request(frame).expect("connected");
    assert_eq!(connection.pending_requests(), 1);

    drop(pending);
    assert_eq!(connection.pending_requests(), 0);
}
