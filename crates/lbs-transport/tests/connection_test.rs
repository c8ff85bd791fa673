//! Integration test: framed connection
//!
//! Runs both ends of an `LbsConnection` over an in-memory duplex pipe.
//!
//! Run with: cargo test -p lbs-transport --test connection_test

use tokio::io::AsyncWriteExt;

use lbs_protocol::wire::{self, FrameFlags, MAGIC};
use lbs_protocol::{Message, ProtocolError};
use lbs_transport::{ConnectionRole, LbsConnection, TransportError};

fn make_pair() -> (
    LbsConnection<tokio::io::DuplexStream>,
    LbsConnection<tokio::io::DuplexStream>,
) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    (
        LbsConnection::new(ConnectionRole::Client, a),
        LbsConnection::new(ConnectionRole::Server, b),
    )
}

#[tokio::test]
async fn test_request_reply_round_trip() {
    let (mut client, mut server) = make_pair();

    let server_task = tokio::spawn(async move {
        let request = server.recv_frame().await.expect("request");
        assert_eq!(request.message, Message::AddReference { method: 1 });
        assert!(request.header.flags.is_empty());
        server.reply(request.header.serial, &Message::Ack).await.expect("reply");
        server
    });

    let reply = client
        .call(&Message::AddReference { method: 1 })
        .await
        .expect("call");
    assert_eq!(reply, Message::Ack);
    let server = server_task.await.expect("join");
    assert_eq!(server.role(), ConnectionRole::Server);
}

#[tokio::test]
async fn test_error_reply_is_delivered() {
    let (mut client, mut server) = make_pair();

    let server_task = tokio::spawn(async move {
        let request = server.recv_frame().await.expect("request");
        server
            .reply(request.header.serial, &Message::Error(ProtocolError::NotRegistered))
            .await
            .expect("reply");
        server
    });

    match client.call(&Message::QueryState).await.expect("call") {
        Message::Error(ProtocolError::NotRegistered) => {}
        other => panic!("expected NotRegistered, got {:?}", other),
    }
    drop(server_task.await.expect("join"));
}

#[tokio::test]
async fn test_signal_during_call_is_queued() {
    let (mut client, mut server) = make_pair();

    let server_task = tokio::spawn(async move {
        let request = server.recv_frame().await.expect("request");
        server
            .signal(&Message::StatusChanged { method: 0, status: 3 })
            .await
            .expect("signal");
        server.reply(request.header.serial, &Message::Pong).await.expect("reply");
        server
            .signal(&Message::StatusChanged { method: 1, status: 0 })
            .await
            .expect("signal");
        server
    });

    assert_eq!(client.call(&Message::Ping).await.expect("call"), Message::Pong);
    assert_eq!(
        client.next_signal().await.expect("queued"),
        Message::StatusChanged { method: 0, status: 3 }
    );
    assert_eq!(
        client.next_signal().await.expect("awaited"),
        Message::StatusChanged { method: 1, status: 0 }
    );
    drop(server_task.await.expect("join"));
}

#[tokio::test]
async fn test_reply_to_another_serial_is_rejected() {
    let (mut client, mut server) = make_pair();

    let server_task = tokio::spawn(async move {
        let request = server.recv_frame().await.expect("request");
        server
            .reply(request.header.serial + 40, &Message::Ack)
            .await
            .expect("reply");
        server
    });

    match client.call(&Message::Ping).await {
        Err(TransportError::UnexpectedFrame { kind: "Ack", awaiting }) => assert_eq!(awaiting, 1),
        other => panic!("expected UnexpectedFrame, got {:?}", other),
    }
    drop(server_task.await.expect("join"));
}

#[tokio::test]
async fn test_serials_increase_per_sender() {
    let (mut client, mut server) = make_pair();
    let first = client.send(&Message::Ping).await.expect("send");
    let second = client.send(&Message::GetStatus).await.expect("send");
    assert_eq!(second, first + 1);

    assert_eq!(server.recv_frame().await.expect("recv").header.serial, first);
    assert_eq!(server.recv_frame().await.expect("recv").header.serial, second);
}

#[tokio::test]
async fn test_peer_close_is_connection_closed() {
    let (mut client, server) = make_pair();
    drop(server);
    match client.recv().await {
        Err(TransportError::ConnectionClosed) => {}
        other => panic!("expected ConnectionClosed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_undecodable_payload_keeps_stream_usable() {
    let (a, b) = tokio::io::duplex(1024);
    let mut raw = a;
    let mut server = LbsConnection::new(ConnectionRole::Server, b);

    let mut junk = Vec::new();
    junk.extend_from_slice(&MAGIC);
    junk.push(FrameFlags::empty().bits());
    junk.extend_from_slice(&1u32.to_le_bytes());
    junk.extend_from_slice(&0u32.to_le_bytes());
    junk.extend_from_slice(&4u32.to_le_bytes());
    junk.extend_from_slice(&[0xff; 4]);
    raw.write_all(&junk).await.expect("write");
    raw.write_all(&wire::encode_frame(&Message::Ping, 2, 0).expect("encode"))
        .await
        .expect("write");

    let err = server.recv().await.expect_err("junk payload");
    assert!(err.is_recoverable(), "{}", err);
    assert_eq!(server.recv().await.expect("next frame"), Message::Ping);
}

#[tokio::test]
async fn test_garbage_header_is_not_recoverable() {
    let (a, b) = tokio::io::duplex(1024);
    let mut raw = a;
    let mut server = LbsConnection::new(ConnectionRole::Server, b);

    raw.write_all(b"XX\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00")
        .await
        .expect("write");
    let err = server.recv().await.expect_err("bad magic");
    assert!(!err.is_recoverable(), "{}", err);
    match server.recv().await {
        Err(TransportError::ConnectionClosed) => {}
        other => panic!("reader should stop after a bad header, got {:?}", other),
    }
}
