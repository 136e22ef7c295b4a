//! Integration tests for the TCP transport.
//!
//! These tests spin up a real listener on a random loopback port and talk
//! to it with a plain `Framed<TcpStream, FrameCodec>` client, verifying that
//! lines actually flow over the network in both directions.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use palaver_protocol::FrameCodec;
use palaver_transport::{Connection, TcpConnection, TcpTransport, Transport};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

type Client = Framed<TcpStream, FrameCodec>;

/// Binds to an OS-assigned port, connects one client, and returns both ends.
async fn connected_pair() -> (TcpConnection, Client) {
    let mut transport = TcpTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = transport.local_addr().expect("should have local addr");

    let server_handle = tokio::spawn(async move {
        transport.accept().await.expect("should accept")
    });

    let stream = TcpStream::connect(addr).await.expect("client should connect");
    let server_conn = server_handle.await.expect("task should complete");

    (server_conn, Framed::new(stream, FrameCodec))
}

#[tokio::test]
async fn test_tcp_accept_and_send_receive() {
    let (server_conn, mut client) = connected_pair().await;

    assert!(server_conn.id().into_inner() > 0);

    // --- Server sends, client receives ---
    server_conn
        .send("hello from server")
        .await
        .expect("send should succeed");
    let line = client.next().await.unwrap().unwrap();
    assert_eq!(line, "hello from server");

    // --- Client sends, server receives ---
    client
        .send("hello from client".to_string())
        .await
        .unwrap();
    let received = server_conn
        .recv()
        .await
        .expect("recv should succeed")
        .expect("should have data");
    assert_eq!(received, "hello from client");

    server_conn.close().await.expect("close should succeed");
}

#[tokio::test]
async fn test_tcp_recv_returns_none_on_client_close() {
    let (server_conn, client) = connected_pair().await;

    drop(client);

    let result = server_conn.recv().await.expect("recv should not error");
    assert!(result.is_none(), "should return None on client close");
}

#[tokio::test]
async fn test_tcp_close_unblocks_pending_recv() {
    let (server_conn, mut client) = connected_pair().await;
    let server_conn = Arc::new(server_conn);

    // Another task is parked in recv() with nothing to read.
    let reader = Arc::clone(&server_conn);
    let pending = tokio::spawn(async move { reader.recv().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    server_conn.close().await.expect("close should succeed");

    let result = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("recv should be woken by close")
        .expect("task should not panic")
        .expect("recv should not error");
    assert!(result.is_none());

    // The peer observes end-of-stream.
    let next = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("client should see the close");
    assert!(next.is_none());
}

#[tokio::test]
async fn test_tcp_send_while_recv_pending() {
    let (server_conn, mut client) = connected_pair().await;
    let server_conn = Arc::new(server_conn);

    let reader = Arc::clone(&server_conn);
    let pending = tokio::spawn(async move { reader.recv().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Writing must not wait for the parked reader.
    tokio::time::timeout(Duration::from_secs(2), server_conn.send("ping"))
        .await
        .expect("send should not block on recv")
        .expect("send should succeed");
    assert_eq!(client.next().await.unwrap().unwrap(), "ping");

    client.send("pong".to_string()).await.unwrap();
    let line = pending.await.unwrap().unwrap();
    assert_eq!(line.as_deref(), Some("pong"));
}

#[tokio::test]
async fn test_tcp_send_after_close_fails() {
    let (server_conn, _client) = connected_pair().await;

    server_conn.close().await.unwrap();
    // A second close is a no-op.
    server_conn.close().await.unwrap();

    assert!(server_conn.send("too late").await.is_err());
}

#[tokio::test]
async fn test_tcp_close_unblocks_send_to_stalled_peer() {
    // The client never reads, so the socket buffers fill and a send parks
    // holding the writer.
    let (server_conn, _client) = connected_pair().await;
    let server_conn = Arc::new(server_conn);

    let writer = Arc::clone(&server_conn);
    let flood = tokio::spawn(async move {
        let line = "x".repeat(60_000);
        while writer.send(&line).await.is_ok() {}
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!flood.is_finished(), "sends should be stalled on the peer");

    tokio::time::timeout(Duration::from_secs(5), server_conn.close())
        .await
        .expect("close should not wait for the stalled send")
        .expect("close should succeed");

    tokio::time::timeout(Duration::from_secs(5), flood)
        .await
        .expect("stalled send should fail once closed")
        .expect("task should not panic");
}
