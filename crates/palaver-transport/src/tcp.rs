//! TCP transport: one [`FrameCodec`] frame per line.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use palaver_protocol::{FrameCodec, FrameError};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// How long `close` waits to flush buffered output to the peer.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A TCP [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        if let Ok(local) = listener.local_addr() {
            tracing::info!(%local, "TCP transport listening");
        }
        Ok(Self { listener })
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;

    async fn accept(&mut self) -> Result<Self::Connection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let conn = TcpConnection::new(stream, addr);
        tracing::debug!(id = %conn.id, %addr, "accepted TCP connection");
        Ok(conn)
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// A single framed TCP connection.
///
/// The socket is split so the reader and writer sit behind separate locks:
/// a handler blocked in [`recv`](Connection::recv) never stops another task
/// from delivering a message through [`send`](Connection::send).
pub struct TcpConnection {
    id: ConnectionId,
    peer: SocketAddr,
    reader: Mutex<FramedRead<OwnedReadHalf, FrameCodec>>,
    writer: Mutex<FramedWrite<OwnedWriteHalf, FrameCodec>>,
    /// Cancelled on close; wakes a pending `recv`.
    closed: CancellationToken,
    /// Ensures only the first `close` shuts the write half down.
    closing: AtomicBool,
}

impl TcpConnection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        let (read, write) = stream.into_split();
        Self {
            id: ConnectionId::new(
                NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            ),
            peer,
            reader: Mutex::new(FramedRead::new(read, FrameCodec)),
            writer: Mutex::new(FramedWrite::new(write, FrameCodec)),
            closed: CancellationToken::new(),
            closing: AtomicBool::new(false),
        }
    }

    /// The remote address of this connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn closed_error(&self) -> TransportError {
        TransportError::ConnectionClosed(format!("{} is closed", self.id))
    }
}

fn send_error(e: FrameError) -> TransportError {
    match e {
        FrameError::Io(io) => TransportError::SendFailed(io),
        other => TransportError::Frame(other),
    }
}

impl Connection for TcpConnection {
    async fn send(&self, line: &str) -> Result<(), TransportError> {
        // A peer that stopped reading can stall a write forever; closing
        // the connection abandons it and releases the writer.
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(self.closed_error()),
            sent = async {
                self.writer.lock().await.send(line.to_string()).await
            } => sent.map_err(send_error),
        }
    }

    async fn recv(&self) -> Result<Option<String>, TransportError> {
        let mut reader = self.reader.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Ok(None),
            frame = reader.next() => match frame {
                Some(Ok(line)) => Ok(Some(line)),
                Some(Err(e)) => Err(e.into()),
                None => Ok(None),
            },
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.cancel();
        if self.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        tracing::debug!(id = %self.id, peer = %self.peer, "closing TCP connection");
        // Flushes anything buffered, then shuts down the write half so the
        // peer sees end-of-stream. A peer that isn't reading gets cut off
        // once the grace period runs out; the socket itself is released
        // when the connection is dropped.
        let shutdown = async { self.writer.lock().await.close().await };
        match tokio::time::timeout(CLOSE_GRACE, shutdown).await {
            Ok(result) => result.map_err(send_error),
            Err(_) => {
                tracing::debug!(id = %self.id, "peer not draining, abandoning flush");
                Ok(())
            }
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
