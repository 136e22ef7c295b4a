//! Test doubles shared by this crate's unit tests.

use std::sync::Arc;

use palaver_protocol::{FrameError, MAX_FRAME_LEN, encoded_len};
use palaver_transport::{Connection, ConnectionId, TransportError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::Session;

/// A [`Connection`] that records every sent line in a channel and never
/// receives anything until it is closed. Refuses oversized lines the way
/// the real codec does.
pub(crate) struct MockConnection {
    id: ConnectionId,
    outbox: mpsc::UnboundedSender<String>,
    closed: CancellationToken,
}

impl Connection for MockConnection {
    async fn send(&self, line: &str) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed("mock closed".into()));
        }
        let size = encoded_len(line);
        if size > MAX_FRAME_LEN {
            return Err(TransportError::Frame(FrameError::TooLarge {
                size,
                max: MAX_FRAME_LEN,
            }));
        }
        self.outbox
            .send(line.to_string())
            .map_err(|_| TransportError::ConnectionClosed("outbox dropped".into()))
    }

    async fn recv(&self) -> Result<Option<String>, TransportError> {
        self.closed.cancelled().await;
        Ok(None)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.cancel();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// A fresh session over a [`MockConnection`], plus the receiving end of
/// everything sent to it.
pub(crate) fn mock_session(
    id: u64,
) -> (Arc<Session<MockConnection>>, mpsc::UnboundedReceiver<String>) {
    let (outbox, rx) = mpsc::unbounded_channel();
    let conn = MockConnection {
        id: ConnectionId::new(id),
        outbox,
        closed: CancellationToken::new(),
    };
    (Session::new(conn), rx)
}

/// A session that already carries `nickname`, ready to subscribe.
pub(crate) fn named_session(
    id: u64,
    nickname: &str,
) -> (Arc<Session<MockConnection>>, mpsc::UnboundedReceiver<String>) {
    let (session, rx) = mock_session(id);
    session.set_nickname(Some(nickname.to_string()));
    (session, rx)
}

/// Everything delivered so far, without waiting.
pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        lines.push(line);
    }
    lines
}
