// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket connection handling
//!
//! Each frame on a connection is one packet. Packets are numbered per
//! connection and the number is the response token.

use std::sync::Arc;

use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::handler::{PacketHandler, ResponseSink};
use crate::protocol::{self, ProtocolError, DEFAULT_TIMEOUT};

/// Routes handler responses back to the connection's writer
struct ConnectionSink {
    tx: mpsc::UnboundedSender<(u64, Vec<u8>)>,
}

impl ResponseSink for ConnectionSink {
    fn respond(&self, token: u64, buf: Vec<u8>) {
        if self.tx.send((token, buf)).is_err() {
            debug!(token, "connection gone, response dropped");
        }
    }
}

/// Serve packets from one client until it disconnects
pub async fn handle_connection(handler: Arc<PacketHandler>, stream: UnixStream) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut next_token = 0u64;

    loop {
        let packet = match protocol::read_message(&mut reader).await {
            Ok(packet) => packet,
            Err(ProtocolError::ConnectionClosed) => {
                debug!(packets = next_token, "client disconnected");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let token = next_token;
        next_token += 1;

        // Registry calls may block on directory I/O
        let handler = Arc::clone(&handler);
        let sink = ConnectionSink { tx: tx.clone() };
        tokio::task::spawn_blocking(move || handler.handle_packet(&packet, token, &sink)).await?;

        while let Ok((token, buf)) = rx.try_recv() {
            debug!(token, len = buf.len(), "sending response");
            protocol::write_frame_timeout(&mut writer, &buf, DEFAULT_TIMEOUT).await?;
        }
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("packet handler failed: {0}")]
    Handler(#[from] tokio::task::JoinError),
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
