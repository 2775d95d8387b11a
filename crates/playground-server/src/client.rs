//! Per-connection task.
//!
//! Each WebSocket connection gets:
//! - a writer task draining the session's bounded outbound queue, each
//!   write bounded by `write_timeout`;
//! - the reader loop below, which decodes one envelope per frame and
//!   hands it to [`dispatch::handle_message`].
//!
//! The connection ends when the peer closes, the writer stops (write
//! error, timeout, or the registry dropped the session as a slow
//! consumer), or too many consecutive frames fail to decode. In every case
//! the session is disconnected from the hub exactly once.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use playground_core::{ErrorCode, ServerMessage};
use playground_protocol::{decode_client, MAX_FRAME_LEN};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dispatch;
use crate::hub::Hub;
use crate::types::SessionId;

/// Per-connection limits taken from [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct ClientSettings {
    pub write_timeout: Duration,
    pub max_decode_errors: u32,
}

impl From<&Config> for ClientSettings {
    fn from(config: &Config) -> Self {
        ClientSettings {
            write_timeout: config.write_timeout(),
            max_decode_errors: config.max_decode_errors,
        }
    }
}

/// Oversized messages fail in the socket layer, before they are buffered.
fn websocket_config() -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(MAX_FRAME_LEN))
        .max_frame_size(Some(MAX_FRAME_LEN))
}

/// Run the I/O loop for a single connection.
pub async fn run_client(
    hub: Arc<Hub>,
    stream: TcpStream,
    peer: SocketAddr,
    settings: ClientSettings,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async_with_config(stream, Some(websocket_config()))
        .await
        .context("websocket handshake")?;
    let (mut sink, mut source) = ws.split();

    let (session, mut out_rx) = hub.connect();
    info!(session = %session, peer = %peer, "connected");

    // Writer task: frames are already encoded and shared between recipients.
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let msg = Message::text(frame.to_string());
            match timeout(settings.write_timeout, sink.send(msg)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(session = %session, error = %e, "write failed");
                    return;
                }
                Err(_) => {
                    warn!(session = %session, "write timed out");
                    return;
                }
            }
        }
        // Queue closed: disconnected or evicted.
        let _ = sink.close().await;
    });
    let mut writer_done = false;

    let mut decode_errors = 0u32;
    loop {
        let incoming = tokio::select! {
            incoming = source.next() => incoming,
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        };

        let msg = match incoming {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(session = %session, error = %e, "read failed");
                break;
            }
            None => break,
        };

        let payload: &[u8] = match &msg {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(bytes) => &bytes[..],
            Message::Close(_) => break,
            _ => continue,
        };

        match decode_client(payload) {
            Ok(request) => {
                decode_errors = 0;
                if let Err(e) = dispatch::handle_message(&hub, session, request).await {
                    debug!(session = %session, error = %e, "request rejected");
                    if let Some(notice) = dispatch::rejection(&e) {
                        reply(&hub, session, &notice);
                    }
                }
            }
            Err(e) if e.is_unknown_kind() => {
                warn!(session = %session, error = %e, "dropping packet of unknown kind");
            }
            Err(e) => {
                decode_errors += 1;
                warn!(session = %session, error = %e, count = decode_errors, "undecodable frame");
                reply(&hub, session, &ServerMessage::error(ErrorCode::DecodeError, e.to_string()));
                if decode_errors >= settings.max_decode_errors {
                    warn!(session = %session, "too many undecodable frames, closing");
                    break;
                }
            }
        }
    }

    hub.disconnect(session).await;
    if !writer_done {
        // The session's queue is closed now; let the writer flush and close.
        let _ = writer.await;
    }
    info!(session = %session, peer = %peer, "connection closed");
    Ok(())
}

fn reply(hub: &Hub, session: SessionId, msg: &ServerMessage) {
    if let Err(e) = hub.send_to(session, msg) {
        debug!(session = %session, error = %e, "could not deliver reply");
    }
}
