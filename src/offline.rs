//! Answers clients while the backend is asleep
//!
//! Each connection gets exactly one frame read and at most one reply. Status
//! queries get a canned server-list entry, join attempts get a disconnect
//! message and trigger the boot gate, everything else is dropped silently.

use crate::boot::{BootGate, BootOutcome};
use crate::config::OfflineConfig;
use crate::frame::{encode_string, read_frame, write_frame};
use crate::handshake::{classify, Intent};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// Packet id of the status response in the status state
pub const STATUS_RESPONSE_PACKET_ID: u32 = 0x00;

/// Packet id of the disconnect packet in the login state
pub const LOGIN_DISCONNECT_PACKET_ID: u32 = 0x00;

/// How long to wait for the client to close after our reply
const LINGER_TIMEOUT: Duration = Duration::from_millis(250);

/// Most bytes discarded while waiting for the client to close
const LINGER_DRAIN_LIMIT: u64 = 64 * 1024;

/// How an offline connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineOutcome {
    /// The first frame could not be decoded
    DecodeFailed(&'static str),
    /// No frame arrived within the read timeout
    TimedOut,
    /// A status response was sent
    StatusSent,
    /// A join was rejected with a disconnect message
    JoinRejected(BootOutcome),
    /// The frame was not something we answer
    Ignored,
}

pub struct OfflineResponder {
    gate: Arc<BootGate>,
    status_json: String,
    boot_requested_json: String,
    booting_json: String,
    read_timeout: Duration,
    max_frame_len: usize,
}

impl OfflineResponder {
    pub fn new(
        config: &OfflineConfig,
        gate: Arc<BootGate>,
        read_timeout: Duration,
        max_frame_len: usize,
    ) -> Self {
        Self {
            gate,
            status_json: status_json(config),
            boot_requested_json: chat_json(&config.boot_requested_message),
            booting_json: chat_json(&config.booting_message),
            read_timeout,
            max_frame_len,
        }
    }

    /// Handle one offline connection to completion
    pub async fn handle<S>(&self, mut stream: S, peer: SocketAddr) -> OfflineOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let read = read_frame(&mut stream, self.max_frame_len);
        let frame = match tokio::time::timeout(self.read_timeout, read).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                debug!(peer = %peer, error = %e, "Dropping offline connection, bad frame");
                return OfflineOutcome::DecodeFailed(e.kind());
            }
            Err(_) => {
                debug!(
                    peer = %peer,
                    timeout_secs = self.read_timeout.as_secs(),
                    "Dropping offline connection, no frame received"
                );
                return OfflineOutcome::TimedOut;
            }
        };

        let intent = classify(&frame);
        match intent {
            Intent::StatusQuery => {
                info!(peer = %peer, intent = intent.as_str(), "Server list ping received");
                let status = &self.status_json;
                send_text(&mut stream, peer, STATUS_RESPONSE_PACKET_ID, status).await;
                OfflineOutcome::StatusSent
            }
            Intent::JoinAttempt => {
                info!(peer = %peer, intent = intent.as_str(), "Server join received");
                let outcome = self.gate.request_boot().await;
                let reason = match outcome {
                    BootOutcome::Dispatched { .. } => &self.boot_requested_json,
                    BootOutcome::AlreadyRequested => &self.booting_json,
                };
                send_text(&mut stream, peer, LOGIN_DISCONNECT_PACKET_ID, reason).await;
                OfflineOutcome::JoinRejected(outcome)
            }
            Intent::Unknown => {
                debug!(
                    peer = %peer,
                    intent = intent.as_str(),
                    packet_id = frame.packet_id,
                    payload_len = frame.payload.len(),
                    "Ignoring unrecognised packet"
                );
                OfflineOutcome::Ignored
            }
        }
    }
}

/// Write a single-string packet and close our side.
///
/// Whatever the client already sent after its handshake is read and thrown
/// away before returning, so closing the socket does not reset the
/// connection before the client has read the reply.
async fn send_text<S>(stream: &mut S, peer: SocketAddr, packet_id: u32, text: &str)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = write_frame(stream, packet_id, &encode_string(text)).await {
        debug!(peer = %peer, error = %e, "Failed to send offline reply");
        return;
    }
    let _ = stream.shutdown().await;

    let mut leftover = (&mut *stream).take(LINGER_DRAIN_LIMIT);
    let mut sink = tokio::io::sink();
    let drain = tokio::io::copy(&mut leftover, &mut sink);
    let _ = tokio::time::timeout(LINGER_TIMEOUT, drain).await;
}

/// Server list entry advertised while asleep
fn status_json(config: &OfflineConfig) -> String {
    serde_json::json!({
        "version": {
            "name": config.version_name,
            "protocol": config.protocol,
        },
        "players": {
            "max": config.max_players,
            "online": config.online_players,
        },
        "description": {
            "text": config.motd,
            "color": "red",
        },
    })
    .to_string()
}

fn chat_json(text: &str) -> String {
    serde_json::json!({ "text": text, "color": "red" }).to_string()
}
