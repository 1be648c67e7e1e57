//! One sender↔receiver pairing, from connection to completion.
//!
//! Each session owns its cancellation token; every suspension point
//! observes it, and teardown (closing the channel and the listening
//! endpoint, discarding the receiver's partial output) happens before the
//! outcome surfaces to the caller.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config;
use crate::error::{Result, TransferError};
use crate::ticket::Ticket;
use crate::transfer::hash::fingerprint_file;
use crate::transfer::protocol::{PROTOCOL_VERSION, WireMsg, recv_msg, send_msg};
use crate::transfer::{quic, receiver, sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    Listening,
    Transferring,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    Connecting,
    Transferring,
    Verifying,
    Completed,
    Failed,
}

/// Sender side: offer one file, serve exactly one receiver, exit.
pub struct SenderSession {
    id: Uuid,
    source: PathBuf,
    endpoint: quinn::Endpoint,
    ticket: Ticket,
    state: SenderState,
    bytes_sent: u64,
    cancel: CancellationToken,
}

impl SenderSession {
    /// Fingerprint the source, bind the listening endpoint and build the
    /// ticket. The session stays `Idle` until [`serve`](Self::serve).
    pub async fn open(
        source: impl Into<PathBuf>,
        bind: SocketAddr,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let source = source.into();
        let (fingerprint, length) = fingerprint_file(&source).await?;
        let endpoint = quic::make_sender_endpoint(bind)?;
        let addr = advertised_addr(bind, endpoint.local_addr()?);
        let id = Uuid::new_v4();
        tracing::info!(session = %id, file = %source.display(), length, %fingerprint, "offering file");

        Ok(Self {
            id,
            source,
            endpoint,
            ticket: Ticket::new(addr, fingerprint, length),
            state: SenderState::Idle,
            bytes_sent: 0,
            cancel,
        })
    }

    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Block until the one transfer completes, fails, or is cancelled.
    pub async fn serve(&mut self) -> Result<()> {
        let outcome = self.drive().await;
        self.state = match &outcome {
            Ok(()) => SenderState::Completed,
            Err(TransferError::Cancelled) => SenderState::Cancelled,
            Err(_) => SenderState::Failed,
        };
        self.endpoint.close(quinn::VarInt::from_u32(0), b"");
        outcome
    }

    async fn drive(&mut self) -> Result<()> {
        self.state = SenderState::Listening;
        tracing::info!(session = %self.id, addr = %self.ticket.addr, "listening for one receiver");

        let connection = quic::accept_one(&self.endpoint, &self.cancel).await?;
        self.state = SenderState::Transferring;
        tracing::info!(session = %self.id, remote = %connection.remote_address(), "receiver connected");

        let (mut send, mut recv) = tokio::select! {
            _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
            streams = connection.accept_bi() => streams?,
        };

        let request = tokio::select! {
            _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
            msg = recv_msg(&mut recv) => msg?,
        };
        match request {
            WireMsg::Pull { version } if version == PROTOCOL_VERSION => {}
            WireMsg::Pull { version } => {
                return Err(TransferError::Protocol(format!(
                    "peer speaks protocol version {}, expected {}",
                    version, PROTOCOL_VERSION
                )));
            }
            other => {
                return Err(TransferError::Protocol(format!(
                    "expected a pull request, got {:?}",
                    other
                )));
            }
        }

        self.bytes_sent =
            sender::send_frames(&mut send, &self.source, &self.ticket, &self.cancel).await?;
        let _ = send.finish();

        // Completed only once the receiver has verified and acknowledged.
        let ack = tokio::select! {
            _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
            msg = recv_msg(&mut recv) => msg?,
        };
        if !matches!(ack, WireMsg::Received) {
            return Err(TransferError::Protocol(format!(
                "expected acknowledgement, got {:?}",
                ack
            )));
        }

        connection.close(quinn::VarInt::from_u32(0), b"done");
        tracing::info!(session = %self.id, bytes = self.bytes_sent, "transfer complete");
        Ok(())
    }
}

/// Receiver side: dial the ticket's address, pull the file, verify, exit.
pub struct ReceiverSession {
    id: Uuid,
    ticket: Ticket,
    dest: PathBuf,
    dial_timeout: Duration,
    state: ReceiverState,
    bytes_received: u64,
    output_created: bool,
    cancel: CancellationToken,
}

impl ReceiverSession {
    pub fn new(ticket: Ticket, dest: impl Into<PathBuf>, cancel: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket,
            dest: dest.into(),
            dial_timeout: config::dial_timeout(),
            state: ReceiverState::Idle,
            bytes_received: 0,
            output_created: false,
            cancel,
        }
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Block until the transfer completes, fails, or is cancelled. On any
    /// failure after the output file was created, the file is removed so a
    /// truncated or corrupt download is never mistaken for a complete one.
    pub async fn run(&mut self) -> Result<()> {
        let endpoint = quic::make_receiver_endpoint()?;
        let outcome = self.drive(&endpoint).await;
        match &outcome {
            Ok(()) => self.state = ReceiverState::Completed,
            Err(e) => {
                self.state = ReceiverState::Failed;
                tracing::warn!(session = %self.id, "transfer failed: {}", e);
                self.discard_partial_output().await;
            }
        }
        endpoint.close(quinn::VarInt::from_u32(0), b"");
        outcome
    }

    async fn drive(&mut self, endpoint: &quinn::Endpoint) -> Result<()> {
        self.state = ReceiverState::Connecting;
        tracing::info!(session = %self.id, addr = %self.ticket.addr, "dialing sender");
        let connection =
            quic::dial(endpoint, self.ticket.addr, self.dial_timeout, &self.cancel).await?;

        let (mut send, mut recv) = tokio::select! {
            _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
            streams = connection.open_bi() => streams?,
        };
        tokio::select! {
            _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
            res = send_msg(&mut send, &WireMsg::Pull { version: PROTOCOL_VERSION }) => res?,
        }

        self.state = ReceiverState::Transferring;
        let mut file = receiver::open_output(&self.dest).await?;
        self.output_created = true;
        let computed =
            receiver::receive_frames(&mut recv, &mut file, &self.ticket, &self.cancel).await?;
        self.bytes_received = self.ticket.length;

        self.state = ReceiverState::Verifying;
        if computed != self.ticket.fingerprint {
            return Err(TransferError::IntegrityMismatch {
                expected: self.ticket.fingerprint.to_hex(),
                got: computed.to_hex(),
            });
        }

        send_msg(&mut send, &WireMsg::Received).await?;
        let _ = send.finish();
        // Let the acknowledgement drain; the sender closes once it has it.
        let _ = tokio::time::timeout(Duration::from_secs(2), connection.closed()).await;

        tracing::info!(session = %self.id, bytes = self.bytes_received, dest = %self.dest.display(), "transfer verified");
        Ok(())
    }

    async fn discard_partial_output(&self) {
        if !self.output_created {
            return;
        }
        match tokio::fs::remove_file(&self.dest).await {
            Ok(()) => tracing::info!(session = %self.id, dest = %self.dest.display(), "partial output discarded"),
            Err(e) => tracing::warn!(session = %self.id, "could not remove partial output: {}", e),
        }
    }
}

/// The address receivers should dial. A wildcard bind is substituted with
/// the machine's primary local IP.
fn advertised_addr(bind: SocketAddr, local: SocketAddr) -> SocketAddr {
    if !bind.ip().is_unspecified() {
        return SocketAddr::new(bind.ip(), local.port());
    }
    let ip = local_ip_address::local_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    SocketAddr::new(ip, local.port())
}
