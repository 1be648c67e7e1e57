//! Receiving half of the transfer engine.

use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransferError};
use crate::ticket::Ticket;
use crate::transfer::hash::{Fingerprint, FingerprintBuilder};
use crate::transfer::protocol::{WireMsg, recv_msg};

/// Create the destination file, truncating anything already there.
/// Owner-only permissions on Unix; the content is unverified until the
/// session says otherwise.
pub async fn open_output(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path).await
}

/// Pull frames off the stream into the output file, in order.
///
/// Enforces the application-level invariants: sequence numbers contiguous
/// from zero, cumulative bytes never past the ticket's declared length,
/// and the end-of-stream flag coinciding with the byte count reaching
/// exactly that length. Returns the fingerprint computed over the payload
/// bytes; the caller runs the final comparison.
pub async fn receive_frames(
    recv: &mut quinn::RecvStream,
    file: &mut File,
    ticket: &Ticket,
    cancel: &CancellationToken,
) -> Result<Fingerprint> {
    let mut hasher = FingerprintBuilder::new();
    let mut next_seq: u64 = 0;
    let mut received: u64 = 0;

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            msg = recv_msg(recv) => msg?,
        };
        let frame = match msg {
            WireMsg::Frame(frame) => frame,
            other => {
                return Err(TransferError::Protocol(format!(
                    "expected a frame, got {:?}",
                    other
                )));
            }
        };

        if frame.seq != next_seq {
            return Err(TransferError::SequenceViolation {
                expected: next_seq,
                got: frame.seq,
            });
        }
        next_seq += 1;

        received += frame.payload.len() as u64;
        if received > ticket.length {
            return Err(TransferError::LengthMismatch {
                expected: ticket.length,
                got: received,
            });
        }

        hasher.update(&frame.payload);
        file.write_all(&frame.payload).await?;

        if frame.seq % 64 == 0 {
            tracing::debug!(seq = frame.seq, received, total = ticket.length, "frame applied");
        }

        if frame.last {
            if received != ticket.length {
                return Err(TransferError::LengthMismatch {
                    expected: ticket.length,
                    got: received,
                });
            }
            break;
        }
    }

    file.flush().await?;
    Ok(hasher.finalize())
}
