//! Sending half of the transfer engine.

use std::path::Path;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::config::CHUNK_SIZE;
use crate::error::{Result, TransferError};
use crate::ticket::Ticket;
use crate::transfer::hash::FingerprintBuilder;
use crate::transfer::protocol::{Frame, WireMsg, send_msg};

/// Stream the source file as sequenced frames.
///
/// Reads one fixed-size block, writes its frame, and only then reads the
/// next block, so in-flight data is bounded by the transport's send window
/// rather than growing with the file. Exactly the ticket's declared byte
/// count is sent; the frame carrying the final byte has the end-of-stream
/// flag set, and an empty file is one empty end-of-stream frame.
///
/// The running fingerprint is compared against the ticket at the end; a
/// divergence means the file changed after the ticket was built.
pub async fn send_frames(
    send: &mut quinn::SendStream,
    source: &Path,
    ticket: &Ticket,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut file = File::open(source).await?;
    let mut hasher = FingerprintBuilder::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut seq: u64 = 0;
    let mut sent: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let want = (ticket.length - sent).min(CHUNK_SIZE as u64) as usize;
        let n = if want == 0 {
            0
        } else {
            file.read(&mut buffer[..want]).await?
        };
        if n == 0 && sent < ticket.length {
            // The file shrank underneath us.
            return Err(TransferError::SourceChanged);
        }

        hasher.update(&buffer[..n]);
        sent += n as u64;
        let last = sent == ticket.length;

        let msg = WireMsg::Frame(Frame {
            seq,
            last,
            payload: Bytes::copy_from_slice(&buffer[..n]),
        });
        tokio::select! {
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            res = send_msg(send, &msg) => res?,
        }

        if seq % 64 == 0 {
            tracing::debug!(seq, sent, total = ticket.length, "frame written");
        }
        seq += 1;

        if last {
            break;
        }
    }

    if hasher.finalize() != ticket.fingerprint {
        return Err(TransferError::SourceChanged);
    }

    Ok(sent)
}
