//! Wire messages exchanged over the transfer stream.
//!
//! Every message is a u32 big-endian length prefix followed by the bincode
//! body, with a hard size cap so a corrupt length never drives a huge
//! allocation.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::MAX_WIRE_MSG;
use crate::error::{Result, TransferError};

/// Version of the stream protocol, exchanged in `Pull`.
pub const PROTOCOL_VERSION: u8 = 1;

/// One sequenced unit of transfer payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Strictly increasing from zero, contiguous.
    pub seq: u64,
    /// Set on the frame carrying the final declared byte.
    pub last: bool,
    pub payload: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireMsg {
    /// Receiver asks the sender to start streaming.
    Pull { version: u8 },
    /// One chunk of file content.
    Frame(Frame),
    /// Receiver acknowledges a complete, verified transfer.
    Received,
}

/// Send a message over the transfer stream.
pub async fn send_msg(send: &mut quinn::SendStream, msg: &WireMsg) -> Result<()> {
    let body = bincode::serialize(msg)?;
    let len = (body.len() as u32).to_be_bytes();
    send.write_all(&len).await?;
    send.write_all(&body).await?;
    Ok(())
}

/// Receive the next message from the transfer stream.
///
/// A stream that ends between messages or inside one surfaces as
/// `TruncatedFrame`; the session layer decides whether that was expected.
pub async fn recv_msg(recv: &mut quinn::RecvStream) -> Result<WireMsg> {
    let mut len_buf = [0u8; 4];
    recv.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_WIRE_MSG {
        return Err(TransferError::Protocol(format!(
            "oversized wire message: {} bytes (cap {})",
            len, MAX_WIRE_MSG
        )));
    }

    let mut body = vec![0u8; len];
    recv.read_exact(&mut body).await?;

    Ok(bincode::deserialize(&body)?)
}
