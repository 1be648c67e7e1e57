//! Point-to-point single-file transfer over QUIC.
//!
//! A sender process offers one local file and prints an opaque ticket; a
//! receiver process, given that ticket, dials the sender directly, pulls
//! the file as sequenced frames, and verifies a BLAKE3 fingerprint before
//! declaring success. One sender invocation serves exactly one receiver.

pub mod config;
pub mod error;
pub mod session;
pub mod ticket;
pub mod transfer;

pub use error::{Result, TransferError};
pub use session::{ReceiverSession, ReceiverState, SenderSession, SenderState};
pub use ticket::Ticket;
pub use transfer::hash::Fingerprint;
