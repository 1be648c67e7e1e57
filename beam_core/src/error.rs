use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Everything that can terminate a transfer session.
///
/// All variants are session-fatal; the only internal retry lives in the
/// dial loop, bounded by its deadline.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("malformed ticket: {reason}")]
    MalformedTicket { reason: String },

    #[error("no sender reachable within {0:?}")]
    ConnectTimeout(Duration),

    #[error("connection refused by {0}")]
    ConnectRefused(SocketAddr),

    #[error("frame sequence violation: expected {expected}, got {got}")]
    SequenceViolation { expected: u64, got: u64 },

    #[error("channel closed mid-frame")]
    TruncatedFrame,

    #[error("ticket declared {expected} bytes, stream carried {got}")]
    LengthMismatch { expected: u64, got: u64 },

    #[error("content fingerprint mismatch: expected {expected}, got {got}")]
    IntegrityMismatch { expected: String, got: String },

    #[error("source file no longer matches the ticket")]
    SourceChanged,

    #[error("transfer cancelled")]
    Cancelled,

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection lost: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("connect failed: {0}")]
    Connect(#[from] quinn::ConnectError),

    #[error("stream write failed: {0}")]
    Write(#[from] quinn::WriteError),

    #[error("stream read failed: {0}")]
    Read(#[from] quinn::ReadError),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("tls setup failed: {0}")]
    Tls(String),
}

impl From<rcgen::Error> for TransferError {
    fn from(e: rcgen::Error) -> Self {
        TransferError::Tls(e.to_string())
    }
}

impl From<rustls::Error> for TransferError {
    fn from(e: rustls::Error) -> Self {
        TransferError::Tls(e.to_string())
    }
}

impl From<quinn::ReadExactError> for TransferError {
    fn from(e: quinn::ReadExactError) -> Self {
        match e {
            // The peer finished the stream in the middle of a message.
            quinn::ReadExactError::FinishedEarly(_) => TransferError::TruncatedFrame,
            quinn::ReadExactError::ReadError(e) => TransferError::Read(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
