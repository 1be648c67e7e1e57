//! The opaque hand-off artifact between a sender and a receiver.
//!
//! Wire layout: one version byte, then the bincode encoding of the body,
//! rendered as unpadded lowercase base32. The version byte is checked
//! before the body is parsed so that a future incompatible format fails
//! fast instead of silently misdecoding.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};

use crate::error::TransferError;
use crate::transfer::hash::Fingerprint;

/// Current ticket format version.
pub const TICKET_VERSION: u8 = 1;

/// Everything a receiver needs: where the sender listens, what content to
/// expect, and how long it is. Created once at sender startup, never
/// mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(skip)]
    pub version: u8,
    pub addr: SocketAddr,
    pub fingerprint: Fingerprint,
    pub length: u64,
}

impl Ticket {
    pub fn new(addr: SocketAddr, fingerprint: Fingerprint, length: u64) -> Self {
        Self {
            version: TICKET_VERSION,
            addr,
            fingerprint,
            length,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let body = bincode::serialize(self).expect("ticket body serializes");
        let mut data = Vec::with_capacity(1 + body.len());
        data.push(TICKET_VERSION);
        data.extend_from_slice(&body);
        data
    }

    fn from_bytes(data: &[u8]) -> Result<Self, TransferError> {
        let (&version, body) = data.split_first().ok_or_else(|| malformed("empty ticket"))?;
        if version != TICKET_VERSION {
            return Err(malformed(format!(
                "unsupported ticket version {} (supported: {})",
                version, TICKET_VERSION
            )));
        }
        let mut ticket: Ticket =
            bincode::deserialize(body).map_err(|e| malformed(format!("bad ticket body: {}", e)))?;
        ticket.version = version;
        Ok(ticket)
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut encoded = BASE32_NOPAD.encode(&self.to_bytes());
        encoded.make_ascii_lowercase();
        write!(f, "{}", encoded)
    }
}

impl FromStr for Ticket {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data = BASE32_NOPAD
            .decode(s.trim().to_ascii_uppercase().as_bytes())
            .map_err(|e| malformed(format!("bad base32: {}", e)))?;
        Ticket::from_bytes(&data)
    }
}

fn malformed(reason: impl Into<String>) -> TransferError {
    TransferError::MalformedTicket {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Ticket {
        Ticket::new(
            "192.168.1.20:4433".parse().unwrap(),
            blake3::hash(b"sample content").into(),
            14,
        )
    }

    #[test]
    fn round_trip_recovers_every_field() {
        let ticket = sample();
        let decoded: Ticket = ticket.to_string().parse().unwrap();
        assert_eq!(decoded, ticket);
        assert_eq!(decoded.version, TICKET_VERSION);
    }

    #[test]
    fn encoding_is_deterministic() {
        assert_eq!(sample().to_string(), sample().to_string());
    }

    #[test]
    fn text_is_lowercase_and_case_insensitive_to_parse() {
        let ticket = sample();
        let text = ticket.to_string();
        assert_eq!(text, text.to_ascii_lowercase());

        let decoded: Ticket = text.to_ascii_uppercase().parse().unwrap();
        assert_eq!(decoded, ticket);
    }

    #[test]
    fn truncated_ticket_is_malformed() {
        let text = sample().to_string();
        let truncated = &text[..text.len() / 2];
        assert!(matches!(
            truncated.parse::<Ticket>(),
            Err(TransferError::MalformedTicket { .. })
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            "definitely not a ticket!!".parse::<Ticket>(),
            Err(TransferError::MalformedTicket { .. })
        ));
    }

    #[test]
    fn future_version_is_rejected_before_body_parse() {
        let mut data = sample().to_bytes();
        data[0] = TICKET_VERSION + 1;
        let mut text = BASE32_NOPAD.encode(&data);
        text.make_ascii_lowercase();

        let err = text.parse::<Ticket>().unwrap_err();
        match err {
            TransferError::MalformedTicket { reason } => {
                assert!(reason.contains("version"), "unexpected reason: {}", reason)
            }
            other => panic!("expected MalformedTicket, got {:?}", other),
        }
    }
}
