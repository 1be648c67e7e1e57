//! QUIC-based transfer core using quinn.
//!
//! This module provides:
//! - endpoint construction for both roles (sender listens, receiver dials)
//! - the length-delimited wire protocol and its frames
//! - the sending and receiving halves of the transfer engine
//! - incremental BLAKE3 fingerprinting

pub mod hash;
pub mod protocol;
pub mod quic;
pub mod receiver;
pub mod sender;

pub use hash::{Fingerprint, FingerprintBuilder, fingerprint_file};
pub use quic::{accept_one, dial, make_receiver_endpoint, make_sender_endpoint};
