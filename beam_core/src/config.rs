use std::time::Duration;

/// Block size for reading the source file; one frame carries one block.
///
/// Not part of the wire contract: frames are self-length-delimited, so a
/// receiver accepts whatever block size the sender chose.
pub const CHUNK_SIZE: usize = 256 * 1024;

/// Upper bound for a single wire message, frames included. Anything larger
/// is rejected before allocation.
pub const MAX_WIRE_MSG: usize = CHUNK_SIZE + 1024;

/// Delay between dial attempts while the sender is not yet listening.
pub const DIAL_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Cap on a single QUIC handshake attempt within the dial loop.
pub const DIAL_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 10;

/// Overall deadline for the connect phase. `BEAM_DIAL_TIMEOUT` (seconds)
/// overrides the default, mainly for tests.
pub fn dial_timeout() -> Duration {
    let secs = std::env::var("BEAM_DIAL_TIMEOUT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_DIAL_TIMEOUT_SECS);
    Duration::from_secs(secs)
}
