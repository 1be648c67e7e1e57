use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::config::CHUNK_SIZE;
use crate::error::Result;

/// 32-byte BLAKE3 digest over the entirety of a file's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for b in self.0 {
            out.push_str(&format!("{:02x}", b));
        }
        out
    }
}

impl From<blake3::Hash> for Fingerprint {
    fn from(hash: blake3::Hash) -> Self {
        Fingerprint(*hash.as_bytes())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

/// Incremental fingerprint accumulator, fed every payload byte in frame
/// order on both sides of a transfer.
pub struct FingerprintBuilder {
    hasher: blake3::Hasher,
}

impl FingerprintBuilder {
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finalize(self) -> Fingerprint {
        self.hasher.finalize().into()
    }
}

impl Default for FingerprintBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute a file's fingerprint and length in a single pass.
pub async fn fingerprint_file(path: &Path) -> Result<(Fingerprint, u64)> {
    let mut file = File::open(path).await?;
    let mut builder = FingerprintBuilder::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut length: u64 = 0;

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        builder.update(&buffer[..n]);
        length += n as u64;
    }

    Ok((builder.finalize(), length))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_matches_one_shot() {
        let data = b"the quick brown fox jumps over the lazy dog";

        let mut builder = FingerprintBuilder::new();
        for piece in data.chunks(7) {
            builder.update(piece);
        }
        let incremental = builder.finalize();

        let one_shot: Fingerprint = blake3::hash(data).into();
        assert_eq!(incremental, one_shot);
    }

    #[test]
    fn hex_is_64_lowercase_chars() {
        let fp: Fingerprint = blake3::hash(b"beam").into();
        let hex = fp.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn file_fingerprint_reports_length() {
        let path = std::env::temp_dir().join(format!("beam_hash_{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        let (fp, len) = fingerprint_file(&path).await.unwrap();
        assert_eq!(len, 10);
        assert_eq!(fp, blake3::hash(b"0123456789").into());

        let _ = tokio::fs::remove_file(&path).await;
    }
}
