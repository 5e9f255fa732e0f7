//! Content fingerprints used as dedup identity.
//!
//! A fingerprint is the lowercase hex SHA-256 digest of a file's full byte
//! content, so renaming a file never changes it and any byte change does.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

/// Read size used when streaming a file through the hasher.
const CHUNK_SIZE: usize = 64 * 1024;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Fingerprint the full content of the file at `path`.
///
/// The file is streamed in fixed-size chunks so large videos are never held
/// in memory at once.
pub async fn fingerprint_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
