//! Content hashing for change comparison and echo detection.
//!
//! BLAKE3 hex digests; the same digest form is stored by the echo guard
//! and exchanged with the opposite-direction replicator.

/// Hash bytes using BLAKE3, returned as a hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    // Parallel hashing for buffers > 128KB
    if data.len() > 128 * 1024 {
        let mut hasher = blake3::Hasher::new();
        hasher.update_rayon(data);
        hasher.finalize().to_hex().to_string()
    } else {
        blake3::hash(data).to_hex().to_string()
    }
}
