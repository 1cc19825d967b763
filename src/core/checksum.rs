use std::io::Read;

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Service computing the content checksums behind the exact-duplicate signal.
///
/// The engine performs no disk I/O: callers hand in the bytes (or a reader
/// over them) and store the resulting hex digest in [`ItemMetadata.checksum`].
///
/// [`ItemMetadata.checksum`]: crate::core::media::ItemMetadata
pub struct ChecksumService;

impl ChecksumService {
    pub fn new() -> Self {
        Self
    }

    /// SHA-256 of a byte buffer, as 64 lowercase hex characters.
    pub fn compute(&self, bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    /// SHA-256 of a stream, read in 8 KiB chunks.
    pub fn compute_from_reader<R: Read>(&self, reader: &mut R) -> Result<String, ChecksumError> {
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Checksum many buffers in parallel, preserving input order.
    pub fn compute_batch(&self, buffers: &[&[u8]]) -> Vec<String> {
        buffers.par_iter().map(|bytes| self.compute(bytes)).collect()
    }
}

impl Default for ChecksumService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_deterministic_hex() {
        let service = ChecksumService::new();
        let a = service.compute(b"Hello, World!");
        let b = service.compute(b"Hello, World!");

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_content_different_checksum() {
        let service = ChecksumService::new();
        assert_ne!(service.compute(b"Content A"), service.compute(b"Content B"));
    }

    #[test]
    fn reader_matches_buffer() {
        let service = ChecksumService::new();
        let payload = vec![0xA5u8; 20_000];

        let from_bytes = service.compute(&payload);
        let from_reader = service
            .compute_from_reader(&mut std::io::Cursor::new(&payload))
            .unwrap();

        assert_eq!(from_bytes, from_reader);
    }

    #[test]
    fn reader_over_file_matches_buffer() {
        use std::fs::{self, File};
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("original.jpg");
        let content = b"not really a jpeg, but bytes are bytes";
        fs::write(&file_path, content).unwrap();

        let service = ChecksumService::new();
        let mut file = File::open(&file_path).unwrap();
        let from_file = service.compute_from_reader(&mut file).unwrap();

        assert_eq!(from_file, service.compute(content));
    }

    #[test]
    fn batch_preserves_order() {
        let service = ChecksumService::new();
        let buffers: Vec<&[u8]> = vec![b"one", b"two", b"three"];
        let digests = service.compute_batch(&buffers);

        assert_eq!(digests.len(), 3);
        assert_eq!(digests[0], service.compute(b"one"));
        assert_eq!(digests[2], service.compute(b"three"));
    }
}
