//! Content digests for strict verification mode.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::SyncError;

const READ_BUF_SIZE: usize = 64 * 1024;

/// Compute the SHA-256 digest of a file's content as lowercase hex.
///
/// Blocking; callers run it on the blocking pool.
pub fn digest_file(path: &Path) -> Result<String, SyncError> {
    let file = File::open(path).map_err(|e| SyncError::io("open for digest", path, e))?;
    let mut reader = BufReader::with_capacity(READ_BUF_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| SyncError::io("read for digest", path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Digest of an in-memory buffer, same encoding as [`digest_file`].
pub fn digest_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).unwrap();

        assert_eq!(digest_file(&path).unwrap(), digest_bytes(&content));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            digest_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_missing_file() {
        let err = digest_file(Path::new("/nonexistent/foldersync/file")).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Io { ref source, .. } if source.kind() == std::io::ErrorKind::NotFound
        ));
    }
}
