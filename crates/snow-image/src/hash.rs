//! SHA-256 content verification.
//!
//! Confirms that the image region is exactly the artifact the caller
//! expects before it is attached and mounted.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use sha2::{Digest, Sha256};
use snow_common::error::{LaunchError, Result};
use snow_common::types::{ImageLocation, Sha256Hash};

const CHUNK: usize = 64 * 1024;

/// Computes the SHA-256 of the image region.
///
/// # Errors
///
/// Returns `LaunchError::InvalidArtifact` if the file cannot be read.
pub fn hash_region(image: &ImageLocation) -> Result<Sha256Hash> {
    tracing::debug!(image = %image, "computing SHA-256 hash");
    let read_error = |e: std::io::Error| LaunchError::InvalidArtifact {
        path: image.path.clone(),
        reason: format!("cannot hash image: {e}"),
    };

    let mut file = File::open(&image.path).map_err(read_error)?;
    let _ = file.seek(SeekFrom::Start(image.offset)).map_err(read_error)?;
    let mut reader: Box<dyn Read> = match image.length {
        Some(len) => Box::new(file.take(len)),
        None => Box::new(file),
    };

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = reader.read(&mut buf).map_err(read_error)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Sha256Hash::from_hex(format!("{:x}", hasher.finalize()))
}

/// Validates that the image region matches the expected SHA-256 hash.
///
/// # Errors
///
/// Returns `LaunchError::InvalidArtifact` if the hashes do not match or the
/// file cannot be read.
pub fn verify_digest(image: &ImageLocation, expected: &Sha256Hash) -> Result<()> {
    let actual = hash_region(image)?;
    if actual != *expected {
        return Err(LaunchError::InvalidArtifact {
            path: image.path.clone(),
            reason: format!("digest mismatch: expected {expected}, got {actual}"),
        });
    }
    tracing::info!(image = %image, digest = %actual, "image digest verified");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // sha256("hello")
    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn file_with(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(contents).expect("write");
        file
    }

    #[test]
    fn hash_of_whole_file() {
        let file = file_with(b"hello");
        let hash = hash_region(&ImageLocation::new(file.path())).expect("hash");
        assert_eq!(hash.as_hex(), HELLO);
    }

    #[test]
    fn hash_covers_only_the_region() {
        let file = file_with(b"xxhelloyy");
        let location = ImageLocation {
            path: file.path().to_path_buf(),
            offset: 2,
            length: Some(5),
        };
        assert_eq!(hash_region(&location).expect("hash").as_hex(), HELLO);
    }

    #[test]
    fn verify_digest_accepts_match_and_rejects_mismatch() {
        let file = file_with(b"hello");
        let location = ImageLocation::new(file.path());
        let good = Sha256Hash::from_hex(HELLO).expect("hex");
        verify_digest(&location, &good).expect("match");

        let bad = Sha256Hash::from_hex("0".repeat(64)).expect("hex");
        let err = verify_digest(&location, &bad).unwrap_err();
        assert!(err.to_string().contains("digest mismatch"), "{err}");
    }
}
