//! Squashfs artifact validation.
//!
//! Only file metadata and the 96-byte superblock are read. Nothing here
//! needs privileges or has side effects.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use snow_common::constants::{SQUASHFS_MAGIC, SQUASHFS_SUPERBLOCK_LEN};
use snow_common::error::{LaunchError, Result};
use snow_common::types::ImageLocation;

/// Compression algorithm recorded in the superblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// zlib / gzip.
    Gzip,
    /// LZMA.
    Lzma,
    /// LZO.
    Lzo,
    /// XZ.
    Xz,
    /// LZ4.
    Lz4,
    /// Zstandard.
    Zstd,
    /// An id this launcher does not know; the kernel may still support it.
    Unknown(u16),
}

impl From<u16> for Compression {
    fn from(id: u16) -> Self {
        match id {
            1 => Self::Gzip,
            2 => Self::Lzma,
            3 => Self::Lzo,
            4 => Self::Xz,
            5 => Self::Lz4,
            6 => Self::Zstd,
            other => Self::Unknown(other),
        }
    }
}

/// Facts about a validated image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Where the image lives.
    pub location: ImageLocation,
    /// Bytes of the region used by the filesystem.
    pub bytes_used: u64,
    /// Data block size.
    pub block_size: u32,
    /// Compression algorithm.
    pub compression: Compression,
    /// Format version (major, minor).
    pub version: (u16, u16),
}

fn invalid(path: &Path, reason: impl Into<String>) -> LaunchError {
    LaunchError::InvalidArtifact {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn u16_at(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn u64_at(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

/// Checks that `image` exists, is readable, non-empty, and starts with a
/// well-formed squashfs 4.x superblock that fits inside the region.
///
/// # Errors
///
/// Returns `LaunchError::InvalidArtifact` describing the first problem found.
pub fn validate_artifact(image: &ImageLocation) -> Result<ImageInfo> {
    let path = image.path.as_path();
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => invalid(path, "file does not exist"),
        _ => invalid(path, format!("cannot stat: {e}")),
    })?;
    if !metadata.is_file() {
        return Err(invalid(path, "not a regular file"));
    }
    let file_len = metadata.len();
    if file_len == 0 {
        return Err(invalid(path, "file is empty"));
    }

    let region_len = match image.length {
        Some(len) => len,
        None => file_len.saturating_sub(image.offset),
    };
    let region_end = image.offset.checked_add(region_len);
    if region_end.is_none_or(|end| end > file_len) {
        return Err(invalid(
            path,
            format!(
                "image region {}+{region_len} exceeds file size {file_len}",
                image.offset
            ),
        ));
    }
    if region_len < SQUASHFS_SUPERBLOCK_LEN {
        return Err(invalid(
            path,
            format!("{region_len} bytes at offset {} is too small for a squashfs superblock", image.offset),
        ));
    }

    let mut file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => invalid(path, "file is not readable"),
        _ => invalid(path, format!("cannot open: {e}")),
    })?;
    let mut superblock = [0u8; SQUASHFS_SUPERBLOCK_LEN as usize];
    let _ = file
        .seek(SeekFrom::Start(image.offset))
        .map_err(|e| invalid(path, format!("cannot seek to offset {}: {e}", image.offset)))?;
    file.read_exact(&mut superblock)
        .map_err(|e| invalid(path, format!("cannot read superblock: {e}")))?;

    let info = parse_superblock(image, &superblock).map_err(|reason| invalid(path, reason))?;
    if info.bytes_used > region_len {
        return Err(invalid(
            path,
            format!(
                "truncated image: superblock claims {} bytes, region holds {region_len}",
                info.bytes_used
            ),
        ));
    }

    tracing::debug!(
        image = %image,
        bytes_used = info.bytes_used,
        compression = ?info.compression,
        "image artifact validated"
    );
    Ok(info)
}

fn parse_superblock(image: &ImageLocation, sb: &[u8]) -> std::result::Result<ImageInfo, String> {
    let magic = u32_at(sb, 0);
    if magic != SQUASHFS_MAGIC {
        return Err(format!("not a squashfs image (magic {magic:#010x})"));
    }
    let version = (u16_at(sb, 28), u16_at(sb, 30));
    if version.0 != 4 {
        return Err(format!("unsupported squashfs version {}.{}", version.0, version.1));
    }
    let block_size = u32_at(sb, 12);
    let block_log = u16_at(sb, 22);
    if !block_size.is_power_of_two() || u32::from(block_log) >= 32 || 1u32 << block_log != block_size {
        return Err(format!("inconsistent block size {block_size} (log {block_log})"));
    }
    let bytes_used = u64_at(sb, 40);
    if bytes_used < SQUASHFS_SUPERBLOCK_LEN {
        return Err(format!("superblock reports {bytes_used} bytes used"));
    }
    Ok(ImageInfo {
        location: image.clone(),
        bytes_used,
        block_size,
        compression: Compression::from(u16_at(sb, 20)),
        version,
    })
}

/// Builds a minimal squashfs 4.0 superblock.
#[cfg(test)]
fn test_superblock(bytes_used: u64) -> Vec<u8> {
    let mut sb = vec![0u8; SQUASHFS_SUPERBLOCK_LEN as usize];
    sb[0..4].copy_from_slice(&SQUASHFS_MAGIC.to_le_bytes());
    sb[12..16].copy_from_slice(&131_072u32.to_le_bytes());
    sb[20..22].copy_from_slice(&4u16.to_le_bytes());
    sb[22..24].copy_from_slice(&17u16.to_le_bytes());
    sb[28..30].copy_from_slice(&4u16.to_le_bytes());
    sb[40..48].copy_from_slice(&bytes_used.to_le_bytes());
    sb
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn image_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(contents).expect("write");
        file
    }

    fn padded_image(bytes_used: u64, total: usize) -> Vec<u8> {
        let mut data = test_superblock(bytes_used);
        data.resize(total, 0);
        data
    }

    #[test]
    fn valid_image_is_accepted() {
        let file = image_file(&padded_image(4096, 4096));
        let info = validate_artifact(&ImageLocation::new(file.path())).expect("valid");
        assert_eq!(info.bytes_used, 4096);
        assert_eq!(info.compression, Compression::Xz);
        assert_eq!(info.version, (4, 0));
    }

    #[test]
    fn missing_file_is_rejected() {
        let err = validate_artifact(&ImageLocation::new("/nonexistent/rootfs.squashfs")).unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{err}");
    }

    #[test]
    fn empty_file_is_rejected() {
        let file = image_file(b"");
        let err = validate_artifact(&ImageLocation::new(file.path())).unwrap_err();
        assert!(err.to_string().contains("empty"), "{err}");
    }

    #[test]
    fn directory_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = validate_artifact(&ImageLocation::new(dir.path())).unwrap_err();
        assert!(err.to_string().contains("not a regular file"), "{err}");
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut data = padded_image(4096, 4096);
        data[0..4].copy_from_slice(b"CD00");
        let file = image_file(&data);
        let err = validate_artifact(&ImageLocation::new(file.path())).unwrap_err();
        assert!(err.to_string().contains("not a squashfs image"), "{err}");
    }

    #[test]
    fn old_format_version_is_rejected() {
        let mut data = padded_image(4096, 4096);
        data[28..30].copy_from_slice(&3u16.to_le_bytes());
        let file = image_file(&data);
        assert!(validate_artifact(&ImageLocation::new(file.path())).is_err());
    }

    #[test]
    fn truncated_image_is_rejected() {
        let file = image_file(&padded_image(1 << 20, 4096));
        let err = validate_artifact(&ImageLocation::new(file.path())).unwrap_err();
        assert!(err.to_string().contains("truncated"), "{err}");
    }

    #[test]
    fn image_at_offset_is_found() {
        let mut data = vec![0xAAu8; 512];
        data.extend(padded_image(1024, 1024));
        data.extend([0xBBu8; 256]);
        let file = image_file(&data);
        let location = ImageLocation {
            path: file.path().to_path_buf(),
            offset: 512,
            length: Some(1024),
        };
        let info = validate_artifact(&location).expect("valid");
        assert_eq!(info.location.offset, 512);
    }

    #[test]
    fn region_past_end_of_file_is_rejected() {
        let file = image_file(&padded_image(1024, 1024));
        let location = ImageLocation {
            path: file.path().to_path_buf(),
            offset: 512,
            length: Some(1024),
        };
        let err = validate_artifact(&location).unwrap_err();
        assert!(err.to_string().contains("exceeds file size"), "{err}");
    }

    #[test]
    fn tiny_file_is_rejected() {
        let file = image_file(b"hsqs");
        let err = validate_artifact(&ImageLocation::new(file.path())).unwrap_err();
        assert!(err.to_string().contains("too small"), "{err}");
    }
}
