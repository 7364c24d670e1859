//! Images embedded in an ELF executable.
//!
//! A launcher can carry its root filesystem as an extra section (by
//! default `.squashfs`). The section's file offset and size become the
//! image region, so the loop device maps the section directly.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use goblin::container::Ctx;
use goblin::elf::header::header64;
use goblin::elf::section_header::{SHT_NOBITS, SectionHeader};
use goblin::elf::Elf;
use goblin::strtab::Strtab;
use snow_common::config::ImageSource;
use snow_common::error::{LaunchError, Result};
use snow_common::types::ImageLocation;

fn invalid(path: &Path, reason: impl Into<String>) -> LaunchError {
    LaunchError::InvalidArtifact {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Reads `len` bytes at `offset`, refusing regions past the end of the file.
fn read_region(file: &mut File, file_len: u64, offset: u64, len: u64) -> io::Result<Vec<u8>> {
    if offset.checked_add(len).is_none_or(|end| end > file_len) {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "region extends past end of file",
        ));
    }
    let len = usize::try_from(len).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut buf = vec![0u8; len];
    let _ = file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Finds `section` in the ELF file at `executable` and returns its region.
///
/// Only the ELF header, the section header table, and the section name
/// table are read; the embedded image itself is never loaded.
///
/// `/proc/self/exe` is resolved to the real binary path first so that the
/// loop device records a meaningful backing file name.
///
/// # Errors
///
/// Returns `LaunchError::InvalidArtifact` if the file is not ELF, the section
/// is missing, or the section occupies no file space.
pub fn locate_section(executable: &Path, section: &str) -> Result<ImageLocation> {
    let path: PathBuf =
        std::fs::canonicalize(executable).unwrap_or_else(|_| executable.to_path_buf());
    let cannot_read = |e: io::Error| invalid(&path, format!("cannot read executable: {e}"));
    let not_elf = |e: goblin::error::Error| invalid(&path, format!("not an ELF executable: {e}"));

    let mut file = File::open(&path).map_err(cannot_read)?;
    let file_len = file.metadata().map_err(cannot_read)?.len();

    let mut ident = Vec::with_capacity(header64::SIZEOF_EHDR);
    let _ = file
        .by_ref()
        .take(header64::SIZEOF_EHDR as u64)
        .read_to_end(&mut ident)
        .map_err(cannot_read)?;
    let elf_header = Elf::parse_header(&ident).map_err(not_elf)?;
    let ctx = Ctx::new(
        elf_header.container().map_err(not_elf)?,
        elf_header.endianness().map_err(not_elf)?,
    );

    if elf_header.e_shoff == 0 || elf_header.e_shnum == 0 {
        return Err(invalid(&path, "no section header table"));
    }
    let count = usize::from(elf_header.e_shnum);
    let table_len = u64::from(elf_header.e_shentsize) * u64::from(elf_header.e_shnum);
    let table =
        read_region(&mut file, file_len, elf_header.e_shoff, table_len).map_err(cannot_read)?;
    let headers = SectionHeader::parse_from(&table, 0, count, ctx).map_err(not_elf)?;

    let names = headers
        .get(usize::from(elf_header.e_shstrndx))
        .ok_or_else(|| invalid(&path, "missing section name table"))?;
    let names = read_region(&mut file, file_len, names.sh_offset, names.sh_size)
        .map_err(cannot_read)?;
    let names = Strtab::parse(&names, 0, names.len(), 0).map_err(not_elf)?;

    let header = headers
        .iter()
        .find(|sh| names.get_at(sh.sh_name) == Some(section))
        .ok_or_else(|| invalid(&path, format!("no {section} section")))?;
    if header.sh_type == SHT_NOBITS || header.sh_size == 0 {
        return Err(invalid(&path, format!("{section} section is empty")));
    }

    tracing::debug!(
        executable = %path.display(),
        section,
        offset = header.sh_offset,
        size = header.sh_size,
        "embedded image located"
    );
    Ok(ImageLocation {
        path,
        offset: header.sh_offset,
        length: Some(header.sh_size),
    })
}

/// Turns an [`ImageSource`] into a concrete file region.
///
/// # Errors
///
/// Returns `LaunchError::InvalidArtifact` if an embedded section cannot be found.
pub fn resolve(source: &ImageSource) -> Result<ImageLocation> {
    match source {
        ImageSource::File(location) => Ok(location.clone()),
        ImageSource::Embedded { executable, section } => locate_section(executable, section),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn finds_text_section_of_test_binary() {
        let exe = std::env::current_exe().expect("current exe");
        let location = locate_section(&exe, ".text").expect("text section");
        assert!(location.offset > 0);
        assert!(location.length.is_some_and(|len| len > 0));
    }

    #[test]
    fn missing_section_is_invalid_artifact() {
        let exe = std::env::current_exe().expect("current exe");
        let err = locate_section(&exe, ".no-such-section").unwrap_err();
        assert!(matches!(err, LaunchError::InvalidArtifact { .. }));
    }

    #[test]
    fn non_elf_file_is_invalid_artifact() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(b"#!/bin/sh\necho not elf\n").expect("write");
        let err = locate_section(file.path(), ".squashfs").unwrap_err();
        assert!(err.to_string().contains("not an ELF"), "{err}");
    }

    #[test]
    fn file_source_resolves_to_itself() {
        let location = ImageLocation::at_offset("/srv/rootfs.squashfs", 4096);
        let resolved = resolve(&ImageSource::File(location.clone())).expect("resolve");
        assert_eq!(resolved, location);
    }

    const SHT_PROGBITS: u32 = 1;
    const SHT_STRTAB: u32 = 3;

    fn section_header(name: u32, kind: u32, offset: u64, size: u64) -> Vec<u8> {
        let mut sh = vec![0u8; 64];
        sh[0..4].copy_from_slice(&name.to_le_bytes());
        sh[4..8].copy_from_slice(&kind.to_le_bytes());
        sh[24..32].copy_from_slice(&offset.to_le_bytes());
        sh[32..40].copy_from_slice(&size.to_le_bytes());
        sh
    }

    /// A little-endian ELF64 file with a 64-byte `.squashfs` payload at
    /// offset 64 and a `.bss` section that occupies no file space.
    fn elf_fixture() -> tempfile::NamedTempFile {
        let names = b"\0.shstrtab\0.squashfs\0.bss\0";
        let shoff: u64 = 160;

        let mut elf = vec![0u8; 64];
        elf[0..4].copy_from_slice(b"\x7fELF");
        elf[4] = 2; // ELFCLASS64
        elf[5] = 1; // ELFDATA2LSB
        elf[6] = 1; // EV_CURRENT
        elf[16..18].copy_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        elf[18..20].copy_from_slice(&62u16.to_le_bytes()); // EM_X86_64
        elf[20..24].copy_from_slice(&1u32.to_le_bytes());
        elf[40..48].copy_from_slice(&shoff.to_le_bytes());
        elf[52..54].copy_from_slice(&64u16.to_le_bytes());
        elf[54..56].copy_from_slice(&56u16.to_le_bytes());
        elf[58..60].copy_from_slice(&64u16.to_le_bytes());
        elf[60..62].copy_from_slice(&4u16.to_le_bytes());
        elf[62..64].copy_from_slice(&1u16.to_le_bytes());

        elf.extend_from_slice(&[0xAB; 64]);
        elf.extend_from_slice(names);
        elf.resize(160, 0);
        elf.extend(section_header(0, 0, 0, 0));
        elf.extend(section_header(1, SHT_STRTAB, 128, names.len() as u64));
        elf.extend(section_header(11, SHT_PROGBITS, 64, 64));
        elf.extend(section_header(21, SHT_NOBITS, 128, 4096));

        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(&elf).expect("write fixture");
        file
    }

    #[test]
    fn embedded_section_region_is_located() {
        let fixture = elf_fixture();
        let location = locate_section(fixture.path(), ".squashfs").expect("section");
        assert_eq!(location.offset, 64);
        assert_eq!(location.length, Some(64));
    }

    #[test]
    fn nobits_section_is_rejected_as_empty() {
        let fixture = elf_fixture();
        let err = locate_section(fixture.path(), ".bss").unwrap_err();
        assert!(err.to_string().contains(".bss section is empty"), "{err}");
    }

    #[test]
    fn truncated_section_table_is_invalid_artifact() {
        let fixture = elf_fixture();
        fixture.as_file().set_len(200).expect("truncate");
        let err = locate_section(fixture.path(), ".squashfs").unwrap_err();
        assert!(matches!(err, LaunchError::InvalidArtifact { .. }), "{err}");
    }
}
