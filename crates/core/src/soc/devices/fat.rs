//! FAT-on-host-directory storage (spec §8.4): an SD card image is presented
//! to the guest as a FAT filesystem, but this core never parses a real FAT
//! structure. Instead the host directory tree is flattened once at load time
//! into a sector-indexed table (an `.idx` line format: `sector_count path`
//! pairs, one per line) so a guest sector read maps directly to host file
//! bytes.
//!
//! This is explicitly a contract stub (spec §1): no FAT metadata (directory
//! entries, FAT12/16/32 cluster chains, long filenames) is modeled. Guest
//! code that reads raw sectors of a `.idx`-described image sees the
//! concatenation of the indexed files' bytes in the order listed.

use crate::common::constants::SD_SECTOR_SIZE;
use crate::common::NdsError;
use std::fs;
use std::path::{Path, PathBuf};

/// One indexed host file, with the sector range it occupies in the flattened
/// image.
#[derive(Clone, Debug)]
struct IndexEntry {
    path: PathBuf,
    start_sector: u64,
    sector_count: u64,
}

/// A flattened FAT-on-directory image built from an `.idx` index file.
pub struct FatImage {
    entries: Vec<IndexEntry>,
    total_sectors: u64,
    read_only: bool,
}

impl FatImage {
    /// Parses `index_path` (format: one `<sector_count> <relative path>` pair
    /// per line, blank lines and `#`-prefixed lines ignored) and resolves
    /// each relative path against `root`.
    pub fn load(index_path: &Path, root: &Path, read_only: bool) -> Result<Self, NdsError> {
        let text = fs::read_to_string(index_path)?;
        let mut entries = Vec::new();
        let mut cursor = 0u64;
        for (line_no, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut parts = trimmed.splitn(2, char::is_whitespace);
            let count_str = parts.next().unwrap_or("");
            let rel_path = parts.next().unwrap_or("").trim();
            let sector_count: u64 = count_str.parse().map_err(|_| NdsError::FatIndexParse {
                line: line_no + 1,
                reason: "sector count is not a valid integer".into(),
            })?;
            if rel_path.is_empty() {
                return Err(NdsError::FatIndexParse { line: line_no + 1, reason: "missing path".into() });
            }
            entries.push(IndexEntry { path: root.join(rel_path), start_sector: cursor, sector_count });
            cursor += sector_count;
        }
        Ok(Self { entries, total_sectors: cursor, read_only })
    }

    /// Total sector count of the flattened image.
    pub fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    /// Whether the underlying image rejects writes (spec default: `true`,
    /// per [`crate::config::SdConfig`]).
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn locate(&self, sector: u64) -> Option<(&IndexEntry, u64)> {
        self.entries
            .iter()
            .find(|e| sector >= e.start_sector && sector < e.start_sector + e.sector_count)
            .map(|e| (e, sector - e.start_sector))
    }

    /// Reads one 512-byte sector, zero-filling past the end of the backing
    /// host file (a file shorter than its declared sector count).
    pub fn read_sector(&self, sector: u64) -> Result<[u8; SD_SECTOR_SIZE], NdsError> {
        let mut out = [0u8; SD_SECTOR_SIZE];
        if let Some((entry, rel_sector)) = self.locate(sector) {
            let data = fs::read(&entry.path)?;
            let offset = (rel_sector as usize) * SD_SECTOR_SIZE;
            let avail = data.len().saturating_sub(offset).min(SD_SECTOR_SIZE);
            if avail > 0 {
                out[..avail].copy_from_slice(&data[offset..offset + avail]);
            }
        } else {
            return Err(NdsError::SdImageCorrupt(format!("no indexed file covers sector {sector}")));
        }
        Ok(out)
    }

    /// Writes one 512-byte sector back to its backing host file. No-op and
    /// `Ok` when `read_only` (matches a write-protect tab rather than a
    /// hardware fault).
    pub fn write_sector(&self, sector: u64, data: &[u8; SD_SECTOR_SIZE]) -> Result<(), NdsError> {
        if self.read_only {
            return Ok(());
        }
        let (entry, rel_sector) = self
            .locate(sector)
            .ok_or_else(|| NdsError::SdImageCorrupt(format!("no indexed file covers sector {sector}")))?;
        let mut contents = fs::read(&entry.path).unwrap_or_default();
        let offset = (rel_sector as usize) * SD_SECTOR_SIZE;
        if contents.len() < offset + SD_SECTOR_SIZE {
            contents.resize(offset + SD_SECTOR_SIZE, 0);
        }
        contents[offset..offset + SD_SECTOR_SIZE].copy_from_slice(data);
        fs::write(&entry.path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn reads_across_indexed_files_by_sector() {
        let dir = tempdir().unwrap();
        let file_a = dir.path().join("a.bin");
        fs::write(&file_a, vec![1u8; SD_SECTOR_SIZE]).unwrap();
        let index_path = dir.path().join("image.idx");
        let mut f = fs::File::create(&index_path).unwrap();
        writeln!(f, "1 a.bin").unwrap();

        let image = FatImage::load(&index_path, dir.path(), true).unwrap();
        assert_eq!(image.total_sectors(), 1);
        let sector = image.read_sector(0).unwrap();
        assert_eq!(sector[0], 1);
    }

    #[test]
    fn read_only_write_is_silently_ignored() {
        let dir = tempdir().unwrap();
        let file_a = dir.path().join("a.bin");
        fs::write(&file_a, vec![0u8; SD_SECTOR_SIZE]).unwrap();
        let index_path = dir.path().join("image.idx");
        fs::write(&index_path, "1 a.bin\n").unwrap();

        let image = FatImage::load(&index_path, dir.path(), true).unwrap();
        image.write_sector(0, &[9u8; SD_SECTOR_SIZE]).unwrap();
        let contents = fs::read(&file_a).unwrap();
        assert_eq!(contents[0], 0);
    }

    #[test]
    fn malformed_index_line_is_reported() {
        let dir = tempdir().unwrap();
        let index_path = dir.path().join("image.idx");
        fs::write(&index_path, "not-a-number a.bin\n").unwrap();
        let err = FatImage::load(&index_path, dir.path(), true).unwrap_err();
        assert!(matches!(err, NdsError::FatIndexParse { line: 1, .. }));
    }
}
