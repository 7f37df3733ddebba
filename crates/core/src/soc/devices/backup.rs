//! SPI backup memory stub (spec §8.2): EEPROM/FLASH/NAND save storage, and
//! the IR/Bluetooth peripherals that share the same SPI bus on retail
//! hardware but carry no save-relevant state.
//!
//! The save chip's real protocol (opcodes, write-enable latches, page
//! boundaries) is out of scope; this models only what a core-level
//! contract needs: a byte-addressable store that round-trips to a save
//! file and reports a size mismatch if the file on disk doesn't match the
//! detected (or configured) chip capacity.

use crate::common::NdsError;
use std::fs;
use std::path::Path;

/// Backup-chip capacities this stub can model, keyed by the save-type names
/// a cartridge database or `.sav` heuristic would report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChipKind {
    /// 512-byte EEPROM.
    Eeprom4k,
    /// 8 KiB/64 KiB EEPROM (FRAM-class titles use the smaller variant).
    Eeprom64k,
    /// 256 KiB EEPROM.
    Eeprom512k,
    /// 512 KiB/1 MiB/8 MiB FLASH.
    Flash,
    /// NAND (DS-era large-capacity titles).
    Nand,
}

impl ChipKind {
    /// Nominal capacity in bytes for the chip kind, used only to size a
    /// freshly created (no existing save file) backup image.
    pub fn default_size(self) -> usize {
        match self {
            ChipKind::Eeprom4k => 512,
            ChipKind::Eeprom64k => 0x2000,
            ChipKind::Eeprom512k => 0x1_0000,
            ChipKind::Flash => 0x8_0000,
            ChipKind::Nand => 0x80_0000,
        }
    }
}

/// The backup-memory contract surface: a flat byte store with load/save.
pub struct BackupMemory {
    bytes: Vec<u8>,
}

impl BackupMemory {
    /// Creates a zero-filled (erased) backup image of `kind`'s nominal size.
    pub fn new(kind: ChipKind) -> Self {
        Self { bytes: vec![0xFF; kind.default_size()] }
    }

    /// Loads a save file from disk. Returns `NdsError::SaveFileSizeMismatch`
    /// if the file's size doesn't match `kind`'s nominal capacity (spec §7
    /// "a save file must match the detected chip's declared size exactly;
    /// silently truncating or zero-extending a mismatched file is explicitly
    /// rejected").
    pub fn load(path: &Path, kind: ChipKind) -> Result<Self, NdsError> {
        let data = fs::read(path)?;
        let expected = kind.default_size();
        if data.len() != expected {
            return Err(NdsError::SaveFileSizeMismatch { expected, actual: data.len() });
        }
        Ok(Self { bytes: data })
    }

    /// Persists the current image to `path`.
    pub fn save(&self, path: &Path) -> Result<(), NdsError> {
        fs::write(path, &self.bytes)?;
        Ok(())
    }

    /// Reads one byte at `offset`, wrapping within the image.
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.bytes[offset % self.bytes.len().max(1)]
    }

    /// Writes one byte at `offset`, wrapping within the image.
    pub fn write_u8(&mut self, offset: usize, value: u8) {
        let len = self.bytes.len().max(1);
        let idx = offset % len;
        self.bytes[idx] = value;
    }

    /// Total backing size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the image has zero capacity (should never happen for a
    /// constructed `BackupMemory`, kept for API symmetry).
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn fresh_backup_is_erased_to_0xff() {
        let b = BackupMemory::new(ChipKind::Eeprom4k);
        assert!(b.bytes.iter().all(|&x| x == 0xFF));
    }

    #[test]
    fn round_trips_through_a_save_file() {
        let file = NamedTempFile::new().unwrap();
        let mut b = BackupMemory::new(ChipKind::Eeprom4k);
        b.write_u8(10, 0x42);
        b.save(file.path()).unwrap();
        let reloaded = BackupMemory::load(file.path(), ChipKind::Eeprom4k).unwrap();
        assert_eq!(reloaded.read_u8(10), 0x42);
    }

    #[test]
    fn mismatched_save_size_is_rejected() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), vec![0u8; 10]).unwrap();
        let err = BackupMemory::load(file.path(), ChipKind::Eeprom4k).unwrap_err();
        assert!(matches!(err, NdsError::SaveFileSizeMismatch { expected: 512, actual: 10 }));
    }
}
