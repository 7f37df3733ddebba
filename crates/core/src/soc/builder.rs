//! Top-level SoC assembly (spec §4.9 "Boot sequence"): wires the bus, the
//! cartridge command port, backup memory, and an optional SD/FAT image
//! together from a loaded ROM and [`crate::config::Config`].

use crate::common::constants::CART_HEADER_SIZE;
use crate::common::NdsError;
use crate::config::{BackupKind, Config};
use crate::soc::bus::Bus;
use crate::soc::devices::backup::{BackupMemory, ChipKind};
use crate::soc::devices::cart::CartPort;
use crate::soc::devices::fat::FatImage;
use std::path::Path;

/// Everything outside the two CPU cores: the bus and the external
/// collaborator stubs a booted cartridge can reach.
pub struct Soc {
    /// Address-decoded memory bus.
    pub bus: Bus,
    /// Cartridge command port, built over the loaded ROM image.
    pub cart: CartPort,
    /// Backup (save) memory, if a save path was configured.
    pub backup: Option<BackupMemory>,
    /// FAT-on-directory SD image, if an SD index was configured.
    pub sd: Option<FatImage>,
}

impl Soc {
    /// Builds a `Soc` from a loaded ROM image and configuration: detects (or
    /// reads the configured) backup chip kind, loads an existing save file or
    /// starts one erased, and opens the SD image if configured.
    ///
    /// # Errors
    ///
    /// Returns [`NdsError::RomTooSmall`] if `rom` doesn't contain a full
    /// header, or propagates a save/SD-index load failure.
    pub fn new(rom: Vec<u8>, config: &Config) -> Result<Self, NdsError> {
        if rom.len() < CART_HEADER_SIZE {
            return Err(NdsError::RomTooSmall(rom.len()));
        }

        let chip_kind = resolve_backup_kind(&config.cart.backup_kind)?;
        let backup = match config.cart.save_path.as_deref().map(Path::new) {
            Some(path) if path.exists() => Some(BackupMemory::load(path, chip_kind)?),
            Some(_) => Some(BackupMemory::new(chip_kind)),
            None => None,
        };

        let sd = match config.sd.image_path.as_deref() {
            Some(index_path) => {
                let index_path = Path::new(index_path);
                let root = index_path.parent().unwrap_or_else(|| Path::new("."));
                Some(FatImage::load(index_path, root, config.sd.read_only)?)
            }
            None => None,
        };

        Ok(Self { bus: Bus::new(), cart: CartPort::new(rom), backup, sd })
    }
}

/// Resolves a configured [`BackupKind`] to a concrete [`ChipKind`].
/// `BackupKind::Auto` is modeled by the most common retail default
/// (512 KiB FLASH); real auto-detection would inspect the cartridge's save
/// type ID in its header, which is out of scope here (spec §8.2).
fn resolve_backup_kind(kind: &BackupKind) -> Result<ChipKind, NdsError> {
    match kind {
        BackupKind::Auto => Ok(ChipKind::Flash),
        BackupKind::Named(name) => match name.as_str() {
            "eeprom4k" => Ok(ChipKind::Eeprom4k),
            "eeprom64k" => Ok(ChipKind::Eeprom64k),
            "eeprom512k" => Ok(ChipKind::Eeprom512k),
            "flash" => Ok(ChipKind::Flash),
            "nand" => Ok(ChipKind::Nand),
            other => Err(NdsError::BackupKindUnknown(other.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn rejects_rom_shorter_than_header() {
        let err = Soc::new(vec![0u8; 10], &Config::default()).unwrap_err();
        assert!(matches!(err, NdsError::RomTooSmall(10)));
    }

    #[test]
    fn builds_with_no_backup_or_sd_configured() {
        let soc = Soc::new(vec![0u8; CART_HEADER_SIZE], &Config::default()).unwrap();
        assert!(soc.backup.is_none());
        assert!(soc.sd.is_none());
    }

    #[test]
    fn unknown_named_backup_kind_is_rejected() {
        let mut config = Config::default();
        config.cart.backup_kind = BackupKind::Named("not-a-chip".to_string());
        config.cart.save_path = Some("/tmp/nds-core-test-does-not-exist.sav".to_string());
        let err = Soc::new(vec![0u8; CART_HEADER_SIZE], &config).unwrap_err();
        assert!(matches!(err, NdsError::BackupKindUnknown(_)));
    }
}
