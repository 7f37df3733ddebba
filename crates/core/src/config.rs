//! Configuration system for the NDS CPU execution core.
//!
//! This module defines all configuration structures used to parameterize a
//! run. It provides:
//! 1. **Defaults:** Hardware constants mirrored from [`crate::common::constants`].
//! 2. **Structures:** Hierarchical config for boot mode, cartridge, SD card, and CP15.
//! 3. **Enums:** Boot mode and cache replacement policy choices.
//!
//! Configuration is supplied as JSON (matching the CLI's `--config` flag) or via
//! `Config::default()` for a headless direct-boot run.

use serde::Deserialize;

use crate::common::constants;

/// Default configuration constants, mirrored from the hardware-fixed values
/// in [`crate::common::constants`] so the config surface has its own
/// documented defaults independent of the constants module's wording.
mod defaults {
    use super::constants;

    /// Default ITCM size in bytes, matching the ARM946E-S reset state.
    pub const ITCM_SIZE: u32 = constants::ITCM_PHYS_SIZE;

    /// Default DTCM size in bytes, matching the ARM946E-S reset state.
    pub const DTCM_SIZE: u32 = constants::DTCM_PHYS_SIZE;
}

/// Boot mode selection.
///
/// Firmware boot is a recognized value so the configuration surface documents
/// the contract, but it is rejected at load time with
/// [`crate::common::error::NdsError::UnsupportedBootMode`] since firmware
/// contents are out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootMode {
    /// Load the ARM9/ARM7 binaries directly from the cartridge header and
    /// jump to their entry points, bypassing firmware.
    Direct,
    /// Boot through firmware. Out of scope; rejected at load time.
    Firmware,
}

impl Default for BootMode {
    fn default() -> Self {
        BootMode::Direct
    }
}

/// Cache replacement policy algorithms available for CP15's instruction and
/// data caches (spec §4.5 "replacement policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementPolicy {
    /// Round-robin victim selection (hardware reset default).
    #[default]
    RoundRobin,
    /// Pseudo-random victim selection via the CP15 xor-shift generator.
    PseudoRandom,
}

/// Backup (save) chip kind, or automatic detection from the cartridge header.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    /// Detect the backup chip kind from the cartridge header / save size heuristics.
    Auto,
    /// A specific backup chip kind, by name (e.g. `"eeprom_8k"`, `"flash_512k"`, `"nand"`).
    Named(String),
}

impl Default for BackupKind {
    fn default() -> Self {
        BackupKind::Auto
    }
}

/// Root configuration structure.
///
/// Deserializable from JSON with the field layout documented in the crate's
/// top-level design notes, so a host application can hand the CLI or an
/// embedding a config document instead of flags.
///
/// # Examples
///
/// ```
/// use nds_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.general.direct_boot, true);
/// assert_eq!(config.cp15.replacement_policy, nds_core::config::ReplacementPolicy::RoundRobin);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// General boot/tracing settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Cartridge source and backup chip configuration.
    #[serde(default)]
    pub cart: CartConfig,
    /// SD card image and DLDI patch configuration.
    #[serde(default)]
    pub sd: SdConfig,
    /// CP15 cache and protection-unit configuration.
    #[serde(default)]
    pub cp15: Cp15Config,
}

/// General simulation settings: boot mode and tracing.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Direct-boot the cartridge (skip firmware). See [`BootMode`].
    #[serde(default = "GeneralConfig::default_direct_boot")]
    pub direct_boot: bool,

    /// Enable `trace!`-level instruction tracing.
    #[serde(default)]
    pub trace: bool,

    /// Boot mode. `Firmware` is rejected at load time.
    #[serde(default)]
    pub boot_mode: BootMode,
}

impl GeneralConfig {
    /// Default to direct boot so headless runs work without a firmware image.
    fn default_direct_boot() -> bool {
        true
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            direct_boot: true,
            trace: false,
            boot_mode: BootMode::default(),
        }
    }
}

/// Cartridge source and backup chip configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CartConfig {
    /// Path to the `.nds` ROM image.
    #[serde(default)]
    pub rom_path: Option<String>,

    /// Backup (save) chip kind, or `Auto` to detect from the header.
    #[serde(default)]
    pub backup_kind: BackupKind,

    /// Path to an existing save file; created fresh if absent.
    #[serde(default)]
    pub save_path: Option<String>,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            rom_path: None,
            backup_kind: BackupKind::default(),
            save_path: None,
        }
    }
}

/// SD card image and DLDI patch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SdConfig {
    /// Path to a FAT-on-host-directory root, or a raw SD image file.
    #[serde(default)]
    pub image_path: Option<String>,

    /// Mount the SD card read-only.
    #[serde(default = "SdConfig::default_read_only")]
    pub read_only: bool,

    /// Patch the ROM's DLDI driver slot to target this emulator's SD interface.
    #[serde(default = "SdConfig::default_dldi_patch")]
    pub dldi_patch: bool,
}

impl SdConfig {
    fn default_read_only() -> bool {
        true
    }

    fn default_dldi_patch() -> bool {
        true
    }
}

impl Default for SdConfig {
    fn default() -> Self {
        Self {
            image_path: None,
            read_only: true,
            dldi_patch: true,
        }
    }
}

/// CP15 cache and protection-unit configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Cp15Config {
    /// Instruction/data cache replacement policy.
    #[serde(default)]
    pub replacement_policy: ReplacementPolicy,

    /// ITCM size in bytes at reset, before any CP15 register write.
    #[serde(default = "Cp15Config::default_itcm_size")]
    pub itcm_size: u32,

    /// DTCM size in bytes at reset, before any CP15 register write.
    #[serde(default = "Cp15Config::default_dtcm_size")]
    pub dtcm_size: u32,
}

impl Cp15Config {
    fn default_itcm_size() -> u32 {
        defaults::ITCM_SIZE
    }

    fn default_dtcm_size() -> u32 {
        defaults::DTCM_SIZE
    }
}

impl Default for Cp15Config {
    fn default() -> Self {
        Self {
            replacement_policy: ReplacementPolicy::default(),
            itcm_size: defaults::ITCM_SIZE,
            dtcm_size: defaults::DTCM_SIZE,
        }
    }
}
