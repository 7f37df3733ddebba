//! Host-side errors and synchronous CPU exceptions.
//!
//! Spec §7 draws a hard line between two error taxonomies:
//! 1. **`CpuException`** — synchronous, architectural control transfers
//!    (data abort, prefetch abort, undefined instruction, SWI) handled
//!    entirely inside the interpreter dispatch loop by vectoring to an
//!    exception handler. These never unwind as Rust errors.
//! 2. **`NdsError`** — host-side failures (missing ROM, corrupt SD image,
//!    unreadable save file) that are logged and either substituted with a
//!    benign default or surfaced to the embedding application as a load
//!    failure; they never manifest as emulated exceptions.

use thiserror::Error;

/// Synchronous ARM exceptions raised while executing a single instruction.
///
/// Handled by [`crate::core::cpu::trap`]: the faulting instruction's
/// destination register is not written, any micro-operations already queued
/// in the memory pipeline are flushed, and control transfers to the
/// corresponding exception vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuException {
    /// Data access to a protected or unmapped region (spec §7).
    DataAbort {
        /// Faulting address.
        addr: u32,
    },
    /// Code fetch to a non-executable region; raised one instruction later,
    /// when the aborted instruction would have executed (spec §7).
    PrefetchAbort {
        /// Faulting fetch address.
        addr: u32,
    },
    /// Unknown opcode, or a coprocessor access rejected from user mode.
    Undefined,
    /// Software interrupt (`SWI` on ARM or THUMB); normal vectored control
    /// flow, not a fault. The comment field is the immediate operand.
    Swi {
        /// SWI comment field (low 24 bits on ARM, low 8 bits on THUMB).
        comment: u32,
    },
}

/// Host-side errors: file I/O, missing SD image, corrupt save data.
///
/// These are logged through the platform trace surface and either
/// substituted with a benign default (empty SD card, all-`0xFF` save) or
/// surfaced as a load failure, per spec §7. They are ordinary
/// `std::error::Error` values and may be propagated with `?`.
#[derive(Debug, Error)]
pub enum NdsError {
    /// The cartridge ROM image is smaller than the 0x200-byte header it must contain.
    #[error("ROM image is too small to contain a valid NDS header ({0} bytes)")]
    RomTooSmall(usize),

    /// A DLDI patch was requested but no driver signature was found in the ROM.
    #[error("no DLDI driver signature found in ROM image")]
    MissingDldiSignature,

    /// The SD card image or FAT index could not be parsed.
    #[error("SD image is corrupt or unreadable: {0}")]
    SdImageCorrupt(String),

    /// A save (backup) file's length does not match the detected backup chip capacity.
    #[error("save file size mismatch: expected {expected} bytes, found {actual}")]
    SaveFileSizeMismatch {
        /// Expected backup capacity in bytes.
        expected: usize,
        /// Actual file size in bytes.
        actual: usize,
    },

    /// Firmware/BIOS boot was requested, but firmware contents are out of scope.
    #[error("firmware boot mode is not supported; use direct boot")]
    UnsupportedBootMode,

    /// An unrecognized backup chip kind string was supplied in configuration.
    #[error("unknown backup chip kind: {0}")]
    BackupKindUnknown(String),

    /// A line in a `.idx` FAT-on-directory index file could not be parsed.
    #[error("malformed FAT index entry at line {line}: {reason}")]
    FatIndexParse {
        /// 1-based line number within the index file.
        line: usize,
        /// Human-readable description of the parse failure.
        reason: String,
    },

    /// Wraps an underlying host I/O failure (file not found, permission denied, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
