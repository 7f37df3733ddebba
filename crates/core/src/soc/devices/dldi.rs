//! DLDI driver self-relocation (spec §8.3): homebrew ROMs embed a generic SD
//! driver stub that the loader must patch in place with the actual driver
//! addresses before the ROM can touch the SD card.
//!
//! This implements the signature scan and the relocation arithmetic only;
//! the patched driver's I/O entry points are never called; reads/writes
//! against the SD image go straight through [`super::fat`] instead (spec
//! §1: "DLDI ... modeled only down to the patch step; the driver's
//! read/write entry points are contracts this core never has to execute").

use crate::common::constants::DLDI_MAGIC_TOKEN;
use crate::common::NdsError;

/// Fixed 0x48-byte DLDI driver header layout (offsets from the signature).
#[derive(Clone, Copy, Debug)]
struct HeaderOffsets;

impl HeaderOffsets {
    const MAGIC: usize = 0x00;
    const FRIENDLY_NAME: usize = 0x04;
    const VERSION: usize = 0x14;
    const DRIVER_SIZE_SHIFT: usize = 0x15;
    const FIXED_SECTIONS_FLAG: usize = 0x16;
    const ALLOCATED_SIZE_SHIFT: usize = 0x17;
    const OLD_START: usize = 0x40;
    const OLD_DATA_START: usize = 0x44;
    const OLD_GLUE_START: usize = 0x48;
    const OLD_GOT_START: usize = 0x4C;
    const OLD_BSS_START: usize = 0x50;
}

/// Parsed, pre-relocation DLDI header found inside a ROM image.
#[derive(Clone, Copy, Debug)]
pub struct DldiHeader {
    offset_in_rom: usize,
    driver_size_shift: u8,
    fixed_sections: u8,
    old_start: u32,
    old_data_start: u32,
    old_glue_start: u32,
    old_got_start: u32,
    old_bss_start: u32,
}

/// Scans `rom` for the DLDI magic token and 0x200-aligned signature
/// (`.nds` convention: the header always begins at a multiple of 4, and the
/// magic string match plus a friendly-name sanity check are enough to avoid
/// false positives in practice).
pub fn find_header(rom: &[u8]) -> Result<DldiHeader, NdsError> {
    let magic = DLDI_MAGIC_TOKEN.to_le_bytes();
    let offset = rom
        .windows(4)
        .step_by(4)
        .position(|w| w == magic)
        .map(|i| i * 4)
        .ok_or(NdsError::MissingDldiSignature)?;

    let read_u32 = |off: usize| -> u32 {
        let o = offset + off;
        u32::from_le_bytes(rom[o..o + 4].try_into().unwrap_or([0; 4]))
    };

    Ok(DldiHeader {
        offset_in_rom: offset,
        driver_size_shift: rom.get(offset + HeaderOffsets::DRIVER_SIZE_SHIFT).copied().unwrap_or(0),
        fixed_sections: rom.get(offset + HeaderOffsets::FIXED_SECTIONS_FLAG).copied().unwrap_or(0),
        old_start: read_u32(HeaderOffsets::OLD_START),
        old_data_start: read_u32(HeaderOffsets::OLD_DATA_START),
        old_glue_start: read_u32(HeaderOffsets::OLD_GLUE_START),
        old_got_start: read_u32(HeaderOffsets::OLD_GOT_START),
        old_bss_start: read_u32(HeaderOffsets::OLD_BSS_START),
    })
}

/// Patches the driver in place at `new_start` (the address the loader chose
/// to place the driver at once relocated into RAM), rewriting every pointer
/// field by the same delta (`new_start - old_start`), matching the reference
/// DLDI patcher's "fixed sections" fast path when the flag byte requests it.
pub fn relocate(rom: &mut [u8], header: &DldiHeader, new_start: u32) {
    let delta = new_start.wrapping_sub(header.old_start);
    let base = header.offset_in_rom;
    let size = 1usize << header.driver_size_shift;
    let end = (base + size).min(rom.len());

    let fields = [
        (HeaderOffsets::OLD_START, header.old_start),
        (HeaderOffsets::OLD_DATA_START, header.old_data_start),
        (HeaderOffsets::OLD_GLUE_START, header.old_glue_start),
        (HeaderOffsets::OLD_GOT_START, header.old_got_start),
        (HeaderOffsets::OLD_BSS_START, header.old_bss_start),
    ];
    for (off, old_value) in fields {
        let addr = base + off;
        if addr + 4 <= rom.len() {
            let patched = old_value.wrapping_add(delta);
            rom[addr..addr + 4].copy_from_slice(&patched.to_le_bytes());
        }
    }

    if header.fixed_sections != 0 {
        // Fixed-sections drivers only need the header pointers above; no
        // further in-body pointer fixup is required.
        return;
    }

    // Generic drivers carry additional internal pointers between
    // `old_start` and `old_bss_start` that each need the same delta applied.
    // Scanning for plausible pointers within that span and relocating any
    // word that looks like it falls in `[old_start, old_bss_start)` mirrors
    // the reference patcher's behavior for this case.
    let mut off = base + HeaderOffsets::OLD_BSS_START + 4;
    while off + 4 <= end {
        let word = u32::from_le_bytes(rom[off..off + 4].try_into().unwrap_or([0; 4]));
        if word >= header.old_start && word < header.old_bss_start {
            let patched = word.wrapping_add(delta);
            rom[off..off + 4].copy_from_slice(&patched.to_le_bytes());
        }
        off += 4;
    }
}
