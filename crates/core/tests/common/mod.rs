//! Shared fixtures for the integration test suite.

use nds_core::config::Config;
use nds_core::Nds;

const ARM9_SEGMENT: usize = 0x020;
const ARM7_SEGMENT: usize = 0x030;

/// Builds a minimal `.nds` ROM image with real ARM9/ARM7 segment descriptors
/// (rom_offset/entry/ram_addr/size) so [`Nds::new`] can direct-boot it.
/// `arm9_code`/`arm7_code` are copied verbatim as each core's boot payload.
pub fn rom_with_payloads(arm9_code: &[u8], arm7_code: &[u8]) -> Vec<u8> {
    let arm9_rom_offset = 0x1000usize;
    let arm7_rom_offset = arm9_rom_offset + arm9_code.len().next_multiple_of(4) + 0x100;
    let rom_len = (arm7_rom_offset + arm7_code.len() + 0x100).next_multiple_of(4);

    let mut rom = vec![0u8; rom_len];
    rom[0..4].copy_from_slice(b"TEST");
    rom[0x00C..0x010].copy_from_slice(b"ABCD");

    write_segment(&mut rom, ARM9_SEGMENT, arm9_rom_offset as u32, 0x0200_0000, 0x0200_0000, arm9_code.len() as u32);
    rom[arm9_rom_offset..arm9_rom_offset + arm9_code.len()].copy_from_slice(arm9_code);

    write_segment(&mut rom, ARM7_SEGMENT, arm7_rom_offset as u32, 0x0200_1000, 0x0200_1000, arm7_code.len() as u32);
    rom[arm7_rom_offset..arm7_rom_offset + arm7_code.len()].copy_from_slice(arm7_code);

    rom
}

fn write_segment(rom: &mut [u8], offset: usize, rom_offset: u32, entry: u32, ram_addr: u32, size: u32) {
    rom[offset..offset + 4].copy_from_slice(&rom_offset.to_le_bytes());
    rom[offset + 4..offset + 8].copy_from_slice(&entry.to_le_bytes());
    rom[offset + 8..offset + 12].copy_from_slice(&ram_addr.to_le_bytes());
    rom[offset + 12..offset + 16].copy_from_slice(&size.to_le_bytes());
}

/// Boots a fresh `Nds` from 64 bytes of zeroed (all-`AND`-as-NOP-ish, really
/// just deterministic) ARM9/ARM7 payload, using default configuration.
pub fn fresh_nds() -> Nds {
    let rom = rom_with_payloads(&[0u8; 0x40], &[0u8; 0x40]);
    Nds::new(rom, &Config::default()).expect("boots from a well-formed header")
}
