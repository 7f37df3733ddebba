//! Cartridge header parsing and the direct-boot sequence (spec §4.9/§6).
//!
//! Real hardware boots through firmware, which reads the header, decrypts
//! the secure area, copies both binaries into RAM, and only then releases
//! the ARM9/ARM7 reset vectors. Direct boot (this module's only supported
//! path — see [`boot`]) short-circuits all of that: it reads the header
//! straight out of the ROM image, copies the two binaries to the RAM
//! addresses the header names, and seeds each core's stack pointers and
//! entry point itself.

use tracing::{debug, warn};

use crate::common::error::NdsError;
use crate::config::{BootMode, Config};
use crate::core::arch::gpr::SP;
use crate::core::arch::mode::Mode;
use crate::core::cpu::Cpu;
use crate::soc::bus::Bus;
use crate::soc::Soc;

const GAME_TITLE_OFFSET: usize = 0x000;
const GAME_TITLE_LEN: usize = 12;
const GAME_CODE_OFFSET: usize = 0x00C;
const GAME_CODE_LEN: usize = 4;
const UNIT_CODE_OFFSET: usize = 0x012;
const ARM9_SEGMENT_OFFSET: usize = 0x020;
const ARM7_SEGMENT_OFFSET: usize = 0x030;
const BANNER_OFFSET_OFFSET: usize = 0x068;

/// Main-RAM mirror address firmware normally copies the user-settings block
/// to before release, and where direct boot's hardcoded shim lands instead
/// (spec §4.9 "firmware-settings shim" decision — full firmware contents are
/// out of scope, but enough of this block is seeded that homebrew reading it
/// for language/touch-calibration defaults doesn't see uninitialized RAM).
const USER_SETTINGS_MIRROR_ADDR: u32 = 0x027F_FC80;
const USER_SETTINGS_SIZE: usize = 0x70;
const USER_SETTINGS_LANGUAGE_OFFSET: usize = 0x6D;
const USER_SETTINGS_LANGUAGE_ENGLISH: u8 = 1;
/// ADC_X1, ADC_Y1, SCR_X1, SCR_Y1, ADC_X2, ADC_Y2, SCR_X2, SCR_Y2 at `0x58`:
/// an identity calibration from ADC corners (0,0)/(4095,4095) to screen
/// corners (0,0)/(255,191).
const USER_SETTINGS_TOUCH_CAL_OFFSET: usize = 0x58;
const USER_SETTINGS_TOUCH_CAL: [u8; 12] = [0, 0, 0, 0, 0, 0, 0xFF, 0x0F, 0xFF, 0x0F, 255, 191];

/// Stack pointers the direct-boot stub seeds before entering each core's
/// code, matching the values every direct-boot-capable loader (melonDS,
/// desmume, no$gba) programs because the cartridge header does not carry
/// them.
mod boot_stacks {
    pub const ARM9_SVC: u32 = 0x0300_7FE0;
    pub const ARM9_IRQ: u32 = 0x0300_7FA0;
    pub const ARM9_SYS: u32 = 0x0300_7F00;
    pub const ARM7_SVC: u32 = 0x0380_FFDC;
    pub const ARM7_IRQ: u32 = 0x0380_FFB0;
    pub const ARM7_SYS: u32 = 0x0380_FF00;
}

/// One core's boot segment descriptor, as laid out at 0x020 (ARM9) and
/// 0x030 (ARM7) of the cartridge header.
#[derive(Clone, Copy, Debug)]
struct Segment {
    rom_offset: u32,
    entry: u32,
    ram_addr: u32,
    size: u32,
}

fn read_u32(header: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(header[offset..offset + 4].try_into().unwrap_or([0; 4]))
}

fn read_segment(header: &[u8], offset: usize) -> Segment {
    Segment {
        rom_offset: read_u32(header, offset),
        entry: read_u32(header, offset + 4),
        ram_addr: read_u32(header, offset + 8),
        size: read_u32(header, offset + 12),
    }
}

/// Fields of the 0x200-byte cartridge header consumed by the boot sequence
/// (spec §6). Everything else in the header (region lock, header checksum,
/// the DSi-extended block) is out of scope.
#[derive(Clone, Debug)]
pub struct CartHeader {
    /// 12-byte, NUL/space-padded game title.
    pub game_title: [u8; GAME_TITLE_LEN],
    /// 4-character game code.
    pub game_code: [u8; GAME_CODE_LEN],
    /// Unit code byte: `0x00` NDS-only, `0x02`/`0x03` carries a DSi-extended header.
    pub unit_code: u8,
    /// Icon/title banner offset into the ROM; banner contents are out of scope.
    pub banner_offset: u32,
    arm9: Segment,
    arm7: Segment,
}

impl CartHeader {
    /// Parses the fields the boot sequence needs out of a raw 0x200-byte header.
    fn parse(raw: &[u8]) -> Self {
        let mut game_title = [0u8; GAME_TITLE_LEN];
        game_title.copy_from_slice(&raw[GAME_TITLE_OFFSET..GAME_TITLE_OFFSET + GAME_TITLE_LEN]);
        let mut game_code = [0u8; GAME_CODE_LEN];
        game_code.copy_from_slice(&raw[GAME_CODE_OFFSET..GAME_CODE_OFFSET + GAME_CODE_LEN]);
        Self {
            game_title,
            game_code,
            unit_code: raw[UNIT_CODE_OFFSET],
            banner_offset: read_u32(raw, BANNER_OFFSET_OFFSET),
            arm9: read_segment(raw, ARM9_SEGMENT_OFFSET),
            arm7: read_segment(raw, ARM7_SEGMENT_OFFSET),
        }
    }

    /// True when the unit code marks this title as carrying a DSi-extended
    /// header. The extended header's contents are out of scope; this flag
    /// only documents that the contract is recognized.
    pub fn has_dsi_extension(&self) -> bool {
        self.unit_code != 0x00
    }
}

fn seed_stacks(cpu: &mut Cpu, svc: u32, irq: u32, sys: u32) {
    cpu.switch_mode(Mode::Svc);
    cpu.regs.write(SP, svc);
    cpu.switch_mode(Mode::Irq);
    cpu.regs.write(SP, irq);
    cpu.switch_mode(Mode::Sys);
    cpu.regs.write(SP, sys);
}

/// Seeds the firmware user-settings mirror with the hardcoded shim (spec
/// §4.9): an English-language byte and an identity touchscreen calibration,
/// so homebrew code that reads this block at boot doesn't see zeroed or
/// uninitialized RAM.
fn write_firmware_settings_shim(soc: &mut Soc) {
    let mut shim = [0u8; USER_SETTINGS_SIZE];
    shim[USER_SETTINGS_LANGUAGE_OFFSET] = USER_SETTINGS_LANGUAGE_ENGLISH;
    shim[USER_SETTINGS_TOUCH_CAL_OFFSET..USER_SETTINGS_TOUCH_CAL_OFFSET + USER_SETTINGS_TOUCH_CAL.len()]
        .copy_from_slice(&USER_SETTINGS_TOUCH_CAL);
    // `0x027FFC80` is itself a mirror of the 4 MiB main-RAM window, same as
    // every other main-RAM address (spec §4): fold it down before indexing
    // the backing block directly, since `RamBlock::load` (unlike its
    // `read`/`write` accessors) takes a raw, unmirrored offset.
    let offset = (USER_SETTINGS_MIRROR_ADDR.wrapping_sub(Bus::MAIN_RAM_BASE) % Bus::MAIN_RAM_SIZE) as usize;
    soc.bus.main_ram.load(offset, &shim);
}

/// Copies `segment`'s bytes from the cartridge into main RAM and returns its
/// entry point, logging the placement at `debug` level.
fn place_segment(soc: &mut Soc, segment: Segment, who: &str) -> u32 {
    let bytes = soc.cart.read_block(segment.rom_offset, segment.size as usize);
    let offset = segment.ram_addr.wrapping_sub(Bus::MAIN_RAM_BASE) as usize;
    soc.bus.main_ram.load(offset, &bytes);
    debug!(who, ram_addr = segment.ram_addr, size = segment.size, entry = segment.entry, "placed boot segment");
    segment.entry
}

/// Performs the direct-boot sequence: parses the header, copies both
/// binaries into main RAM, seeds each core's stack pointers, and queues a
/// pipeline flush to each core's entry point (spec §4.9 "Direct boot").
///
/// Returns the parsed header (callers may want the game title/code for
/// display) or [`NdsError::UnsupportedBootMode`] if `config` requests
/// firmware boot.
pub fn boot(cpu9: &mut Cpu, cpu7: &mut Cpu, soc: &mut Soc, config: &Config) -> Result<CartHeader, NdsError> {
    if config.general.boot_mode == BootMode::Firmware {
        warn!("firmware boot requested but is out of scope for this core");
        return Err(NdsError::UnsupportedBootMode);
    }

    let header = CartHeader::parse(&soc.cart.header());

    let arm9_entry = place_segment(soc, header.arm9, "arm9");
    let arm7_entry = place_segment(soc, header.arm7, "arm7");
    write_firmware_settings_shim(soc);

    seed_stacks(cpu9, boot_stacks::ARM9_SVC, boot_stacks::ARM9_IRQ, boot_stacks::ARM9_SYS);
    seed_stacks(cpu7, boot_stacks::ARM7_SVC, boot_stacks::ARM7_IRQ, boot_stacks::ARM7_SYS);

    cpu9.request_flush(arm9_entry);
    cpu7.request_flush(arm7_entry);

    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cpu::CoreKind;

    fn rom_with_segments() -> Vec<u8> {
        let mut rom = vec![0u8; 0x2000];
        rom[GAME_TITLE_OFFSET..GAME_TITLE_OFFSET + 4].copy_from_slice(b"TEST");
        rom[GAME_CODE_OFFSET..GAME_CODE_OFFSET + 4].copy_from_slice(b"ABCD");

        let arm9_code = vec![0xAAu8; 0x100];
        let arm9_rom_offset = 0x1000u32;
        rom[arm9_rom_offset as usize..arm9_rom_offset as usize + arm9_code.len()].copy_from_slice(&arm9_code);
        rom[ARM9_SEGMENT_OFFSET..ARM9_SEGMENT_OFFSET + 4].copy_from_slice(&arm9_rom_offset.to_le_bytes());
        rom[ARM9_SEGMENT_OFFSET + 4..ARM9_SEGMENT_OFFSET + 8].copy_from_slice(&0x0200_0000u32.to_le_bytes());
        rom[ARM9_SEGMENT_OFFSET + 8..ARM9_SEGMENT_OFFSET + 12].copy_from_slice(&0x0200_0000u32.to_le_bytes());
        rom[ARM9_SEGMENT_OFFSET + 12..ARM9_SEGMENT_OFFSET + 16].copy_from_slice(&(arm9_code.len() as u32).to_le_bytes());

        let arm7_code = vec![0xBBu8; 0x80];
        let arm7_rom_offset = 0x1800u32;
        rom[arm7_rom_offset as usize..arm7_rom_offset as usize + arm7_code.len()].copy_from_slice(&arm7_code);
        rom[ARM7_SEGMENT_OFFSET..ARM7_SEGMENT_OFFSET + 4].copy_from_slice(&arm7_rom_offset.to_le_bytes());
        rom[ARM7_SEGMENT_OFFSET + 4..ARM7_SEGMENT_OFFSET + 8].copy_from_slice(&0x0200_1000u32.to_le_bytes());
        rom[ARM7_SEGMENT_OFFSET + 8..ARM7_SEGMENT_OFFSET + 12].copy_from_slice(&0x0200_1000u32.to_le_bytes());
        rom[ARM7_SEGMENT_OFFSET + 12..ARM7_SEGMENT_OFFSET + 16].copy_from_slice(&(arm7_code.len() as u32).to_le_bytes());

        rom
    }

    #[test]
    fn direct_boot_copies_both_binaries_and_queues_entry_flushes() {
        let config = Config::default();
        let mut soc = Soc::new(rom_with_segments(), &config).unwrap();
        let mut cpu9 = Cpu::new(CoreKind::Arm9);
        let mut cpu7 = Cpu::new(CoreKind::Arm7);

        let header = boot(&mut cpu9, &mut cpu7, &mut soc, &config).unwrap();
        assert_eq!(&header.game_code, b"ABCD");

        assert_eq!(soc.bus.main_ram.read_u8(0), 0xAA);
        assert_eq!(soc.bus.main_ram.read_u8(0x1000), 0xBB);

        cpu9.switch_mode(Mode::Svc);
        assert_eq!(cpu9.regs.read(SP), boot_stacks::ARM9_SVC);
        cpu7.switch_mode(Mode::Svc);
        assert_eq!(cpu7.regs.read(SP), boot_stacks::ARM7_SVC);
    }

    #[test]
    fn direct_boot_seeds_the_firmware_settings_shim() {
        let config = Config::default();
        let mut soc = Soc::new(rom_with_segments(), &config).unwrap();
        let mut cpu9 = Cpu::new(CoreKind::Arm9);
        let mut cpu7 = Cpu::new(CoreKind::Arm7);

        boot(&mut cpu9, &mut cpu7, &mut soc, &config).unwrap();

        let offset = (USER_SETTINGS_MIRROR_ADDR - Bus::MAIN_RAM_BASE) % Bus::MAIN_RAM_SIZE;
        assert_eq!(soc.bus.main_ram.read_u8(offset + USER_SETTINGS_LANGUAGE_OFFSET as u32), USER_SETTINGS_LANGUAGE_ENGLISH);
    }

    #[test]
    fn firmware_boot_mode_is_rejected() {
        let mut config = Config::default();
        config.general.boot_mode = BootMode::Firmware;
        let mut soc = Soc::new(rom_with_segments(), &config).unwrap();
        let mut cpu9 = Cpu::new(CoreKind::Arm9);
        let mut cpu7 = Cpu::new(CoreKind::Arm7);

        let result = boot(&mut cpu9, &mut cpu7, &mut soc, &config);
        assert!(matches!(result, Err(NdsError::UnsupportedBootMode)));
    }
}
