//! The NDS physical address space (spec §4 "Memory map") and the raw
//! backing storage each region is built from.
//!
//! Only the regions the CPU execution core actually needs to resolve are
//! modeled here: main RAM (contended, arbitrated), shared WRAM (bank-switched
//! between the two cores), the ARM7-private WRAM, and each core's BIOS ROM.
//! Everything else addressable from the ARM side (VRAM, I/O registers, the
//! GPU/sound/DMA/interrupt-controller register files) is out of scope per
//! spec §1 and is modeled only as an open region that reads as zero and
//! discards writes, so a core stepping through unmapped territory does not
//! panic.

use crate::common::Addr;

/// Plain byte-addressable RAM backing, replacing the teacher's mmap-backed
/// buffer: NDS memory regions top out at 4 MiB, far below the point where
/// lazy `mmap` allocation earns its keep, so a `Vec<u8>` is simpler and
/// needs no `unsafe`.
#[derive(Clone, Debug)]
pub struct RamBlock {
    bytes: Vec<u8>,
}

impl RamBlock {
    /// Creates a zero-filled block of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self { bytes: vec![0; size] }
    }

    /// Block size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the block has zero size.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn mask(&self, offset: u32) -> usize {
        (offset as usize) % self.bytes.len().max(1)
    }

    /// Reads a byte at `offset`, wrapping (mirroring) within the block.
    pub fn read_u8(&self, offset: u32) -> u8 {
        self.bytes[self.mask(offset)]
    }

    /// Writes a byte at `offset`, wrapping within the block.
    pub fn write_u8(&mut self, offset: u32, value: u8) {
        let idx = self.mask(offset);
        self.bytes[idx] = value;
    }

    /// Reads a little-endian 16-bit halfword at `offset & !1`.
    pub fn read_u16(&self, offset: u32) -> u16 {
        let o = offset & !1;
        u16::from(self.read_u8(o)) | (u16::from(self.read_u8(o.wrapping_add(1))) << 8)
    }

    /// Writes a little-endian 16-bit halfword at `offset & !1`.
    pub fn write_u16(&mut self, offset: u32, value: u16) {
        let o = offset & !1;
        self.write_u8(o, value as u8);
        self.write_u8(o.wrapping_add(1), (value >> 8) as u8);
    }

    /// Reads a little-endian 32-bit word at `offset & !3`.
    pub fn read_u32(&self, offset: u32) -> u32 {
        let o = offset & !3;
        u32::from(self.read_u16(o)) | (u32::from(self.read_u16(o.wrapping_add(2))) << 16)
    }

    /// Writes a little-endian 32-bit word at `offset & !3`.
    pub fn write_u32(&mut self, offset: u32, value: u32) {
        let o = offset & !3;
        self.write_u16(o, value as u16);
        self.write_u16(o.wrapping_add(2), (value >> 16) as u16);
    }

    /// Copies `data` into the block starting at byte `offset` (for ROM/binary
    /// loading). Out-of-range bytes are silently dropped, matching a loader
    /// that truncates an oversized image rather than panicking.
    pub fn load(&mut self, offset: usize, data: &[u8]) {
        let end = (offset + data.len()).min(self.bytes.len());
        if offset < end {
            self.bytes[offset..end].copy_from_slice(&data[..end - offset]);
        }
    }

    /// Raw slice access, for DMA-style bulk copy between regions.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

/// Which physical region an address resolves into (spec §4 memory map).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    /// `0x0200_0000..0x0300_0000`, 4 MiB, mirrored: the one contended region.
    MainRam,
    /// `0x0300_0000..0x0400_0000`, 32 KiB, bank-switched between the cores.
    SharedWram,
    /// ARM7-private WRAM, 64 KiB, only reachable from the ARM7 core.
    Arm7Wram,
    /// ARM9 BIOS ROM, 4 KiB, read-only.
    Bios9,
    /// ARM7 BIOS ROM, 16 KiB, read-only.
    Bios7,
    /// Anything else: open bus (spec §1 Non-goals; reads as zero).
    Open,
}

/// How shared WRAM is currently split between the cores (`WRAMCNT`, spec §4
/// "bank-switched"). Only the allocation the ARM9 side sees is modeled;
/// requests from the ARM7 side that fall in a bank owned by the ARM9 side
/// land on `Region::Open` and vice versa.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WramLayout {
    /// All 32 KiB visible to the ARM9 side; ARM7 sees none of it.
    Arm9Full,
    /// All 32 KiB visible to the ARM7 side; ARM9 sees none of it.
    Arm7Full,
    /// Split evenly, first half to ARM9, second half to ARM7.
    Split,
}

/// The address-decoded system bus: routes an address to a region and offset,
/// and owns the raw backing storage for RAM-like regions.
pub struct Bus {
    /// 4 MiB main RAM.
    pub main_ram: RamBlock,
    /// 32 KiB shared WRAM.
    pub shared_wram: RamBlock,
    /// 64 KiB ARM7-private WRAM.
    pub arm7_wram: RamBlock,
    /// ARM9 BIOS (read-only in practice; not enforced here since boot-mode
    /// details beyond direct-boot are out of scope, spec §4.9).
    pub bios9: RamBlock,
    /// ARM7 BIOS.
    pub bios7: RamBlock,
    /// Current shared-WRAM bank-switch configuration.
    pub wram_layout: WramLayout,
}

impl Bus {
    /// Base address of main RAM.
    pub const MAIN_RAM_BASE: u32 = 0x0200_0000;
    /// Main RAM size (4 MiB).
    pub const MAIN_RAM_SIZE: u32 = 0x0040_0000;
    /// Base address of shared WRAM.
    pub const SHARED_WRAM_BASE: u32 = 0x0300_0000;
    /// Shared WRAM size (32 KiB).
    pub const SHARED_WRAM_SIZE: u32 = 0x0000_8000;
    /// Base address of the ARM7-private WRAM window.
    pub const ARM7_WRAM_BASE: u32 = 0x0380_0000;
    /// ARM7-private WRAM size (64 KiB).
    pub const ARM7_WRAM_SIZE: u32 = 0x0001_0000;
    /// ARM9 BIOS base.
    pub const BIOS9_BASE: u32 = 0xFFFF_0000;
    /// ARM9 BIOS size (4 KiB).
    pub const BIOS9_SIZE: u32 = 0x0000_1000;
    /// ARM7 BIOS base.
    pub const BIOS7_BASE: u32 = 0x0000_0000;
    /// ARM7 BIOS size (16 KiB).
    pub const BIOS7_SIZE: u32 = 0x0000_4000;

    /// Builds an empty bus with zero-filled RAM and BIOS images.
    pub fn new() -> Self {
        Self {
            main_ram: RamBlock::new(Self::MAIN_RAM_SIZE as usize),
            shared_wram: RamBlock::new(Self::SHARED_WRAM_SIZE as usize),
            arm7_wram: RamBlock::new(Self::ARM7_WRAM_SIZE as usize),
            bios9: RamBlock::new(Self::BIOS9_SIZE as usize),
            bios7: RamBlock::new(Self::BIOS7_SIZE as usize),
            wram_layout: WramLayout::Arm9Full,
        }
    }

    /// Decodes `addr` as seen by `is_arm9` into a region and region-relative
    /// offset.
    pub fn decode(&self, addr: Addr, is_arm9: bool) -> (Region, u32) {
        let a = addr.0;
        if (Self::MAIN_RAM_BASE..Self::MAIN_RAM_BASE + 0x0100_0000).contains(&a) {
            return (Region::MainRam, a - Self::MAIN_RAM_BASE);
        }
        if (Self::SHARED_WRAM_BASE..Self::SHARED_WRAM_BASE + 0x0080_0000).contains(&a) {
            let owned = match self.wram_layout {
                WramLayout::Arm9Full => is_arm9,
                WramLayout::Arm7Full => !is_arm9,
                WramLayout::Split => true,
            };
            return if owned {
                (Region::SharedWram, (a - Self::SHARED_WRAM_BASE) % Self::SHARED_WRAM_SIZE)
            } else {
                (Region::Open, 0)
            };
        }
        if !is_arm9 && (Self::ARM7_WRAM_BASE..Self::ARM7_WRAM_BASE + 0x0080_0000).contains(&a) {
            return (Region::Arm7Wram, (a - Self::ARM7_WRAM_BASE) % Self::ARM7_WRAM_SIZE);
        }
        if is_arm9 && (Self::BIOS9_BASE..Self::BIOS9_BASE + Self::BIOS9_SIZE).contains(&a) {
            return (Region::Bios9, a - Self::BIOS9_BASE);
        }
        if !is_arm9 && (Self::BIOS7_BASE..Self::BIOS7_BASE + Self::BIOS7_SIZE).contains(&a) {
            return (Region::Bios7, a - Self::BIOS7_BASE);
        }
        (Region::Open, 0)
    }

    /// Reads a 32-bit word through the decoded region (misaligned `addr` is
    /// the caller's responsibility to have already word-aligned).
    pub fn read_u32(&self, addr: Addr, is_arm9: bool) -> u32 {
        match self.decode(addr, is_arm9) {
            (Region::MainRam, off) => self.main_ram.read_u32(off),
            (Region::SharedWram, off) => self.shared_wram.read_u32(off),
            (Region::Arm7Wram, off) => self.arm7_wram.read_u32(off),
            (Region::Bios9, off) => self.bios9.read_u32(off),
            (Region::Bios7, off) => self.bios7.read_u32(off),
            (Region::Open, _) => 0,
        }
    }

    /// Reads a 16-bit halfword through the decoded region.
    pub fn read_u16(&self, addr: Addr, is_arm9: bool) -> u16 {
        match self.decode(addr, is_arm9) {
            (Region::MainRam, off) => self.main_ram.read_u16(off),
            (Region::SharedWram, off) => self.shared_wram.read_u16(off),
            (Region::Arm7Wram, off) => self.arm7_wram.read_u16(off),
            (Region::Bios9, off) => self.bios9.read_u16(off),
            (Region::Bios7, off) => self.bios7.read_u16(off),
            (Region::Open, _) => 0,
        }
    }

    /// Reads a single byte through the decoded region.
    pub fn read_u8(&self, addr: Addr, is_arm9: bool) -> u8 {
        match self.decode(addr, is_arm9) {
            (Region::MainRam, off) => self.main_ram.read_u8(off),
            (Region::SharedWram, off) => self.shared_wram.read_u8(off),
            (Region::Arm7Wram, off) => self.arm7_wram.read_u8(off),
            (Region::Bios9, off) => self.bios9.read_u8(off),
            (Region::Bios7, off) => self.bios7.read_u8(off),
            (Region::Open, _) => 0,
        }
    }

    /// Writes a 32-bit word through the decoded region. A write landing on
    /// `Region::Open` or a BIOS region is simply discarded.
    pub fn write_u32(&mut self, addr: Addr, is_arm9: bool, value: u32) {
        match self.decode(addr, is_arm9) {
            (Region::MainRam, off) => self.main_ram.write_u32(off, value),
            (Region::SharedWram, off) => self.shared_wram.write_u32(off, value),
            (Region::Arm7Wram, off) => self.arm7_wram.write_u32(off, value),
            _ => {}
        }
    }

    /// Writes a 16-bit halfword through the decoded region.
    pub fn write_u16(&mut self, addr: Addr, is_arm9: bool, value: u16) {
        match self.decode(addr, is_arm9) {
            (Region::MainRam, off) => self.main_ram.write_u16(off, value),
            (Region::SharedWram, off) => self.shared_wram.write_u16(off, value),
            (Region::Arm7Wram, off) => self.arm7_wram.write_u16(off, value),
            _ => {}
        }
    }

    /// Writes a single byte through the decoded region.
    pub fn write_u8(&mut self, addr: Addr, is_arm9: bool, value: u8) {
        match self.decode(addr, is_arm9) {
            (Region::MainRam, off) => self.main_ram.write_u8(off, value),
            (Region::SharedWram, off) => self.shared_wram.write_u8(off, value),
            (Region::Arm7Wram, off) => self.arm7_wram.write_u8(off, value),
            _ => {}
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}
