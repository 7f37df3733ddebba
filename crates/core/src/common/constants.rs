//! Hardware-fixed constants for the ARM9/ARM7 memory system.
//!
//! Values here are fixed by the ARM946E-S (ARM9) and ARM7TDMI (ARM7) hardware
//! and by the NDS memory map; they are not user-configurable the way cache
//! replacement policy or boot mode are (see [`crate::config`]).

/// Number of CP15 protection regions (spec §3 "Protection regions").
pub const NUM_PROTECTION_REGIONS: usize = 8;

/// Number of entries in the flat permission map, one per 4 KiB page,
/// keyed by the high 20 bits of a virtual address.
pub const PERMISSION_MAP_ENTRIES: usize = 1 << 20;

/// Instruction cache size in bytes (8 KiB).
pub const ICACHE_SIZE: usize = 8 * 1024;
/// Instruction cache set count (4 sets).
pub const ICACHE_SETS: usize = 4;
/// Instruction cache ways (4-way set-associative).
pub const ICACHE_WAYS: usize = 4;

/// Data cache size in bytes (4 KiB).
pub const DCACHE_SIZE: usize = 4 * 1024;
/// Data cache set count (4 sets).
pub const DCACHE_SETS: usize = 4;
/// Data cache ways (4-way set-associative).
pub const DCACHE_WAYS: usize = 4;

/// Cache line size in bytes, shared by I-cache and D-cache.
pub const CACHE_LINE_BYTES: usize = 32;
/// Number of 32-bit words streamed per line fill.
pub const CACHE_LINE_WORDS: usize = CACHE_LINE_BYTES / 4;

/// ITCM physical size in bytes (32 KiB).
pub const ITCM_PHYS_SIZE: u32 = 32 * 1024;
/// DTCM physical size in bytes (16 KiB).
pub const DTCM_PHYS_SIZE: u32 = 16 * 1024;

/// Write buffer depth (sixteen entries, spec §3/§4.6).
pub const WRITE_BUFFER_DEPTH: usize = 16;

/// Length of a cache line-fill burst in sequential bus words (spec §4.4 step 4).
pub const LINE_FILL_BURST_WORDS: u32 = 8;

/// Stream-buffer depth for a streaming cache-hit burst (spec §4.4 step 4:
/// "until the seven-word stream buffer is exhausted").
pub const STREAM_BUFFER_WORDS: u32 = 7;

/// Size, in bytes, of a block-transfer burst page boundary; a burst that
/// crosses this boundary is split into two bus transactions (spec §4.4).
pub const BURST_PAGE_BYTES: u32 = 1024;

/// Low exception vector base (CP15 control bit clear).
pub const VECTOR_BASE_LOW: u32 = 0x0000_0000;
/// High exception vector base (CP15 control "high vectors" bit set).
pub const VECTOR_BASE_HIGH: u32 = 0xFFFF_0000;

/// Reset vector offset.
pub const VECTOR_RESET: u32 = 0x00;
/// Undefined-instruction vector offset.
pub const VECTOR_UNDEFINED: u32 = 0x04;
/// Software-interrupt vector offset.
pub const VECTOR_SWI: u32 = 0x08;
/// Prefetch-abort vector offset.
pub const VECTOR_PREFETCH_ABORT: u32 = 0x0C;
/// Data-abort vector offset.
pub const VECTOR_DATA_ABORT: u32 = 0x10;
/// IRQ vector offset.
pub const VECTOR_IRQ: u32 = 0x18;
/// FIQ vector offset.
pub const VECTOR_FIQ: u32 = 0x1C;

/// NDS cartridge header size in bytes (spec §6).
pub const CART_HEADER_SIZE: usize = 0x200;

/// DLDI driver signature magic token (spec §4.8/§6).
pub const DLDI_MAGIC_TOKEN: u32 = 0xBF8D_A5ED;
/// First half of the DLDI friendly-name signature.
pub const DLDI_SIG_CHI: &[u8; 3] = b"Chi";
/// Second half of the DLDI friendly-name signature.
pub const DLDI_SIG_SHM: &[u8; 3] = b"shm";

/// SD/MMC sector size in bytes.
pub const SD_SECTOR_SIZE: usize = 512;
