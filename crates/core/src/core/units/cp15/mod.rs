//! CP15 system-control coprocessor (spec §4.5/§6): protection regions, the
//! flat permission map, TCM base/size configuration, cache-operation
//! dispatch, and lockdown/wait-for-interrupt state.
//!
//! Only the ARM9 core has a CP15; the ARM7 core never builds one (spec
//! "Two concrete cores"). CP15's register interface is a single 12-bit
//! operation ID per spec §6 ("nibbles `opcode1 | register | sub-register |
//! opcode2`"); [`Cp15::write`]/[`Cp15::read`] take that ID directly so the
//! coprocessor-instruction decoder (`MCR`/`MRC`) doesn't need its own
//! switch statement duplicating this one.

use crate::common::constants::{NUM_PROTECTION_REGIONS, PERMISSION_MAP_ENTRIES};
use crate::core::units::cache::{CacheSim, Policy};

/// Per-region access rights, rebuilt into the flat permission map on every
/// CP15 write that can change permissions (spec §4.5 "rebuild the
/// permission map in ascending-region order").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PagePermission {
    /// Data reads permitted.
    pub data_read: bool,
    /// Data writes permitted.
    pub data_write: bool,
    /// Code (instruction) fetches permitted.
    pub code_read: bool,
    /// Region is cacheable.
    pub cacheable: bool,
    /// Region is bufferable (writes may go through the write buffer).
    pub bufferable: bool,
}

/// One of the eight CP15 protection-region descriptors (spec §3).
#[derive(Clone, Copy, Debug, Default)]
pub struct Region {
    /// Base address, meaningful only when `enabled`. Hardware requires this
    /// aligned to `size`; we trust the caller (CP15 register write) for that,
    /// matching the source's lack of an extra validation pass.
    pub base: u32,
    /// Region size in bytes (a power of two from 4 KiB to 4 GiB).
    pub size: u32,
    /// Whether this region is active.
    pub enabled: bool,
    /// Data read/write permission (4-bit access-permission field, modern form).
    pub data_perm: u8,
    /// Code read permission.
    pub code_perm: u8,
    /// Cacheable bit for this region (data and code cache share the bit per
    /// region; cacheable-code/cacheable-data are tracked separately below
    /// because CP15 exposes independent registers for them).
    pub cacheable_data: bool,
    /// Cacheable-code bit (CP15 `0x201`).
    pub cacheable_code: bool,
    /// Bufferable bit (CP15 `0x300`).
    pub bufferable: bool,
}

impl Region {
    fn contains(&self, addr: u32) -> bool {
        if !self.enabled || self.size == 0 {
            return false;
        }
        let end = self.base.wrapping_add(self.size);
        if end > self.base {
            addr >= self.base && addr < end
        } else {
            // A region whose size wraps 4 GiB covers everything from base onward.
            addr >= self.base || addr < end
        }
    }

    /// Resolves this region's access rights for `privileged` (the accessing
    /// core's current mode), per the protection-unit access-permission
    /// encoding: 0x0 = no access, 0x1 = privileged-only, 0x2 = privileged
    /// write / all read, 0x3 = full R/W at both levels.
    fn permission(&self, privileged: bool) -> PagePermission {
        let (read, write) = match self.data_perm & 0x3 {
            0x0 => (false, false),
            0x1 => (privileged, privileged),
            0x2 => (true, privileged),
            _ => (true, true),
        };
        let code_read = match self.code_perm & 0x3 {
            0x0 => false,
            0x1 => privileged,
            _ => true,
        };
        PagePermission {
            data_read: read,
            data_write: write,
            code_read,
            cacheable: self.cacheable_data,
            bufferable: self.bufferable,
        }
    }
}

/// CP15 control-register bits (operation `0x100`), named per spec §4.5's
/// control-write effects table.
#[derive(Clone, Copy, Debug, Default)]
pub struct Control {
    /// MPU (protection unit) enabled.
    pub mpu_enabled: bool,
    /// Instruction cache enabled.
    pub icache_enabled: bool,
    /// Data cache enabled.
    pub dcache_enabled: bool,
    /// Round-robin replacement selected (clear means pseudo-random).
    pub round_robin: bool,
    /// High exception-vector base selected (`0xFFFF0000` instead of `0x0`).
    pub high_vectors: bool,
    /// Big-endian mode. The NDS never runs big-endian in practice; modeled
    /// for completeness of the control-register contract.
    pub big_endian: bool,
    /// ITCM enabled.
    pub itcm_enabled: bool,
    /// DTCM enabled.
    pub dtcm_enabled: bool,
}

/// TCM base/size configuration (CP15 `0x910`/`0x911`).
#[derive(Clone, Copy, Debug)]
pub struct TcmConfig {
    /// Base address the TCM is mapped at.
    pub base: u32,
    /// Configured (software-selectable) size in bytes; may exceed the
    /// physical size, in which case the region aliases (spec §3).
    pub size: u32,
}

impl TcmConfig {
    fn contains(&self, addr: u32, enabled: bool) -> bool {
        enabled && addr.wrapping_sub(self.base) < self.size
    }
}

/// Lockdown register shared shape for I-cache/D-cache (CP15 `0x900`/`0x901`).
pub use crate::core::units::cache::Lockdown;

/// CP15 system-control coprocessor state (ARM9 only).
pub struct Cp15 {
    /// Eight protection-region descriptors.
    pub regions: [Region; NUM_PROTECTION_REGIONS],
    /// Flat 1M-entry permission map for privileged-mode accesses, one entry
    /// per 4 KiB page, rebuilt from `regions` in ascending index order (spec
    /// §3 invariant).
    permission_map_priv: Vec<PagePermission>,
    /// The same map for User-mode accesses. Kept separate rather than
    /// derived at lookup time because "privileged-only" regions resolve to
    /// different rights per mode, not a single mode-independent value.
    permission_map_user: Vec<PagePermission>,
    /// Control register.
    pub control: Control,
    /// ITCM base/size.
    pub itcm: TcmConfig,
    /// DTCM base/size.
    pub dtcm: TcmConfig,
    /// Whether the core is halted pending an IRQ (`wait-for-interrupt`).
    pub halted: bool,
}

impl Cp15 {
    /// Default reset ITCM base/size (mapped at `0`, full physical size).
    const RESET_ITCM: TcmConfig = TcmConfig {
        base: 0,
        size: crate::common::constants::ITCM_PHYS_SIZE,
    };
    /// Default reset DTCM base/size. melonDS and real hardware map DTCM
    /// nowhere useful out of reset; software must configure it before use,
    /// so the reset base deliberately sits outside the address space CP15
    /// can actually select in practice (never hit until configured).
    const RESET_DTCM: TcmConfig = TcmConfig {
        base: 0x0080_0000,
        size: crate::common::constants::DTCM_PHYS_SIZE,
    };

    /// Builds CP15 in its post-reset state: MPU/caches/TCM disabled, no
    /// region enabled, low vector base.
    pub fn new() -> Self {
        Self {
            regions: [Region::default(); NUM_PROTECTION_REGIONS],
            permission_map_priv: vec![PagePermission::default(); PERMISSION_MAP_ENTRIES],
            permission_map_user: vec![PagePermission::default(); PERMISSION_MAP_ENTRIES],
            control: Control::default(),
            itcm: Self::RESET_ITCM,
            dtcm: Self::RESET_DTCM,
            halted: false,
        }
    }

    /// Rebuilds the flat permission map from `regions`, writing in ascending
    /// region-index order so the last write for a page reflects the
    /// highest-priority (highest-indexed) enabled region (spec §3 invariant).
    ///
    /// Exposed as an explicit idempotent entry point (not run implicitly on
    /// every mutation) so a savestate loader can call it after restoring
    /// `regions` from stored descriptor values (spec §7 "Recovery").
    pub fn rebuild_permission_map(&mut self) {
        if !self.control.mpu_enabled {
            // MPU disabled: full access everywhere, nothing cacheable.
            let open = PagePermission {
                data_read: true,
                data_write: true,
                code_read: true,
                cacheable: false,
                bufferable: false,
            };
            self.permission_map_priv.fill(open);
            self.permission_map_user.fill(open);
            return;
        }
        self.permission_map_priv.fill(PagePermission::default());
        self.permission_map_user.fill(PagePermission::default());
        for region in &self.regions {
            if !region.enabled {
                continue;
            }
            let priv_perm = region.permission(true);
            let user_perm = region.permission(false);
            let start_page = (region.base >> 12) as usize;
            let pages = (region.size >> 12).max(1) as usize;
            for i in 0..pages {
                let page = (start_page + i) % PERMISSION_MAP_ENTRIES;
                self.permission_map_priv[page] = priv_perm;
                self.permission_map_user[page] = user_perm;
            }
        }
    }

    /// Looks up the permission entry covering `addr` for the given
    /// privilege level (spec §4.5: coprocessor- and mode-gated access).
    pub fn permission(&self, addr: u32, privileged: bool) -> PagePermission {
        let page = (addr >> 12) as usize % PERMISSION_MAP_ENTRIES;
        if privileged {
            self.permission_map_priv[page]
        } else {
            self.permission_map_user[page]
        }
    }

    /// Whether `addr` currently falls inside the ITCM window.
    pub fn itcm_contains(&self, addr: u32) -> bool {
        self.itcm.contains(addr, self.control.itcm_enabled)
    }

    /// Whether `addr` currently falls inside the DTCM window.
    pub fn dtcm_contains(&self, addr: u32) -> bool {
        self.dtcm.contains(addr, self.control.dtcm_enabled)
    }

    /// Decodes and performs a 32-bit CP15 register write, keyed by the
    /// 12-bit operation ID described in spec §6 (`MCR p15, 0, Rd, CRn, CRm,
    /// opcode2`, packed as `[opcode1:4][CRn:4][CRm:4]` is how the decoder
    /// that calls this produces `op_id`). Returns `false` if `op_id` is
    /// unrecognized (caller raises `Undefined`).
    pub fn write(&mut self, op_id: u16, icache: &mut CacheSim, dcache: &mut CacheSim, value: u32) -> bool {
        match op_id {
            0x100 => {
                self.control = Control {
                    mpu_enabled: value & 1 != 0,
                    icache_enabled: value & (1 << 12) != 0,
                    dcache_enabled: value & (1 << 2) != 0,
                    round_robin: value & (1 << 14) == 0,
                    high_vectors: value & (1 << 13) != 0,
                    big_endian: value & (1 << 7) != 0,
                    itcm_enabled: value & (1 << 18) != 0,
                    dtcm_enabled: value & (1 << 16) != 0,
                };
                icache.enabled = self.control.icache_enabled;
                dcache.enabled = self.control.dcache_enabled;
                self.rebuild_permission_map();
                true
            }
            0x200 => {
                for (i, r) in self.regions.iter_mut().enumerate() {
                    r.cacheable_data = value & (1 << i) != 0;
                }
                self.rebuild_permission_map();
                true
            }
            0x201 => {
                for (i, r) in self.regions.iter_mut().enumerate() {
                    r.cacheable_code = value & (1 << i) != 0;
                }
                true
            }
            0x300 => {
                for (i, r) in self.regions.iter_mut().enumerate() {
                    r.bufferable = value & (1 << i) != 0;
                }
                self.rebuild_permission_map();
                true
            }
            0x500 => {
                // Legacy data access permissions: 2 bits per region.
                for (i, r) in self.regions.iter_mut().enumerate() {
                    r.data_perm = ((value >> (i * 2)) & 0x3) as u8;
                }
                self.rebuild_permission_map();
                true
            }
            0x501 => {
                // Legacy code access permissions: 2 bits per region.
                for (i, r) in self.regions.iter_mut().enumerate() {
                    r.code_perm = ((value >> (i * 2)) & 0x3) as u8;
                }
                self.rebuild_permission_map();
                true
            }
            0x502 => {
                // Modern data access permissions: 4 bits per region.
                for (i, r) in self.regions.iter_mut().enumerate() {
                    r.data_perm = ((value >> (i * 4)) & 0xF) as u8;
                }
                self.rebuild_permission_map();
                true
            }
            0x503 => {
                // Modern code access permissions: 4 bits per region.
                for (i, r) in self.regions.iter_mut().enumerate() {
                    r.code_perm = ((value >> (i * 4)) & 0xF) as u8;
                }
                self.rebuild_permission_map();
                true
            }
            0x600..=0x671 if (op_id & 0xF0) <= NUM_PROTECTION_REGIONS as u16 * 0x10 => {
                let region_idx = ((op_id >> 4) & 0xF) as usize;
                if region_idx >= NUM_PROTECTION_REGIONS {
                    return false;
                }
                let r = &mut self.regions[region_idx];
                r.base = value & !0xFFF;
                r.size = 1u32 << (((value >> 1) & 0x1F) + 1);
                r.enabled = value & 1 != 0;
                self.rebuild_permission_map();
                true
            }
            0x750 | 0x751 | 0x752 => {
                match op_id {
                    0x750 => icache.invalidate_all(),
                    0x751 => icache.invalidate_addr(value),
                    _ => icache.invalidate_set_way((value >> 2) as usize & 0x3, value as usize & 0x3),
                }
                true
            }
            0x760 | 0x761 | 0x762 => {
                match op_id {
                    0x760 => dcache.invalidate_all(),
                    0x761 => dcache.invalidate_addr(value),
                    _ => dcache.invalidate_set_way((value >> 2) as usize & 0x3, value as usize & 0x3),
                }
                true
            }
            0x900 | 0x901 => {
                let lockdown = Lockdown {
                    locked_ways: (value & 0x3) as usize,
                    active: value & (1 << 31) != 0,
                };
                if op_id == 0x900 {
                    icache.lockdown = lockdown;
                } else {
                    dcache.lockdown = lockdown;
                }
                true
            }
            0x910 => {
                self.dtcm = TcmConfig {
                    base: value & !0xFFF,
                    size: 512u32 << ((value >> 1) & 0x1F),
                };
                true
            }
            0x911 => {
                self.itcm = TcmConfig {
                    base: 0,
                    size: 512u32 << ((value >> 1) & 0x1F),
                };
                true
            }
            0x704 | 0x782 => {
                self.halted = true;
                true
            }
            _ => false,
        }
    }

    /// Decodes a 32-bit CP15 register read. Returns `None` for write-only or
    /// unrecognized operations (caller raises `Undefined`).
    pub fn read(&self, op_id: u16) -> Option<u32> {
        match op_id {
            0x000 => Some(0x4105_9461), // ARM946E-S main ID, matches melonDS's constant.
            0x100 => {
                let c = &self.control;
                Some(
                    (c.mpu_enabled as u32)
                        | ((c.dcache_enabled as u32) << 2)
                        | ((c.big_endian as u32) << 7)
                        | ((c.icache_enabled as u32) << 12)
                        | ((c.high_vectors as u32) << 13)
                        | ((!c.round_robin as u32) << 14)
                        | ((c.dtcm_enabled as u32) << 16)
                        | ((c.itcm_enabled as u32) << 18),
                )
            }
            0x910 => Some((self.dtcm.base & !0xFFF) | (tcm_size_field(self.dtcm.size) << 1)),
            0x911 => Some(tcm_size_field(self.itcm.size) << 1),
            _ => None,
        }
    }

    /// Returns the active exception-vector base, per the control register's
    /// high-vectors bit.
    pub fn vector_base(&self) -> u32 {
        if self.control.high_vectors {
            crate::common::constants::VECTOR_BASE_HIGH
        } else {
            crate::common::constants::VECTOR_BASE_LOW
        }
    }

    /// The replacement policy implied by the control register, for
    /// constructing/reconfiguring `CacheSim` instances.
    pub fn replacement_policy(&self) -> Policy {
        if self.control.round_robin {
            Policy::RoundRobin
        } else {
            Policy::Random
        }
    }
}

impl Default for Cp15 {
    fn default() -> Self {
        Self::new()
    }
}

fn tcm_size_field(size: u32) -> u32 {
    (32 - (size.max(512) / 512).leading_zeros()).saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp15_with_regions(mut f: impl FnMut(&mut [Region; NUM_PROTECTION_REGIONS])) -> Cp15 {
        let mut cp15 = Cp15::new();
        cp15.control.mpu_enabled = true;
        f(&mut cp15.regions);
        cp15.rebuild_permission_map();
        cp15
    }

    #[test]
    fn highest_index_region_wins_on_overlap() {
        let cp15 = cp15_with_regions(|r| {
            r[1] = Region {
                base: 0x0200_0000,
                size: 0x0200_0000,
                enabled: true,
                data_perm: 0x1,
                code_perm: 0x1,
                ..Default::default()
            };
            r[2] = Region {
                base: 0x0300_0000,
                size: 0x0010_0000,
                enabled: true,
                data_perm: 0x3,
                code_perm: 0x3,
                ..Default::default()
            };
        });
        let p = cp15.permission(0x0300_0010, true);
        assert!(p.data_write);
    }

    #[test]
    fn mpu_disabled_grants_full_access() {
        let cp15 = Cp15::new();
        assert!(cp15.permission(0x0200_0000, false).data_write);
    }

    #[test]
    fn privileged_only_region_denies_user_mode_access() {
        let cp15 = cp15_with_regions(|r| {
            r[0] = Region {
                base: 0x0200_0000,
                size: 0x0200_0000,
                enabled: true,
                data_perm: 0x1,
                code_perm: 0x1,
                ..Default::default()
            };
        });
        assert!(cp15.permission(0x0200_0000, true).data_write);
        assert!(!cp15.permission(0x0200_0000, false).data_read);
        assert!(!cp15.permission(0x0200_0000, false).data_write);
    }

    #[test]
    fn control_write_toggles_cache_enable_and_vector_base() {
        let mut cp15 = Cp15::new();
        let mut icache = CacheSim::new(4, 4, Policy::RoundRobin, false);
        let mut dcache = CacheSim::new(4, 4, Policy::RoundRobin, true);
        cp15.write(0x100, &mut icache, &mut dcache, 1 | (1 << 12) | (1 << 13));
        assert!(icache.enabled);
        assert_eq!(cp15.vector_base(), crate::common::constants::VECTOR_BASE_HIGH);
    }
}
