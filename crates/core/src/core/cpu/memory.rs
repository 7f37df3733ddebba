//! The ARM9 full memory pipeline and the ARM7 reduced variant (spec §4.4,
//! §4.4a "ARM7 memory pipeline").
//!
//! Every code fetch and data access funnels through this module so the
//! ITCM/DTCM → cache → write-buffer-drain-before-read → bus-arbitration
//! sequencing (spec §4.4 step list) lives in one place instead of being
//! duplicated across instruction handlers. The ARM7 core has no CP15, no
//! caches and no TCM, so its path here simply skips straight to bus
//! arbitration with the same region timing table the ARM9's uncached path
//! uses (spec §4.4a, grounded in melonDS's `ARMv4`/`ARMv5` split).
//!
//! The cache here (`core::units::cache::CacheSim`) tracks tags and
//! dirtiness only, not data — a write that hits a cacheable, bufferable
//! region enqueues in the write buffer instead of touching the bus
//! immediately, and every data read drains the write buffer first, so the
//! bus/RAM contents the read observes are always current.

use crate::common::{AccessWidth, Addr, CpuException};
use crate::core::cpu::trap;
use crate::core::cpu::{CoreKind, Cpu};
use crate::soc::arbiter::{Arbiter, RegionTiming, Requester};
use crate::soc::bus::Region;
use crate::soc::Soc;

/// Maps a core to the [`Requester`] identity the arbiter tracks timestamps for.
pub(crate) fn requester(kind: CoreKind) -> Requester {
    match kind {
        CoreKind::Arm9 => Requester::Arm9,
        CoreKind::Arm7 => Requester::Arm7,
    }
}

fn region_timing(region: Region) -> RegionTiming {
    match region {
        Region::MainRam => RegionTiming::MAIN_RAM,
        Region::SharedWram | Region::Arm7Wram => RegionTiming::SHARED_WRAM,
        Region::Bios9 | Region::Bios7 => RegionTiming::BIOS,
        Region::Open => RegionTiming::CART,
    }
}

fn charge_bus(soc: &Soc, arbiter: &mut Arbiter, who: Requester, is_arm9: bool, addr: Addr, width: AccessWidth, sequential: bool) {
    match soc.bus.decode(addr, is_arm9) {
        (Region::MainRam, _) => {
            let _ = arbiter.access_main_ram(who, width, sequential);
        }
        (region, _) => {
            let _ = arbiter.access_uncontended(who, region_timing(region), width, sequential);
        }
    }
}

fn bus_read(soc: &Soc, is_arm9: bool, addr: Addr, width: AccessWidth) -> u32 {
    match width {
        AccessWidth::Byte => u32::from(soc.bus.read_u8(addr, is_arm9)),
        AccessWidth::Half => u32::from(soc.bus.read_u16(addr, is_arm9)),
        AccessWidth::Word => soc.bus.read_u32(addr, is_arm9),
    }
}

fn bus_write(soc: &mut Soc, is_arm9: bool, addr: Addr, width: AccessWidth, value: u32) {
    match width {
        AccessWidth::Byte => soc.bus.write_u8(addr, is_arm9, value as u8),
        AccessWidth::Half => soc.bus.write_u16(addr, is_arm9, value as u16),
        AccessWidth::Word => soc.bus.write_u32(addr, is_arm9, value),
    }
}

/// Drains every entry currently queued in `cpu`'s write buffer onto the bus.
/// Exposed beyond this module for CP15's cache-clean/write-buffer-drain
/// operations (`isa::arm`'s coprocessor handler), which need the same
/// drain path the ordinary read/write sequencing above uses.
pub(crate) fn drain_write_buffer(cpu: &mut Cpu, soc: &mut Soc, arbiter: &mut Arbiter, who: Requester, is_arm9: bool) {
    if let Some(wb) = cpu.write_buffer.as_mut() {
        wb.drain_all(|addr, width, value, sequential| {
            bus_write(soc, is_arm9, Addr(addr), width, value);
            charge_bus(soc, arbiter, who, is_arm9, Addr(addr), width, sequential);
        });
    }
}

/// Fetches one instruction unit (a 32-bit ARM word or 16-bit THUMB
/// half-word, per the core's current state) at `addr`. `sequential` should
/// be false only for the first fetch issued after a pipeline flush.
///
/// ARM9 code fetches consult ITCM, then the instruction cache, before
/// falling back to the bus; ARM7 always goes straight to the bus. Returns
/// the fetched opcode (`0` and `Some(addr)` if the region denies code
/// reads) rather than raising the abort directly: a prefetch abort is only
/// taken once this fetch's pipeline slot reaches execution, so the caller
/// (the [`Pipeline`](super::Pipeline)) carries the marker forward.
pub fn code_fetch(cpu: &mut Cpu, soc: &Soc, arbiter: &mut Arbiter, addr: u32, sequential: bool) -> (u32, Option<u32>) {
    let who = requester(cpu.kind);
    let is_arm9 = cpu.kind == CoreKind::Arm9;
    let width = if cpu.cpsr.thumb() { AccessWidth::Half } else { AccessWidth::Word };

    if is_arm9 {
        let itcm_hit = cpu.cp15.as_ref().is_some_and(|c| c.itcm_contains(addr));
        if itcm_hit {
            arbiter.charge_internal(who, 1);
            let base = cpu.cp15.as_ref().map_or(0, |c| c.itcm.base);
            if let Some(itcm) = cpu.itcm_ram() {
                let value = match width {
                    AccessWidth::Half => u32::from(itcm.read_u16(addr.wrapping_sub(base))),
                    _ => itcm.read_u32(addr.wrapping_sub(base)),
                };
                return (value, None);
            }
        }

        let permission = cpu.cp15.as_ref().map(|c| c.permission(addr, cpu.cpsr.mode().is_privileged()));
        if let Some(permission) = permission {
            if !permission.code_read {
                return (0, Some(addr));
            }

            let cache_enabled = cpu.icache.as_ref().is_some_and(|c| c.enabled);
            if cache_enabled && permission.cacheable {
                let hit = cpu.icache.as_mut().and_then(|c| c.lookup(addr)).is_some();
                if hit {
                    arbiter.charge_internal(who, 1);
                } else {
                    if let Some(icache) = cpu.icache.as_mut() {
                        icache.install(addr);
                    }
                    charge_bus(soc, arbiter, who, is_arm9, Addr(addr), width, false);
                    for i in 1..crate::common::constants::LINE_FILL_BURST_WORDS {
                        charge_bus(soc, arbiter, who, is_arm9, Addr(addr.wrapping_add(i * 4)), AccessWidth::Word, true);
                    }
                }
                return (bus_read(soc, is_arm9, Addr(addr), width), None);
            }
        }
    }

    charge_bus(soc, arbiter, who, is_arm9, Addr(addr), width, sequential);
    (bus_read(soc, is_arm9, Addr(addr), width), None)
}

/// Reads `width` bytes at `addr` (zero-extended; callers needing sign
/// extension do it themselves from the raw bits). Raises a data abort and
/// returns `0` if CP15 denies the read.
pub fn data_read(cpu: &mut Cpu, soc: &mut Soc, arbiter: &mut Arbiter, addr: u32, width: AccessWidth, sequential: bool) -> u32 {
    let who = requester(cpu.kind);
    let is_arm9 = cpu.kind == CoreKind::Arm9;

    if is_arm9 {
        let dtcm_hit = cpu.cp15.as_ref().is_some_and(|c| c.dtcm_contains(addr));
        if dtcm_hit {
            arbiter.charge_internal(who, 1);
            let base = cpu.cp15.as_ref().map_or(0, |c| c.dtcm.base);
            if let Some(dtcm) = cpu.dtcm_ram() {
                return match width {
                    AccessWidth::Byte => u32::from(dtcm.read_u8(addr.wrapping_sub(base))),
                    AccessWidth::Half => u32::from(dtcm.read_u16(addr.wrapping_sub(base))),
                    AccessWidth::Word => dtcm.read_u32(addr.wrapping_sub(base)),
                };
            }
        }

        let permission = cpu.cp15.as_ref().map(|c| c.permission(addr, cpu.cpsr.mode().is_privileged()));
        if let Some(permission) = permission {
            if !permission.data_read {
                trap::trigger_data_abort(cpu, addr);
                return 0;
            }

            drain_write_buffer(cpu, soc, arbiter, who, is_arm9);

            let cache_enabled = cpu.dcache.as_ref().is_some_and(|c| c.enabled);
            if cache_enabled && permission.cacheable {
                let hit = cpu.dcache.as_mut().and_then(|c| c.lookup(addr)).is_some();
                if hit {
                    arbiter.charge_internal(who, 1);
                } else {
                    let evicted = cpu.dcache.as_mut().and_then(|c| c.install(addr)).is_some();
                    if evicted {
                        drain_write_buffer(cpu, soc, arbiter, who, is_arm9);
                    }
                    charge_bus(soc, arbiter, who, is_arm9, Addr(addr), AccessWidth::Word, false);
                    for i in 1..crate::common::constants::LINE_FILL_BURST_WORDS {
                        charge_bus(soc, arbiter, who, is_arm9, Addr(addr.wrapping_add(i * 4)), AccessWidth::Word, true);
                    }
                }
                return bus_read(soc, is_arm9, Addr(addr), width);
            }
        }
    }

    charge_bus(soc, arbiter, who, is_arm9, Addr(addr), width, sequential);
    bus_read(soc, is_arm9, Addr(addr), width)
}

/// Writes `value` (low `width` bytes significant) to `addr`. Raises a data
/// abort and discards the write if CP15 denies it.
pub fn data_write(cpu: &mut Cpu, soc: &mut Soc, arbiter: &mut Arbiter, addr: u32, width: AccessWidth, value: u32, sequential: bool) {
    let who = requester(cpu.kind);
    let is_arm9 = cpu.kind == CoreKind::Arm9;

    if is_arm9 {
        let dtcm_hit = cpu.cp15.as_ref().is_some_and(|c| c.dtcm_contains(addr));
        if dtcm_hit {
            arbiter.charge_internal(who, 1);
            let base = cpu.cp15.as_ref().map_or(0, |c| c.dtcm.base);
            if let Some(dtcm) = cpu.dtcm_ram_mut() {
                match width {
                    AccessWidth::Byte => dtcm.write_u8(addr.wrapping_sub(base), value as u8),
                    AccessWidth::Half => dtcm.write_u16(addr.wrapping_sub(base), value as u16),
                    AccessWidth::Word => dtcm.write_u32(addr.wrapping_sub(base), value),
                }
            }
            return;
        }

        let permission = cpu.cp15.as_ref().map(|c| c.permission(addr, cpu.cpsr.mode().is_privileged()));
        if let Some(permission) = permission {
            if !permission.data_write {
                trap::trigger_data_abort(cpu, addr);
                return;
            }

            let cache_enabled = cpu.dcache.as_ref().is_some_and(|c| c.enabled);
            if cache_enabled && permission.cacheable {
                let hit = cpu.dcache.as_mut().and_then(|c| c.lookup(addr)).is_some();
                if !hit {
                    let evicted = cpu.dcache.as_mut().and_then(|c| c.install(addr)).is_some();
                    if evicted {
                        drain_write_buffer(cpu, soc, arbiter, who, is_arm9);
                    }
                }
                if let Some(dcache) = cpu.dcache.as_mut() {
                    dcache.mark_dirty(addr);
                }

                if permission.bufferable {
                    if let Some(wb) = cpu.write_buffer.as_mut() {
                        if wb.is_full() {
                            drain_write_buffer(cpu, soc, arbiter, who, is_arm9);
                        }
                        if let Some(wb) = cpu.write_buffer.as_mut() {
                            wb.push(addr, width, value);
                        }
                        return;
                    }
                }

                bus_write(soc, is_arm9, Addr(addr), width, value);
                charge_bus(soc, arbiter, who, is_arm9, Addr(addr), width, false);
                return;
            }

            if permission.bufferable {
                if let Some(wb) = cpu.write_buffer.as_mut() {
                    if wb.is_full() {
                        drain_write_buffer(cpu, soc, arbiter, who, is_arm9);
                    }
                    if let Some(wb) = cpu.write_buffer.as_mut() {
                        wb.push(addr, width, value);
                    }
                    return;
                }
            }
        }
    }

    bus_write(soc, is_arm9, Addr(addr), width, value);
    charge_bus(soc, arbiter, who, is_arm9, Addr(addr), width, sequential);
}

/// Raises [`CpuException::Undefined`] for decode failures reached from
/// inside a handler (coprocessor accesses to unimplemented coprocessors,
/// reserved bit patterns).
pub fn undefined(cpu: &mut Cpu) {
    trap::dispatch(cpu, CpuException::Undefined);
}
