//! `Nds`: the emulator instance (spec §3 "Ownership").
//!
//! Owns both cores, the SoC, and the bus arbiter side-by-side, and is the
//! only thing an embedder constructs directly. Everything else in this
//! crate is reached through it or through the ticket it hands to a host
//! JIT backend (spec §8.1).

use std::time::{Duration, Instant};

use crate::common::error::NdsError;
use crate::config::Config;
use crate::core::cpu::{Cpu, CoreKind};
use crate::sim::loader::{self, CartHeader};
use crate::sim::scheduler;
use crate::soc::arbiter::Arbiter;
use crate::soc::Soc;
use crate::stats::SimStats;

/// Owns both ARM cores, the shared SoC, and the bus arbiter: the complete
/// state of one running console (spec §3 "Ownership" — "one `Nds`/`Console`
/// object owns both cores, the SoC, and the arbiter; nothing is global").
pub struct Nds {
    /// The ARM9 (ARMv5TE) core.
    pub cpu9: Cpu,
    /// The ARM7 (ARMv4T) core.
    pub cpu7: Cpu,
    /// The shared bus, cartridge, backup, and SD collaborators.
    pub soc: Soc,
    /// The main-RAM bus-contention arbiter both cores share.
    pub arbiter: Arbiter,
    /// The cartridge header parsed during boot (game title/code, DSi flag).
    pub header: CartHeader,
    started_at: Instant,
}

impl Nds {
    /// Builds both cores, assembles the SoC from `rom`, and runs the
    /// direct-boot sequence (spec §4.9). Rejects `config.general.boot_mode
    /// == Firmware` the same way [`loader::boot`] does, since firmware
    /// contents are out of scope for this core.
    ///
    /// # Errors
    ///
    /// Propagates [`NdsError`] from [`Soc::new`] (ROM too small, bad backup
    /// kind, unreadable SD index) or from [`loader::boot`] (firmware boot
    /// requested).
    pub fn new(rom: Vec<u8>, config: &Config) -> Result<Self, NdsError> {
        let mut soc = Soc::new(rom, config)?;
        let mut cpu9 = Cpu::with_config(CoreKind::Arm9, config);
        let mut cpu7 = Cpu::with_config(CoreKind::Arm7, config);

        let header = loader::boot(&mut cpu9, &mut cpu7, &mut soc, config)?;

        Ok(Self { cpu9, cpu7, soc, arbiter: Arbiter::new(), header, started_at: Instant::now() })
    }

    /// Advances whichever core is behind by exactly one instruction (spec
    /// §5: "the outer emulator scheduler picks which core to step by
    /// comparing timestamps").
    pub fn step_once(&mut self) {
        scheduler::step_once(&mut self.cpu9, &mut self.cpu7, &mut self.soc, &mut self.arbiter);
    }

    /// Runs both cores forward until the slower core has advanced by at
    /// least `cycles` bus cycles.
    pub fn run_cycles(&mut self, cycles: u64) {
        scheduler::run_cycles(&mut self.cpu9, &mut self.cpu7, &mut self.soc, &mut self.arbiter, cycles);
    }

    /// Snapshots both cores' retired-instruction and cache counters plus
    /// host wall-clock time elapsed since construction.
    pub fn stats(&self) -> (SimStats, Duration) {
        (SimStats::sample(&self.cpu9, &self.cpu7, &self.arbiter), self.started_at.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_segments() -> Vec<u8> {
        let mut rom = vec![0u8; 0x2000];
        let arm9_rom_offset = 0x1000u32;
        rom[0x020..0x024].copy_from_slice(&arm9_rom_offset.to_le_bytes());
        rom[0x024..0x028].copy_from_slice(&0x0200_0000u32.to_le_bytes());
        rom[0x028..0x02C].copy_from_slice(&0x0200_0000u32.to_le_bytes());
        rom[0x02C..0x030].copy_from_slice(&0x10u32.to_le_bytes());

        let arm7_rom_offset = 0x1800u32;
        rom[0x030..0x034].copy_from_slice(&arm7_rom_offset.to_le_bytes());
        rom[0x034..0x038].copy_from_slice(&0x0200_1000u32.to_le_bytes());
        rom[0x038..0x03C].copy_from_slice(&0x0200_1000u32.to_le_bytes());
        rom[0x03C..0x040].copy_from_slice(&0x10u32.to_le_bytes());
        rom
    }

    #[test]
    fn new_boots_both_cores_to_their_header_entry_points() {
        let config = Config::default();
        let nds = Nds::new(rom_with_segments(), &config).unwrap();
        assert_eq!(nds.cpu9.regs.pc(), 0x0200_0008);
        assert_eq!(nds.cpu7.regs.pc(), 0x0200_1008);
    }

    #[test]
    fn firmware_boot_mode_is_rejected_at_construction() {
        let mut config = Config::default();
        config.general.boot_mode = crate::config::BootMode::Firmware;
        let err = Nds::new(rom_with_segments(), &config).unwrap_err();
        assert!(matches!(err, NdsError::UnsupportedBootMode));
    }

    #[test]
    fn run_cycles_retires_instructions_on_both_cores() {
        let config = Config::default();
        let mut nds = Nds::new(rom_with_segments(), &config).unwrap();
        nds.run_cycles(200);
        let (stats, _) = nds.stats();
        assert!(stats.arm9.cycles >= 200 || stats.arm7.cycles >= 200);
    }
}
