//! Boot sequence and two-core scheduler, exercised through the public `Nds`
//! entry point rather than `loader`/`scheduler`'s own unit tests.

use nds_core::config::{BootMode, Config};
use nds_core::core::arch::gpr::SP;
use nds_core::core::arch::mode::Mode;
use nds_core::common::NdsError;
use nds_core::Nds;

use crate::common::{fresh_nds, rom_with_payloads};

/// Spec §4.9/§6: direct boot copies both binaries to their header-named RAM
/// addresses and queues each core's entry-point flush, observable as both
/// PCs reading two steps ahead of their respective entry points.
#[test]
fn nds_new_boots_both_cores_from_their_header_segments() {
    let nds = fresh_nds();
    assert_eq!(nds.cpu9.regs.pc(), 0x0200_0008);
    assert_eq!(nds.cpu7.regs.pc(), 0x0200_1008);
}

/// The parsed header surfaces the game code field the ROM builder wrote.
#[test]
fn nds_new_exposes_the_parsed_cartridge_header() {
    let nds = fresh_nds();
    assert_eq!(&nds.header.game_code, b"ABCD");
}

/// Firmware boot is explicitly out of scope (spec §1); `Nds::new` rejects it
/// at construction rather than silently falling back to direct boot.
#[test]
fn firmware_boot_mode_is_rejected_at_the_nds_level() {
    let mut config = Config::default();
    config.general.boot_mode = BootMode::Firmware;
    let rom = rom_with_payloads(&[0u8; 0x40], &[0u8; 0x40]);
    let err = Nds::new(rom, &config).unwrap_err();
    assert!(matches!(err, NdsError::UnsupportedBootMode));
}

/// Direct boot seeds distinct SVC/IRQ/SYS stack pointers per core (spec
/// §4.9); the two cores never share a stack despite sharing main RAM.
#[test]
fn boot_seeds_distinct_stack_pointers_per_core() {
    let mut nds = fresh_nds();
    nds.cpu9.switch_mode(Mode::Svc);
    let arm9_svc_sp = nds.cpu9.regs.read(SP);
    nds.cpu7.switch_mode(Mode::Svc);
    let arm7_svc_sp = nds.cpu7.regs.read(SP);
    assert_ne!(arm9_svc_sp, arm7_svc_sp);
    assert_ne!(arm9_svc_sp, 0);
    assert_ne!(arm7_svc_sp, 0);
}

/// Spec §5 "Concurrency & Resource Model": the scheduler steps whichever
/// core is behind, so over many steps both cores retire instructions
/// instead of one running arbitrarily far ahead of the other.
#[test]
fn run_cycles_advances_both_cores_instruction_counters() {
    let mut nds = fresh_nds();
    nds.run_cycles(500);
    assert!(nds.cpu9.instructions_retired > 0);
    assert!(nds.cpu7.instructions_retired > 0);
}

/// `step_once` retires exactly one instruction on exactly one core per call
/// (spec §5 "each step advances one core by one instruction").
#[test]
fn step_once_retires_exactly_one_instruction_total() {
    let mut nds = fresh_nds();
    let before = nds.cpu9.instructions_retired + nds.cpu7.instructions_retired;
    nds.step_once();
    let after = nds.cpu9.instructions_retired + nds.cpu7.instructions_retired;
    assert_eq!(after, before + 1);
}

/// `stats()` samples both cores' retired-instruction counters after a run.
#[test]
fn stats_reflects_retired_instructions_after_a_run() {
    let mut nds = fresh_nds();
    nds.run_cycles(200);
    let (stats, _elapsed) = nds.stats();
    assert_eq!(stats.arm9.instructions_retired, nds.cpu9.instructions_retired);
    assert_eq!(stats.arm7.instructions_retired, nds.cpu7.instructions_retired);
}
