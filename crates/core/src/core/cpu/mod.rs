//! CPU core definition (spec §2 "Two concrete cores", §4 "Pipeline").
//!
//! A single [`Cpu`] struct models either the ARM9 (ARMv5TE, full CP15 with
//! protection regions, caches, TCM, and a write buffer) or the ARM7
//! (ARMv4T, a flat-timing bus client with no CP15 at all) depending on its
//! [`CoreKind`]. The memory pipeline (`memory.rs`) branches on `kind` rather
//! than existing as two unrelated types, since the register file, CPSR,
//! fetch pipeline, and dispatch loop are identical between the two cores;
//! only the memory side differs.

/// Instruction dispatch: fetch, condition check, decode-table lookup, and
/// handler invocation (spec §4.2/§4.3).
pub mod execution;

/// The ARM9 full memory pipeline and the ARM7 reduced variant (spec §4.4/§4.4a).
pub mod memory;

/// Exception triggering, wired to `core::arch::trap` (spec §4.3 step 6).
pub mod trap;

use crate::common::constants::{DCACHE_SETS, DCACHE_WAYS, ICACHE_SETS, ICACHE_WAYS};
use crate::core::arch::cpsr::Psr;
use crate::core::arch::gpr::Registers;
use crate::core::arch::mode::Mode;
use crate::core::units::cache::{CacheSim, Policy};
use crate::core::units::cp15::Cp15;
use crate::core::units::write_buffer::WriteBuffer;
use crate::soc::bus::RamBlock;

/// Which concrete core a [`Cpu`] instance models (spec §2 "Two concrete cores").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoreKind {
    /// ARMv5TE, full CP15/cache/TCM/write-buffer complement.
    Arm9,
    /// ARMv4T, a reduced memory pipeline with no CP15 at all.
    Arm7,
}

impl CoreKind {
    /// True for the ARM9 (the only core with ARMv5TE extensions: `CLZ`,
    /// saturating arithmetic, `BLX`, and CP15).
    pub fn is_armv5(self) -> bool {
        matches!(self, CoreKind::Arm9)
    }
}

/// The two-slot instruction prefetch pipeline (spec §4.2: "a three-stage
/// logical pipeline: the currently executing instruction, plus two
/// prefetched words/half-words").
///
/// `R15`, as stored in [`Registers`], always reads as the address the next
/// fetch will target (current instruction address + 8 on ARM, + 4 on
/// THUMB) — the real-hardware convention this model reproduces by letting
/// the register file simply hold that address directly, rather than
/// computing an offset at every read.
pub struct Pipeline {
    /// `[0]`: about to execute. `[1]`: one fetch further ahead.
    opcodes: [u32; 2],
    /// Fault address if the fetch that produced the matching `opcodes` slot
    /// hit a non-executable region. Carried alongside the opcode through the
    /// pipeline and only turned into a [`crate::common::CpuException::PrefetchAbort`]
    /// once that slot reaches execution (spec §7: "raised one instruction
    /// later, when the aborted instruction would have executed").
    aborts: [Option<u32>; 2],
}

impl Pipeline {
    fn new() -> Self {
        Self { opcodes: [0; 2], aborts: [None; 2] }
    }

    /// Refills both slots after a branch, jumping the fetch stream to
    /// `target`. Leaves `regs`'s PC at `target + 2*step`, matching the
    /// "PC reads as current + 8/4" convention once the refill completes.
    /// `fetches` are the two already-performed fetches at `target` and
    /// `target + step`, each an opcode plus `Some(addr)` if that fetch was a
    /// prefetch abort. Taking them as data rather than a fetch callback lets
    /// the caller perform the actual bus access (which needs `&mut Cpu` as a
    /// whole) before this method ever borrows `regs`.
    fn flush(&mut self, regs: &mut Registers, step: u32, target: u32, fetches: [(u32, Option<u32>); 2]) {
        self.opcodes = [fetches[0].0, fetches[1].0];
        self.aborts = [fetches[0].1, fetches[1].1];
        regs.set_pc(target.wrapping_add(step * 2));
    }

    /// Advances the pipeline by one step: returns the opcode about to
    /// execute (plus its abort marker, if any), shifts the second slot into
    /// the first, installs `next` (the fetch already performed at the
    /// address PC currently holds) as the new second slot, and advances PC
    /// by `step`.
    fn advance(&mut self, regs: &mut Registers, step: u32, next: (u32, Option<u32>)) -> (u32, Option<u32>) {
        let executing = self.opcodes[0];
        let executing_abort = self.aborts[0];
        self.opcodes[0] = self.opcodes[1];
        self.aborts[0] = self.aborts[1];
        self.opcodes[1] = next.0;
        self.aborts[1] = next.1;
        regs.set_pc(regs.pc().wrapping_add(step));
        (executing, executing_abort)
    }
}

/// One ARM9 or ARM7 CPU core.
pub struct Cpu {
    /// Which concrete core this is.
    pub kind: CoreKind,
    /// Banked general-purpose register file.
    pub regs: Registers,
    /// Current program status register.
    pub cpsr: Psr,
    /// Instruction prefetch pipeline.
    pipeline: Pipeline,
    /// Whether the pipeline needs a full refetch (set after any PC-changing
    /// instruction; consulted by `execution::step` before the next fetch).
    pending_flush: Option<u32>,

    /// CP15 (ARM9 only).
    pub cp15: Option<Cp15>,
    /// Instruction cache (ARM9 only).
    pub icache: Option<CacheSim>,
    /// Data cache (ARM9 only).
    pub dcache: Option<CacheSim>,
    /// Write buffer (ARM9 only).
    pub write_buffer: Option<WriteBuffer>,
    /// ITCM backing store (ARM9 only; core-local, not on the shared bus).
    itcm_ram: Option<RamBlock>,
    /// DTCM backing store (ARM9 only).
    dtcm_ram: Option<RamBlock>,

    /// External IRQ request line, driven by the (out-of-scope) interrupt
    /// controller; modeled here only as a level the dispatch loop polls.
    pub irq_line: bool,
    /// External FIQ request line.
    pub fiq_line: bool,
    /// True while halted in `wait-for-interrupt` (spec §4.5 WFI op, §9 Open
    /// Question: a halted core's arbiter timestamp tracks the scheduler's
    /// global time, not the IRQ's own latch time).
    pub halted: bool,

    /// Retired-instruction counter, for stats.
    pub instructions_retired: u64,
}

impl Cpu {
    /// Builds a core at its architectural reset state: Supervisor mode, ARM
    /// state, IRQ/FIQ masked, PC at the appropriate BIOS-equivalent reset
    /// vector (the caller overwrites PC/SP immediately after via the boot
    /// sequence, spec §4.9, so the exact reset PC is not load-bearing here).
    pub fn new(kind: CoreKind) -> Self {
        let (cp15, icache, dcache, write_buffer, itcm_ram, dtcm_ram) = if kind == CoreKind::Arm9 {
            (
                Some(Cp15::new()),
                Some(CacheSim::new(ICACHE_SETS, ICACHE_WAYS, Policy::RoundRobin, false)),
                Some(CacheSim::new(DCACHE_SETS, DCACHE_WAYS, Policy::RoundRobin, true)),
                Some(WriteBuffer::new()),
                Some(RamBlock::new(crate::common::constants::ITCM_PHYS_SIZE as usize)),
                Some(RamBlock::new(crate::common::constants::DTCM_PHYS_SIZE as usize)),
            )
        } else {
            (None, None, None, None, None, None)
        };

        Self {
            kind,
            regs: Registers::new(),
            cpsr: Psr::reset(),
            pipeline: Pipeline::new(),
            pending_flush: None,
            cp15,
            icache,
            dcache,
            write_buffer,
            itcm_ram,
            dtcm_ram,
            irq_line: false,
            fiq_line: false,
            halted: false,
            instructions_retired: 0,
        }
    }

    /// Builds a core at reset state with CP15's replacement policy and TCM
    /// sizes taken from `config` instead of their hardware-reset defaults
    /// (spec §3 CP15 reset state is configurable per `Cp15Config`). No-op for
    /// the ARM7, which carries no CP15.
    pub fn with_config(kind: CoreKind, config: &crate::config::Config) -> Self {
        let mut cpu = Self::new(kind);
        if kind == CoreKind::Arm9 {
            let policy = match config.cp15.replacement_policy {
                crate::config::ReplacementPolicy::RoundRobin => Policy::RoundRobin,
                crate::config::ReplacementPolicy::PseudoRandom => Policy::Random,
            };
            cpu.icache = Some(CacheSim::new(ICACHE_SETS, ICACHE_WAYS, policy, false));
            cpu.dcache = Some(CacheSim::new(DCACHE_SETS, DCACHE_WAYS, policy, true));
            if let Some(cp15) = cpu.cp15.as_mut() {
                cp15.itcm.size = config.cp15.itcm_size;
                cp15.dtcm.size = config.cp15.dtcm_size;
            }
            cpu.itcm_ram = Some(RamBlock::new(config.cp15.itcm_size as usize));
            cpu.dtcm_ram = Some(RamBlock::new(config.cp15.dtcm_size as usize));
        }
        cpu
    }

    /// Instruction step size for the current instruction set state: 4 bytes
    /// in ARM state, 2 in THUMB.
    fn step_size(&self) -> u32 {
        if self.cpsr.thumb() { 2 } else { 4 }
    }

    /// Requests a pipeline flush to `target` (any write to PC, a branch, or
    /// exception entry/return). Consulted at the top of the next
    /// `execution::step` call rather than acted on immediately, so a single
    /// instruction handler can set this and still finish executing normally.
    pub fn request_flush(&mut self, target: u32) {
        self.pending_flush = Some(target);
    }

    /// Switches CPSR's mode field, banking the register file to match (spec
    /// §2 "every CPSR write that changes the mode field must bank the
    /// register file to match before the new mode's code runs").
    pub fn switch_mode(&mut self, new_mode: Mode) {
        let old_mode = self.cpsr.mode();
        if old_mode != new_mode {
            self.regs.switch_mode(old_mode, new_mode);
            self.cpsr.set_mode(new_mode);
        }
    }

    /// Reference to ITCM backing storage, if this core has one and it is
    /// currently mapped over `addr`.
    pub(crate) fn itcm_ram(&self) -> Option<&RamBlock> {
        self.itcm_ram.as_ref()
    }

    pub(crate) fn itcm_ram_mut(&mut self) -> Option<&mut RamBlock> {
        self.itcm_ram.as_mut()
    }

    pub(crate) fn dtcm_ram(&self) -> Option<&RamBlock> {
        self.dtcm_ram.as_ref()
    }

    pub(crate) fn dtcm_ram_mut(&mut self) -> Option<&mut RamBlock> {
        self.dtcm_ram.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm7_has_no_cp15_or_caches() {
        let cpu = Cpu::new(CoreKind::Arm7);
        assert!(cpu.cp15.is_none());
        assert!(cpu.icache.is_none());
        assert!(cpu.write_buffer.is_none());
    }

    #[test]
    fn arm9_reset_builds_full_complement() {
        let cpu = Cpu::new(CoreKind::Arm9);
        assert!(cpu.cp15.is_some());
        assert!(cpu.icache.is_some());
        assert!(cpu.dcache.is_some());
        assert!(cpu.write_buffer.is_some());
    }

    #[test]
    fn pipeline_flush_sets_pc_two_steps_ahead_of_target() {
        let mut cpu = Cpu::new(CoreKind::Arm9);
        cpu.pipeline.flush(&mut cpu.regs, 4, 0x0800_0000, [(0, None), (0, None)]);
        assert_eq!(cpu.regs.pc(), 0x0800_0008);
    }

    #[test]
    fn pipeline_advance_shifts_slots_and_tracks_next_fetch_address() {
        let mut cpu = Cpu::new(CoreKind::Arm9);
        cpu.pipeline.flush(
            &mut cpu.regs,
            4,
            0x0800_0000,
            [(0x0800_0000, None), (0x0800_0004, None)],
        );
        let (executing, abort) = cpu.pipeline.advance(&mut cpu.regs, 4, (0x0800_0008, None));
        assert_eq!(executing, 0x0800_0000);
        assert!(abort.is_none());
        assert_eq!(cpu.regs.pc(), 0x0800_000C);
    }

    #[test]
    fn pipeline_carries_an_abort_marker_to_the_executing_slot() {
        let mut cpu = Cpu::new(CoreKind::Arm9);
        cpu.pipeline.flush(
            &mut cpu.regs,
            4,
            0x0800_0000,
            [(0, Some(0x0800_0000)), (0x0800_0004, None)],
        );
        let (_, abort) = cpu.pipeline.advance(&mut cpu.regs, 4, (0x0800_0008, None));
        assert_eq!(abort, Some(0x0800_0000));
    }
}
