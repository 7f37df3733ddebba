//! Exception triggering: wires `core::arch::trap`'s vector/prologue logic
//! into a live [`Cpu`], and owns the dispatch loop's IRQ/FIQ poll (spec §4.3
//! step 2, §4.7/§7 error taxonomy).
//!
//! Every function here ends in a [`Cpu::request_flush`] to the resolved
//! vector address rather than touching the pipeline directly, so exception
//! entry goes through the same refetch path as an ordinary branch.

use crate::common::constants::{VECTOR_BASE_HIGH, VECTOR_BASE_LOW};
use crate::common::error::CpuException;
use crate::core::arch::trap::{enter_exception, exception_vector, fiq_vector, irq_vector, VectorEntry};
use crate::core::cpu::{Cpu, CoreKind};
use crate::soc::arbiter::{Arbiter, Requester};

/// Maps a core's kind to its arbiter requester identity.
fn requester_for(kind: CoreKind) -> Requester {
    match kind {
        CoreKind::Arm9 => Requester::Arm9,
        CoreKind::Arm7 => Requester::Arm7,
    }
}

/// The other core's requester identity, for reading "the scheduler's
/// current global time" as the other core's timestamp.
fn other_requester(who: Requester) -> Requester {
    match who {
        Requester::Arm9 => Requester::Arm7,
        Requester::Arm7 => Requester::Arm9,
        Requester::Dma => Requester::Dma,
    }
}

/// The vector base currently in effect (CP15 control bit `V`; always low on
/// the ARM7, which has no CP15).
fn vector_base(cpu: &Cpu) -> u32 {
    let high = cpu.cp15.as_ref().is_some_and(|c| c.control.high_vectors);
    if high {
        VECTOR_BASE_HIGH
    } else {
        VECTOR_BASE_LOW
    }
}

/// Address of the instruction currently executing, derived from the
/// pipeline's "PC reads as current + 2 steps" convention.
fn instruction_addr(cpu: &Cpu) -> u32 {
    let step = if cpu.cpsr.thumb() { 2 } else { 4 };
    cpu.regs.pc().wrapping_sub(step * 2)
}

/// Performs the shared exception-entry bookkeeping and requests a flush to
/// the resolved vector.
fn enter(cpu: &mut Cpu, entry: VectorEntry, return_pc: u32) {
    let base = vector_base(cpu);
    let new_cpsr = enter_exception(&mut cpu.regs, &mut cpu.cpsr, entry, return_pc);
    cpu.cpsr = new_cpsr;
    cpu.request_flush(base.wrapping_add(entry.offset));
}

/// Dispatches a synchronous [`CpuException`] raised from inside the current
/// instruction's handler (undefined opcode, `SWI`, coprocessor rejection).
/// The current instruction's destination register must not have been
/// written yet when this is called; callers return immediately afterward.
pub fn dispatch(cpu: &mut Cpu, exc: CpuException) {
    let entry = exception_vector(exc);
    let addr = instruction_addr(cpu);
    let step = if cpu.cpsr.thumb() { 2 } else { 4 };
    // Undefined/SWI resume at the instruction after the faulting one;
    // prefetch/data abort resume at the faulting instruction itself (entry's
    // `lr_offset` already accounts for the +4/+8 retry adjustment from there).
    let return_pc = match exc {
        CpuException::Undefined | CpuException::Swi { .. } => addr.wrapping_add(step),
        CpuException::PrefetchAbort { .. } | CpuException::DataAbort { .. } => addr,
    };
    enter(cpu, entry, return_pc);
}

/// Raises a data abort for a data access to `fault_addr` denied by CP15.
pub fn trigger_data_abort(cpu: &mut Cpu, fault_addr: u32) {
    dispatch(cpu, CpuException::DataAbort { addr: fault_addr });
}

/// Raises a prefetch abort. Called once the pipeline slot carrying
/// `fault_addr`'s abort marker reaches execution, per spec §7 ("raised one
/// instruction later").
pub fn trigger_prefetch_abort(cpu: &mut Cpu, fault_addr: u32) {
    dispatch(cpu, CpuException::PrefetchAbort { addr: fault_addr });
}

/// Raises `SWI` with `comment` (the low 24 (ARM) or 8 (THUMB) bits of the
/// instruction, per the decoded instruction's immediate field).
pub fn trigger_swi(cpu: &mut Cpu, comment: u32) {
    dispatch(cpu, CpuException::Swi { comment });
}

/// Enters IRQ mode for a pending, unmasked interrupt request. Unlike
/// [`dispatch`], this is not raised from inside an instruction handler: it
/// preempts the *next* instruction, so `return_pc` is simply the address of
/// that next instruction (the pipeline's current PC minus one step, since
/// the instruction that just retired already advanced PC by one step).
pub fn trigger_irq(cpu: &mut Cpu) {
    let step = if cpu.cpsr.thumb() { 2 } else { 4 };
    let return_pc = cpu.regs.pc().wrapping_sub(step);
    enter(cpu, irq_vector(), return_pc);
}

/// Enters FIQ mode for a pending, unmasked fast interrupt request.
pub fn trigger_fiq(cpu: &mut Cpu) {
    let step = if cpu.cpsr.thumb() { 2 } else { 4 };
    let return_pc = cpu.regs.pc().wrapping_sub(step);
    enter(cpu, fiq_vector(), return_pc);
}

/// Returns `true` if an unmasked IRQ or FIQ is pending, and dispatches it
/// (FIQ takes priority over IRQ when both are pending and unmasked).
/// Called once per dispatch-loop iteration, before fetch, per spec §4.3
/// step 2 ("check pending IRQ/FIQ against the I/F mask bits before the next
/// fetch").
///
/// A core waking from `wait-for-interrupt` here has its arbiter timestamp
/// advanced to the scheduler's current global time (spec §9 Open Question:
/// decided as "current scheduler time", not the IRQ's own latch time, so a
/// long-halted core can't win future bus arbitrations on a stale clock).
pub fn check_and_enter_interrupt(cpu: &mut Cpu, arbiter: &mut Arbiter) -> bool {
    let was_halted = cpu.halted;

    let entered = if cpu.fiq_line && !cpu.cpsr.fiq_disabled() {
        trigger_fiq(cpu);
        cpu.halted = false;
        true
    } else if cpu.irq_line && !cpu.cpsr.irq_disabled() {
        trigger_irq(cpu);
        cpu.halted = false;
        true
    } else {
        false
    };

    if entered && was_halted {
        let who = requester_for(cpu.kind);
        let now = arbiter.current_time(who).max(arbiter.current_time(other_requester(who)));
        arbiter.set_time(who, now);
    }

    entered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cpu::CoreKind;

    #[test]
    fn undefined_resumes_after_the_faulting_instruction() {
        let mut cpu = Cpu::new(CoreKind::Arm9);
        cpu.regs.set_pc(0x1008); // executing instruction at 0x1000 (ARM: PC = addr+8)
        dispatch(&mut cpu, CpuException::Undefined);
        assert_eq!(cpu.regs.read(crate::core::arch::gpr::LR), 0x1004);
        assert_eq!(cpu.cpsr.mode(), crate::core::arch::mode::Mode::Und);
    }

    #[test]
    fn data_abort_resumes_at_the_faulting_instruction_for_retry() {
        let mut cpu = Cpu::new(CoreKind::Arm9);
        cpu.regs.set_pc(0x1008);
        trigger_data_abort(&mut cpu, 0x0200_0000);
        assert_eq!(cpu.regs.read(crate::core::arch::gpr::LR), 0x1008);
    }

    #[test]
    fn fiq_masks_both_irq_and_fiq_on_entry() {
        let mut cpu = Cpu::new(CoreKind::Arm9);
        let mut arbiter = Arbiter::new();
        cpu.cpsr.set_irq_fiq_disabled(false, false);
        cpu.fiq_line = true;
        cpu.halted = true;
        assert!(check_and_enter_interrupt(&mut cpu, &mut arbiter));
        assert!(cpu.cpsr.irq_disabled());
        assert!(cpu.cpsr.fiq_disabled());
        assert!(!cpu.halted);
    }

    #[test]
    fn masked_irq_line_does_not_enter() {
        let mut cpu = Cpu::new(CoreKind::Arm9);
        let mut arbiter = Arbiter::new();
        cpu.irq_line = true; // IRQ disabled by reset default
        assert!(!check_and_enter_interrupt(&mut cpu, &mut arbiter));
    }

    #[test]
    fn waking_a_halted_core_catches_its_timestamp_up_to_the_other_cores() {
        let mut cpu = Cpu::new(CoreKind::Arm9);
        let mut arbiter = Arbiter::new();
        arbiter.set_time(Requester::Arm7, 500);
        cpu.cpsr.set_irq_fiq_disabled(false, false);
        cpu.irq_line = true;
        cpu.halted = true;
        assert!(check_and_enter_interrupt(&mut cpu, &mut arbiter));
        assert_eq!(arbiter.current_time(Requester::Arm9), 500);
    }
}
