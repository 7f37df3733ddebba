//! Instruction dispatch loop (spec §4.3 "One step").
//!
//! `step` is the only entry point the scheduler (§5) calls into a core with.
//! It implements the per-instruction sequence verbatim: halt/WFI check,
//! pending IRQ/FIQ, pipeline refill or advance, prefetch-abort check, then
//! handler dispatch through the decoded ARM/THUMB table.

use crate::core::cpu::{memory, trap, Cpu};
use crate::isa::{arm, thumb, ExecCtx};
use crate::soc::arbiter::Arbiter;
use crate::soc::Soc;

/// Advances one core by a single instruction (or, while halted with no
/// pending interrupt, does nothing and returns immediately).
///
/// A core that wakes from `wait-for-interrupt` this call still consumes the
/// vector fetch in the same `step` — `check_and_enter_interrupt` already
/// queued the flush via `Cpu::request_flush`, and falling through to the
/// `pending_flush` branch below lets that fetch happen immediately rather
/// than wasting a whole extra scheduler turn on a no-op step.
pub fn step(cpu: &mut Cpu, soc: &mut Soc, arbiter: &mut Arbiter) {
    if cpu.halted {
        if !trap::check_and_enter_interrupt(cpu, arbiter) {
            return;
        }
    } else {
        trap::check_and_enter_interrupt(cpu, arbiter);
    }

    let step = cpu.step_size();

    if let Some(target) = cpu.pending_flush.take() {
        let fetch0 = memory::code_fetch(cpu, soc, arbiter, target, false);
        let fetch1 = memory::code_fetch(cpu, soc, arbiter, target.wrapping_add(step), true);
        cpu.pipeline.flush(&mut cpu.regs, step, target, [fetch0, fetch1]);
        return;
    }

    let fetch_addr = cpu.regs.pc();
    let next = memory::code_fetch(cpu, soc, arbiter, fetch_addr, true);
    let (opcode, abort) = cpu.pipeline.advance(&mut cpu.regs, step, next);

    if let Some(fault_addr) = abort {
        trap::trigger_prefetch_abort(cpu, fault_addr);
        return;
    }

    let is_thumb = cpu.cpsr.thumb();
    let mut ctx = ExecCtx { cpu, soc, arbiter, opcode };
    if is_thumb {
        thumb::dispatch(&mut ctx);
    } else {
        arm::dispatch(&mut ctx);
    }

    cpu.instructions_retired += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::cpu::CoreKind;

    fn fresh(kind: CoreKind) -> (Cpu, Soc, Arbiter) {
        let config = Config::default();
        let soc = Soc::new(vec![0u8; 0x1000], &config).expect("small rom accepted");
        (Cpu::new(kind), soc, Arbiter::new())
    }

    #[test]
    fn first_step_after_reset_performs_a_flush_not_an_advance() {
        let (mut cpu, mut soc, mut arbiter) = fresh(CoreKind::Arm9);
        cpu.request_flush(0x0200_0000);
        let pc_before = cpu.regs.pc();
        step(&mut cpu, &mut soc, &mut arbiter);
        assert_ne!(cpu.regs.pc(), pc_before);
        assert_eq!(cpu.regs.pc(), 0x0200_0008);
        assert_eq!(cpu.instructions_retired, 0);
    }

    #[test]
    fn halted_core_with_no_pending_interrupt_does_not_advance() {
        let (mut cpu, mut soc, mut arbiter) = fresh(CoreKind::Arm7);
        cpu.halted = true;
        let pc_before = cpu.regs.pc();
        step(&mut cpu, &mut soc, &mut arbiter);
        assert_eq!(cpu.regs.pc(), pc_before);
        assert_eq!(cpu.instructions_retired, 0);
    }

    #[test]
    fn halted_core_wakes_and_vectors_on_unmasked_irq() {
        let (mut cpu, mut soc, mut arbiter) = fresh(CoreKind::Arm9);
        cpu.halted = true;
        cpu.cpsr.set_irq_fiq_disabled(false, false);
        cpu.irq_line = true;
        step(&mut cpu, &mut soc, &mut arbiter);
        assert!(!cpu.halted);
        assert_eq!(cpu.cpsr.mode(), crate::core::arch::mode::Mode::Irq);
    }

    #[test]
    fn nop_like_fetch_of_zero_retires_as_an_instruction() {
        let (mut cpu, mut soc, mut arbiter) = fresh(CoreKind::Arm9);
        cpu.request_flush(0x0200_0000);
        step(&mut cpu, &mut soc, &mut arbiter);
        step(&mut cpu, &mut soc, &mut arbiter);
        assert_eq!(cpu.instructions_retired, 1);
    }
}
