//! Exception vector entry.
//!
//! This module computes the mode, vector offset and link-register adjustment
//! for each synchronous [`CpuException`] and for IRQ/FIQ, and performs the
//! common "exception prologue" register-file bookkeeping. It performs the
//! following:
//! 1. **Vector mapping:** Converts a `CpuException` (or IRQ/FIQ) into a
//!    vector offset and destination mode.
//! 2. **Standardization:** A single entry point used by both ARM9 and ARM7
//!    dispatch so `core::cpu::execution::step` does not duplicate this logic.

use crate::common::constants;
use crate::common::error::CpuException;
use crate::core::arch::cpsr::Psr;
use crate::core::arch::gpr::Registers;
use crate::core::arch::mode::Mode;

/// Destination mode and vector offset for a control transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VectorEntry {
    /// Mode the core enters to handle this exception.
    pub mode: Mode,
    /// Offset from the active vector base (low or high, per CP15 control bit V).
    pub offset: u32,
    /// Link register adjustment: the value written to `LR` is
    /// `return_pc + lr_offset`, per ARM's per-exception return-address rules.
    pub lr_offset: i32,
}

/// Resolves a synchronous [`CpuException`] to its [`VectorEntry`].
pub fn exception_vector(exc: CpuException) -> VectorEntry {
    match exc {
        CpuException::Undefined => VectorEntry {
            mode: Mode::Und,
            offset: constants::VECTOR_UNDEFINED,
            lr_offset: 0,
        },
        CpuException::Swi { .. } => VectorEntry {
            mode: Mode::Svc,
            offset: constants::VECTOR_SWI,
            lr_offset: 0,
        },
        CpuException::PrefetchAbort { .. } => VectorEntry {
            mode: Mode::Abt,
            offset: constants::VECTOR_PREFETCH_ABORT,
            lr_offset: 4,
        },
        CpuException::DataAbort { .. } => VectorEntry {
            mode: Mode::Abt,
            offset: constants::VECTOR_DATA_ABORT,
            lr_offset: 8,
        },
    }
}

/// Vector entry for a maskable IRQ.
pub fn irq_vector() -> VectorEntry {
    VectorEntry {
        mode: Mode::Irq,
        offset: constants::VECTOR_IRQ,
        lr_offset: 4,
    }
}

/// Vector entry for FIQ.
pub fn fiq_vector() -> VectorEntry {
    VectorEntry {
        mode: Mode::Fiq,
        offset: constants::VECTOR_FIQ,
        lr_offset: 4,
    }
}

/// Performs the common exception-entry register bookkeeping: banks into the
/// target mode, saves the outgoing CPSR to the new mode's SPSR, sets the
/// link register from `return_pc` and `entry.lr_offset`, switches to ARM
/// state, and masks IRQs (additionally masking FIQs when entering Reset/FIQ).
///
/// Returns the new CPSR value; the caller is responsible for setting the PC
/// to `vector_base + entry.offset`.
pub fn enter_exception(
    regs: &mut Registers,
    cpsr: &mut Psr,
    entry: VectorEntry,
    return_pc: u32,
) -> Psr {
    let old_cpsr = *cpsr;
    let old_mode = cpsr.mode();

    regs.switch_mode(old_mode, entry.mode);
    regs.write_spsr(entry.mode, old_cpsr.bits());
    regs.write(crate::core::arch::gpr::LR, return_pc.wrapping_add_signed(entry.lr_offset));

    cpsr.set_mode(entry.mode);
    cpsr.set_thumb(false);
    let mask_fiq = matches!(entry.mode, Mode::Fiq);
    cpsr.set_irq_fiq_disabled(true, mask_fiq || old_cpsr.fiq_disabled());

    *cpsr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_abort_adjusts_lr_by_eight() {
        let mut regs = Registers::new();
        let mut cpsr = Psr::reset();
        let entry = exception_vector(CpuException::DataAbort { addr: 0 });
        enter_exception(&mut regs, &mut cpsr, entry, 0x1000);
        assert_eq!(regs.read(crate::core::arch::gpr::LR), 0x1008);
        assert_eq!(cpsr.mode(), Mode::Abt);
    }

    #[test]
    fn entering_fiq_masks_fiq_too() {
        let mut regs = Registers::new();
        let mut cpsr = Psr::reset();
        cpsr.set_irq_fiq_disabled(false, false);
        enter_exception(&mut regs, &mut cpsr, fiq_vector(), 0x100);
        assert!(cpsr.fiq_disabled());
        assert!(cpsr.irq_disabled());
    }
}
