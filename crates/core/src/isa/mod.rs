//! Instruction decoding: ARM and THUMB decode tables plus the small set of
//! helpers both share (spec §4.1 "C1 Instruction decoder tables").
//!
//! Each table is a flat array of function pointers built once via
//! [`std::sync::OnceLock`] and indexed directly by the bits the ARM/THUMB
//! encodings reserve for opcode classification, matching the "a constant
//! table built at startup" contract without literally generating the ~200
//! near-duplicate handler variants melonDS's macro expansion produces —
//! each handler here decodes its own addressing-mode fields from the
//! instruction word at call time instead.

/// ARM condition-code field decode/evaluation.
pub mod condition;

/// Decode-table entry metadata shared by the ARM and THUMB tables.
pub mod info;

/// The 4096-entry ARM decode table and its instruction-family handlers.
pub mod arm;

/// The 1024-entry THUMB decode table and its instruction-family handlers.
pub mod thumb;

use crate::core::cpu::Cpu;
use crate::soc::arbiter::Arbiter;
use crate::soc::Soc;

/// Everything an instruction handler needs: the executing core, the shared
/// SoC (bus, arbiter, collaborators), and the instruction word itself.
///
/// Bundled into one struct so a handler signature stays `fn(&mut ExecCtx)`
/// regardless of how many of these it actually touches, matching the
/// decode table's need for a single uniform function-pointer type.
pub struct ExecCtx<'a> {
    /// The core executing this instruction.
    pub cpu: &'a mut Cpu,
    /// The shared system-on-chip (bus, backup/cart/SD collaborators).
    pub soc: &'a mut Soc,
    /// The bus-contention arbiter.
    pub arbiter: &'a mut Arbiter,
    /// The full 32-bit (ARM) or 16-bit-in-low-half (THUMB) instruction word.
    pub opcode: u32,
}

/// Sign-extends the low `bits` bits of `value` to a full 32-bit signed value.
pub(crate) fn sign_extend(value: u32, bits: u32) -> u32 {
    let shift = 32 - bits;
    ((value << shift) as i32 >> shift) as u32
}

/// Iterates the set bit positions (0..16) of an `LDM`/`STM`/THUMB push-pop
/// register-list field, ascending.
pub(crate) fn register_list(list: u16) -> impl Iterator<Item = usize> {
    (0..16).filter(move |i| list & (1 << i) != 0)
}

/// Rotates a word read from a misaligned address, matching ARM's
/// `LDR`/`SWP` unaligned-read rule: the addressed word is fetched from the
/// aligned-down address, then rotated right by `8 * (addr & 3)` bits.
pub(crate) fn rotate_unaligned_word(value: u32, addr: u32) -> u32 {
    let rotate = (addr & 3) * 8;
    value.rotate_right(rotate)
}

/// Charges internal-only cycles beyond whatever `memory::code_fetch`/
/// `data_read`/`data_write` already billed for this instruction (spec §4.3:
/// handlers account for their own cost via `addCycles_CI`/`addCycles_CDI`
/// on top of the dispatch loop's `addCycles_C`/`addCycles_CD`). Used for
/// register-specified shift resolution, multiply early-termination, and the
/// atomic-swap stall — costs no read or write on its own carries.
pub(crate) fn charge_internal(ctx: &mut ExecCtx, cycles: u32) {
    let who = crate::core::cpu::memory::requester(ctx.cpu.kind);
    ctx.arbiter.charge_internal(who, cycles);
}

/// `MUL`/`MLA`/`UMULL`/`SMULL`/`UMLAL`/`SMLAL` internal cycles from the
/// multiplier operand's early-termination rule: one cycle if its top 24
/// bits are all one or all zero, two if its top 16 are, three if its top 8
/// are, four otherwise.
pub(crate) fn multiply_internal_cycles(multiplier: u32) -> u32 {
    if multiplier & 0xFFFF_FF00 == 0 || multiplier & 0xFFFF_FF00 == 0xFFFF_FF00 {
        1
    } else if multiplier & 0xFFFF_0000 == 0 || multiplier & 0xFFFF_0000 == 0xFFFF_0000 {
        2
    } else if multiplier & 0xFF00_0000 == 0 || multiplier & 0xFF00_0000 == 0xFF00_0000 {
        3
    } else {
        4
    }
}
