//! The 4096-entry ARM decode table and its instruction-family handlers
//! (spec §4.1 "C1 Instruction decoder tables", §4.3 "C3 interpreter
//! dispatch loop").
//!
//! The table is indexed by `bits[27:20] << 4 | bits[7:4]`, the 12 bits the
//! ARM encoding reserves for opcode classification; every other field
//! (register numbers, immediates, shift amounts) is decoded by the handler
//! itself from the full instruction word at call time, per this module's
//! parent doc comment. Classification follows the standard ARM decode
//! flowchart: the top-level split on bits[27:26], then `bits[7:4]` and the
//! "comparison opcode with `S` clear is reserved for PSR transfer" rule
//! that also carries `BX`/`BLX`/`CLZ`/the saturating-arithmetic family.

use std::sync::OnceLock;

use crate::common::AccessWidth;
use crate::core::arch::cpsr::Psr;
use crate::core::arch::gpr::{LR, PC};
use crate::core::arch::mode::Mode;
use crate::core::cpu::memory;
use crate::core::cpu::trap;
use crate::core::units::alu::{evaluate, logic, shift, DataProcessingOp, ShiftKind};
use crate::isa::condition::ConditionCode;
use crate::isa::info::{DecodedInfo, FlagMask, OpKind, SpecialKind};
use crate::isa::{charge_internal, multiply_internal_cycles, register_list, rotate_unaligned_word, sign_extend, ExecCtx};

/// One decode-table slot: the handler to invoke and its static info record.
pub struct ArmEntry {
    /// The instruction-family handler this slot routes to.
    pub handler: fn(&mut ExecCtx),
    /// Classification metadata for this slot (spec §4.1).
    pub info: DecodedInfo,
}

const TABLE_LEN: usize = 1 << 12;

static TABLE: OnceLock<Vec<ArmEntry>> = OnceLock::new();

fn table() -> &'static [ArmEntry] {
    TABLE.get_or_init(|| (0..TABLE_LEN).map(build_entry).collect())
}

/// Computes this instruction word's table index (`bits[27:20] << 4 |
/// bits[7:4]`).
fn index_of(opcode: u32) -> usize {
    ((((opcode >> 20) & 0xFF) << 4) | ((opcode >> 4) & 0xF)) as usize
}

/// Looks up the decode-table entry for `opcode` (built once on first call).
pub fn decode(opcode: u32) -> &'static ArmEntry {
    &table()[index_of(opcode)]
}

/// Decodes and executes one ARM instruction word, per spec §4.3 step 4
/// ("evaluate the condition field; if it fails, the instruction retires
/// with no further effect") and the ARMv5 unconditional-extension-space
/// rule ("condition `0b1111` on a `B`/`BL`-shaped opcode is `BLX`
/// (immediate), evaluated unconditionally, bypassing the condition field
/// entirely").
pub fn dispatch(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let cond_bits = (opcode >> 28) & 0xF;
    if cond_bits == 0xF && (opcode >> 25) & 0b111 == 0b101 && ctx.cpu.kind.is_armv5() {
        blx_immediate(ctx);
        return;
    }
    if !ConditionCode::from_bits(cond_bits).evaluate(ctx.cpu.cpsr) {
        return;
    }
    let entry = decode(opcode);
    (entry.handler)(ctx);
}

// --- Classification -------------------------------------------------------

fn build_entry(index: usize) -> ArmEntry {
    let hi8 = ((index >> 4) & 0xFF) as u32;
    let lo4 = (index & 0xF) as u32;
    let bit27 = (hi8 >> 7) & 1;
    let bit26 = (hi8 >> 6) & 1;
    let bit25 = (hi8 >> 5) & 1;

    let (handler, kind) = match (bit27, bit26) {
        (0, 0) => classify_data_processing_space(hi8, lo4, bit25),
        (0, 1) => {
            if bit25 == 1 && lo4 & 1 == 1 {
                (undefined_instruction as fn(&mut ExecCtx), OpKind::Undefined)
            } else {
                (single_data_transfer as fn(&mut ExecCtx), OpKind::SingleDataTransfer)
            }
        }
        (1, 0) => {
            if bit25 == 0 {
                (block_data_transfer as fn(&mut ExecCtx), OpKind::BlockDataTransfer)
            } else {
                (branch as fn(&mut ExecCtx), OpKind::Branch)
            }
        }
        _ => classify_coprocessor_space(hi8, bit25),
    };

    ArmEntry { handler, info: generic_info(kind, hi8) }
}

fn classify_data_processing_space(hi8: u32, lo4: u32, bit25: u32) -> (fn(&mut ExecCtx), OpKind) {
    let opcode4 = (hi8 >> 1) & 0xF;
    let s = hi8 & 1;
    let is_reserved_compare = s == 0 && (8..=11).contains(&opcode4);

    if bit25 == 1 {
        if is_reserved_compare {
            return (psr_transfer as fn(&mut ExecCtx), OpKind::PsrTransfer);
        }
        return (data_processing as fn(&mut ExecCtx), OpKind::DataProcessing);
    }

    if lo4 == 0b1001 {
        return classify_multiply_swap(hi8);
    }
    if lo4 & 0b1001 == 0b1001 {
        // bit7=1 and bit4=1: halfword/signed transfer family.
        return (halfword_transfer as fn(&mut ExecCtx), OpKind::HalfwordTransfer);
    }

    let bit4 = lo4 & 1;
    if bit4 == 0 {
        if is_reserved_compare {
            (psr_transfer as fn(&mut ExecCtx), OpKind::PsrTransfer)
        } else {
            (data_processing as fn(&mut ExecCtx), OpKind::DataProcessing)
        }
    } else if is_reserved_compare {
        classify_misc(hi8, lo4)
    } else {
        (data_processing as fn(&mut ExecCtx), OpKind::DataProcessing)
    }
}

fn classify_multiply_swap(hi8: u32) -> (fn(&mut ExecCtx), OpKind) {
    let bit24 = (hi8 >> 4) & 1;
    let bit23 = (hi8 >> 3) & 1;
    let bit20 = hi8 & 1;
    match (bit24, bit23) {
        (0, 0) => (multiply as fn(&mut ExecCtx), OpKind::Multiply),
        (0, 1) => (multiply_long as fn(&mut ExecCtx), OpKind::Multiply),
        (1, 0) if bit20 == 0 => (swap as fn(&mut ExecCtx), OpKind::Swap),
        _ => (undefined_instruction as fn(&mut ExecCtx), OpKind::Undefined),
    }
}

/// `BX`/`BLX`(reg)/`CLZ`/the `QADD` family all live in the `bits[27:23] ==
/// 00010` register-shift-by-register encoding space, distinguished by the
/// exact `(bits[27:20], bits[7:4])` pair (spec §4.1 "ARMv5TE extensions").
fn classify_misc(hi8: u32, lo4: u32) -> (fn(&mut ExecCtx), OpKind) {
    match (hi8, lo4) {
        (0x12, 0b0001) | (0x12, 0b0010) => (branch_exchange as fn(&mut ExecCtx), OpKind::Branch),
        (0x12, 0b0011) => (branch_exchange_link as fn(&mut ExecCtx), OpKind::Branch),
        (0x16, 0b0001) => (clz as fn(&mut ExecCtx), OpKind::ArmV5Extension),
        (0x10..=0x13, 0b0101) => (saturating_arith as fn(&mut ExecCtx), OpKind::ArmV5Extension),
        _ => (undefined_instruction as fn(&mut ExecCtx), OpKind::Undefined),
    }
}

fn classify_coprocessor_space(hi8: u32, bit25: u32) -> (fn(&mut ExecCtx), OpKind) {
    if bit25 == 1 {
        return (software_interrupt as fn(&mut ExecCtx), OpKind::SoftwareInterrupt);
    }
    let bit24 = (hi8 >> 4) & 1;
    let bit23 = (hi8 >> 3) & 1;
    let bit22 = (hi8 >> 2) & 1;
    let bit21 = (hi8 >> 1) & 1;
    if bit24 == 1 && bit23 == 1 && bit22 == 1 && bit21 == 0 {
        (coprocessor_register_transfer as fn(&mut ExecCtx), OpKind::Coprocessor)
    } else if bit24 == 1 && bit23 == 1 && bit22 == 1 && bit21 == 1 {
        (cdp as fn(&mut ExecCtx), OpKind::Coprocessor)
    } else {
        (ldc_stc as fn(&mut ExecCtx), OpKind::Coprocessor)
    }
}

fn generic_info(kind: OpKind, hi8: u32) -> DecodedInfo {
    // Registers aren't resolvable from the table index alone (only
    // `bits[27:20]`/`bits[7:4]` are); masks below are deliberately
    // conservative ("could touch any register"), matching this table's
    // role as a dispatch/classification aid rather than an exact
    // per-instruction dataflow record.
    match kind {
        OpKind::Undefined => DecodedInfo::UNDEFINED,
        OpKind::Branch | OpKind::SoftwareInterrupt => DecodedInfo {
            opcode_kind: kind,
            src_mask: 0xFFFF,
            dst_mask: 0,
            flag_read: FlagMask::empty(),
            flag_write: FlagMask::empty(),
            end_of_block: true,
            special_kind: SpecialKind::None,
        },
        OpKind::SingleDataTransfer | OpKind::HalfwordTransfer => {
            let is_load = hi8 & 1 != 0;
            DecodedInfo {
                opcode_kind: kind,
                src_mask: 0xFFFF,
                dst_mask: 0xFFFF,
                flag_read: FlagMask::empty(),
                flag_write: FlagMask::empty(),
                end_of_block: false,
                special_kind: if is_load { SpecialKind::MemoryRead } else { SpecialKind::MemoryWrite },
            }
        }
        OpKind::DataProcessing | OpKind::PsrTransfer | OpKind::ArmV5Extension => DecodedInfo {
            opcode_kind: kind,
            src_mask: 0xFFFF,
            dst_mask: 0xFFFF,
            flag_read: FlagMask::C,
            flag_write: FlagMask::all(),
            end_of_block: false,
            special_kind: SpecialKind::None,
        },
        _ => DecodedInfo {
            opcode_kind: kind,
            src_mask: 0xFFFF,
            dst_mask: 0xFFFF,
            flag_read: FlagMask::empty(),
            flag_write: FlagMask::empty(),
            end_of_block: false,
            special_kind: SpecialKind::None,
        },
    }
}

// --- Shared helpers ---------------------------------------------------------

/// Reads `idx` the way an operand-2 `Rm` read does: `PC` reads as
/// current-instruction-address + 12 when the shift amount comes from a
/// register, rather than the usual +8, matching the extra internal cycle
/// real hardware takes to resolve a register-specified shift amount.
fn read_shifted_operand(ctx: &ExecCtx, idx: usize, register_shift: bool) -> u32 {
    if idx == PC && register_shift {
        ctx.cpu.regs.pc().wrapping_add(4)
    } else {
        ctx.cpu.regs.read(idx)
    }
}

/// Applies an ARMv5-aware interworking branch to `target`: on the ARM9,
/// `target`'s bit 0 selects THUMB state; on the ARM7 (no BX/interworking
/// instructions reach this path except the ones explicitly marked ARMv5),
/// the target is simply word-aligned.
fn interworking_branch(ctx: &mut ExecCtx, target: u32) {
    if ctx.cpu.kind.is_armv5() {
        let thumb = target & 1 != 0;
        ctx.cpu.cpsr.set_thumb(thumb);
        ctx.cpu.request_flush(if thumb { target & !1 } else { target & !3 });
    } else {
        ctx.cpu.request_flush(target & !3);
    }
}

/// Restores CPSR from the current mode's SPSR (exception return idiom:
/// `MOVS pc, lr`, `LDM ... {pc}^`), banking registers to match the
/// restored mode before the caller writes `PC`.
fn restore_cpsr_from_spsr(ctx: &mut ExecCtx) {
    let mode = ctx.cpu.cpsr.mode();
    if !mode.has_spsr() {
        return;
    }
    let spsr = ctx.cpu.regs.read_spsr(mode);
    let new_mode = Mode::from_bits(spsr);
    if new_mode != mode {
        ctx.cpu.regs.switch_mode(mode, new_mode);
    }
    ctx.cpu.cpsr = Psr::from_bits(spsr);
}

// --- Data processing --------------------------------------------------------

fn data_processing(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let op = DataProcessingOp::from_bits(opcode >> 21);
    let s = opcode & (1 << 20) != 0;
    let rn = ((opcode >> 16) & 0xF) as usize;
    let rd = ((opcode >> 12) & 0xF) as usize;
    let carry_in = ctx.cpu.cpsr.c();

    let (op2, shifter_carry) = if opcode & (1 << 25) != 0 {
        let rotate = ((opcode >> 8) & 0xF) * 2;
        let value = (opcode & 0xFF).rotate_right(rotate);
        let carry = if rotate == 0 { carry_in } else { value & 0x8000_0000 != 0 };
        (value, carry)
    } else {
        let rm = (opcode & 0xF) as usize;
        let register_shift = opcode & (1 << 4) != 0;
        let rm_value = read_shifted_operand(ctx, rm, register_shift);
        let shift_kind = ShiftKind::from_bits(opcode >> 5);
        let amount = if register_shift {
            charge_internal(ctx, 1);
            ctx.cpu.regs.read(((opcode >> 8) & 0xF) as usize) & 0xFF
        } else {
            (opcode >> 7) & 0x1F
        };
        shift(shift_kind, rm_value, amount, carry_in, !register_shift)
    };

    let op1 = ctx.cpu.regs.read(rn);
    let prev_v = ctx.cpu.cpsr.v();
    let (result, flags) = evaluate(op, op1, op2, shifter_carry, prev_v);

    if op.is_comparison() {
        ctx.cpu.cpsr.set_nzcv(flags.n, flags.z, flags.c, flags.v);
        return;
    }

    if rd == PC {
        if s {
            restore_cpsr_from_spsr(ctx);
        }
        interworking_branch(ctx, result);
    } else {
        ctx.cpu.regs.write(rd, result);
        if s {
            ctx.cpu.cpsr.set_nzcv(flags.n, flags.z, flags.c, flags.v);
        }
    }
}

// --- Multiply family ---------------------------------------------------------

fn multiply(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let accumulate = opcode & (1 << 21) != 0;
    let s = opcode & (1 << 20) != 0;
    let rd = ((opcode >> 16) & 0xF) as usize;
    let rn = ((opcode >> 12) & 0xF) as usize;
    let rs = ((opcode >> 8) & 0xF) as usize;
    let rm = (opcode & 0xF) as usize;

    let rs_value = ctx.cpu.regs.read(rs);
    charge_internal(ctx, multiply_internal_cycles(rs_value) + u32::from(accumulate));
    let mut result = ctx.cpu.regs.read(rm).wrapping_mul(rs_value);
    if accumulate {
        result = result.wrapping_add(ctx.cpu.regs.read(rn));
    }
    ctx.cpu.regs.write(rd, result);
    if s {
        let (n, z) = logic::nz_flags(result);
        ctx.cpu.cpsr.set_nzcv(n, z, ctx.cpu.cpsr.c(), ctx.cpu.cpsr.v());
    }
}

fn multiply_long(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let signed = opcode & (1 << 22) != 0;
    let accumulate = opcode & (1 << 21) != 0;
    let s = opcode & (1 << 20) != 0;
    let rd_hi = ((opcode >> 16) & 0xF) as usize;
    let rd_lo = ((opcode >> 12) & 0xF) as usize;
    let rs = ((opcode >> 8) & 0xF) as usize;
    let rm = (opcode & 0xF) as usize;

    let rm_v = ctx.cpu.regs.read(rm);
    let rs_v = ctx.cpu.regs.read(rs);
    charge_internal(ctx, multiply_internal_cycles(rs_v) + 1 + u32::from(accumulate));
    let mut result: u64 = if signed {
        (i64::from(rm_v as i32) * i64::from(rs_v as i32)) as u64
    } else {
        u64::from(rm_v) * u64::from(rs_v)
    };
    if accumulate {
        let acc = (u64::from(ctx.cpu.regs.read(rd_hi)) << 32) | u64::from(ctx.cpu.regs.read(rd_lo));
        result = result.wrapping_add(acc);
    }
    ctx.cpu.regs.write(rd_lo, result as u32);
    ctx.cpu.regs.write(rd_hi, (result >> 32) as u32);
    if s {
        ctx.cpu.cpsr.set_nzcv(result & 0x8000_0000_0000_0000 != 0, result == 0, ctx.cpu.cpsr.c(), ctx.cpu.cpsr.v());
    }
}

fn swap(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let byte = opcode & (1 << 22) != 0;
    let rn = ((opcode >> 16) & 0xF) as usize;
    let rd = ((opcode >> 12) & 0xF) as usize;
    let rm = (opcode & 0xF) as usize;
    let addr = ctx.cpu.regs.read(rn);
    let width = if byte { AccessWidth::Byte } else { AccessWidth::Word };
    charge_internal(ctx, 1);

    let raw = memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, addr, width, false);
    let loaded = if byte { raw } else { rotate_unaligned_word(raw, addr) };
    let rm_value = ctx.cpu.regs.read(rm);
    memory::data_write(ctx.cpu, ctx.soc, ctx.arbiter, addr, width, rm_value, false);
    ctx.cpu.regs.write(rd, loaded);
}

// --- Single data transfer ----------------------------------------------------

fn single_data_transfer(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let register_offset = opcode & (1 << 25) != 0;
    let pre_indexed = opcode & (1 << 24) != 0;
    let add = opcode & (1 << 23) != 0;
    let byte = opcode & (1 << 22) != 0;
    let writeback = opcode & (1 << 21) != 0;
    let load = opcode & (1 << 20) != 0;
    let rn = ((opcode >> 16) & 0xF) as usize;
    let rd = ((opcode >> 12) & 0xF) as usize;

    let offset = if register_offset {
        let rm = (opcode & 0xF) as usize;
        let shift_kind = ShiftKind::from_bits(opcode >> 5);
        let amount = (opcode >> 7) & 0x1F;
        let carry_in = ctx.cpu.cpsr.c();
        shift(shift_kind, ctx.cpu.regs.read(rm), amount, carry_in, true).0
    } else {
        opcode & 0xFFF
    };

    let base = ctx.cpu.regs.read(rn);
    let offset_addr = if add { base.wrapping_add(offset) } else { base.wrapping_sub(offset) };
    let transfer_addr = if pre_indexed { offset_addr } else { base };
    let width = if byte { AccessWidth::Byte } else { AccessWidth::Word };

    if load {
        let raw = memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, transfer_addr, width, false);
        let value = if byte { raw } else { rotate_unaligned_word(raw, transfer_addr) };
        if !pre_indexed || writeback {
            ctx.cpu.regs.write(rn, offset_addr);
        }
        if rd == PC {
            interworking_branch(ctx, value);
        } else {
            ctx.cpu.regs.write(rd, value);
        }
    } else {
        // A stored `r15` reads as current-instruction-address + 12 (the
        // register file already yields +8 via the pipeline convention).
        let value = ctx.cpu.regs.read(rd).wrapping_add(if rd == PC { 4 } else { 0 });
        memory::data_write(ctx.cpu, ctx.soc, ctx.arbiter, transfer_addr, width, value, false);
        if !pre_indexed || writeback {
            ctx.cpu.regs.write(rn, offset_addr);
        }
    }
}

// --- Halfword / signed transfer ----------------------------------------------

fn halfword_transfer(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let pre_indexed = opcode & (1 << 24) != 0;
    let add = opcode & (1 << 23) != 0;
    let immediate = opcode & (1 << 22) != 0;
    let writeback = opcode & (1 << 21) != 0;
    let load = opcode & (1 << 20) != 0;
    let signed = opcode & (1 << 6) != 0;
    let half = opcode & (1 << 5) != 0;
    let rn = ((opcode >> 16) & 0xF) as usize;
    let rd = ((opcode >> 12) & 0xF) as usize;

    let offset = if immediate {
        (((opcode >> 8) & 0xF) << 4) | (opcode & 0xF)
    } else {
        let rm = (opcode & 0xF) as usize;
        ctx.cpu.regs.read(rm)
    };

    let base = ctx.cpu.regs.read(rn);
    let offset_addr = if add { base.wrapping_add(offset) } else { base.wrapping_sub(offset) };
    let transfer_addr = if pre_indexed { offset_addr } else { base };

    if load {
        let value = match (signed, half) {
            (false, true) => memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, transfer_addr, AccessWidth::Half, false),
            (true, false) => {
                let raw = memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, transfer_addr, AccessWidth::Byte, false);
                sign_extend(raw, 8)
            }
            (true, true) => {
                let raw = memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, transfer_addr, AccessWidth::Half, false);
                sign_extend(raw, 16)
            }
            (false, false) => unreachable!("S=0,H=0 decodes to the multiply/swap family instead"),
        };
        ctx.cpu.regs.write(rd, value);
    } else if signed || !half {
        memory::undefined(ctx.cpu);
        return;
    } else {
        let value = ctx.cpu.regs.read(rd);
        memory::data_write(ctx.cpu, ctx.soc, ctx.arbiter, transfer_addr, AccessWidth::Half, value, false);
    }

    if !pre_indexed || writeback {
        ctx.cpu.regs.write(rn, offset_addr);
    }
}

// --- Block data transfer ------------------------------------------------------

fn block_data_transfer(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let pre_indexed = opcode & (1 << 24) != 0;
    let add = opcode & (1 << 23) != 0;
    let s_bit = opcode & (1 << 22) != 0;
    let writeback = opcode & (1 << 21) != 0;
    let load = opcode & (1 << 20) != 0;
    let rn = ((opcode >> 16) & 0xF) as usize;
    let list = (opcode & 0xFFFF) as u16;
    let pc_in_list = list & (1 << 15) != 0;
    let base = ctx.cpu.regs.read(rn);
    let count = u32::try_from(register_list(list).count()).unwrap_or(0).max(1);

    let (start_addr, new_base) = match (pre_indexed, add) {
        (false, true) => (base, base.wrapping_add(count * 4)),
        (true, true) => (base.wrapping_add(4), base.wrapping_add(count * 4)),
        (false, false) => (base.wrapping_sub(count * 4).wrapping_add(4), base.wrapping_sub(count * 4)),
        (true, false) => (base.wrapping_sub(count * 4), base.wrapping_sub(count * 4)),
    };

    if writeback {
        ctx.cpu.regs.write(rn, new_base);
    }

    // S-bit with a load that doesn't include `PC` means "transfer the
    // user-mode banked registers" instead of the current mode's.
    let user_bank = s_bit && !(load && pc_in_list);

    let mut addr = start_addr;
    for reg in register_list(list) {
        if load {
            let value = memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Word, addr != start_addr);
            if reg == PC {
                if s_bit {
                    restore_cpsr_from_spsr(ctx);
                }
                if s_bit {
                    ctx.cpu.request_flush(value & if ctx.cpu.cpsr.thumb() { !1 } else { !3 });
                } else {
                    interworking_branch(ctx, value);
                }
            } else if user_bank {
                ctx.cpu.regs.write_user(reg, value);
            } else {
                ctx.cpu.regs.write(reg, value);
            }
        } else {
            // Spec §8 boundary behaviour: "STM with base register in the
            // list: first store of the base uses the pre-writeback value."
            // `base` was captured before the writeback above ran, so use it
            // directly rather than re-reading `rn` (which by now holds
            // `new_base`).
            let value = if reg == rn {
                base
            } else if user_bank {
                ctx.cpu.regs.read_user(reg)
            } else {
                ctx.cpu.regs.read(reg)
            }
            .wrapping_add(if reg == PC { 4 } else { 0 });
            memory::data_write(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Word, value, addr != start_addr);
        }
        addr = addr.wrapping_add(4);
    }
}

// --- Branch family -------------------------------------------------------------

fn branch(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let link = opcode & (1 << 24) != 0;
    let offset = sign_extend(opcode & 0x00FF_FFFF, 24) << 2;
    let pc = ctx.cpu.regs.pc();
    if link {
        ctx.cpu.regs.write(LR, pc.wrapping_sub(4));
    }
    ctx.cpu.request_flush(pc.wrapping_add(offset));
}

/// `BLX` (immediate, unconditional-extension-space form): reached only from
/// [`dispatch`]'s condition-`0b1111` special case, never through the decode
/// table (its condition field isn't a real condition, so it can't be
/// routed through the ordinary per-opcode table lookup).
fn blx_immediate(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let h = (opcode >> 24) & 1;
    let offset = (sign_extend(opcode & 0x00FF_FFFF, 24) << 2).wrapping_add(h * 2);
    let pc = ctx.cpu.regs.pc();
    ctx.cpu.regs.write(LR, pc.wrapping_sub(4));
    ctx.cpu.cpsr.set_thumb(true);
    ctx.cpu.request_flush(pc.wrapping_add(offset));
}

fn branch_exchange(ctx: &mut ExecCtx) {
    let rm = (ctx.opcode & 0xF) as usize;
    let target = ctx.cpu.regs.read(rm);
    interworking_branch(ctx, target);
}

fn branch_exchange_link(ctx: &mut ExecCtx) {
    if !ctx.cpu.kind.is_armv5() {
        memory::undefined(ctx.cpu);
        return;
    }
    let rm = (ctx.opcode & 0xF) as usize;
    let target = ctx.cpu.regs.read(rm);
    let return_addr = ctx.cpu.regs.pc().wrapping_sub(4);
    ctx.cpu.regs.write(LR, return_addr);
    interworking_branch(ctx, target);
}

fn software_interrupt(ctx: &mut ExecCtx) {
    let comment = ctx.opcode & 0x00FF_FFFF;
    trap::trigger_swi(ctx.cpu, comment);
}

// --- PSR transfer --------------------------------------------------------------

fn psr_transfer(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let use_spsr = opcode & (1 << 22) != 0;
    let is_msr = opcode & (1 << 21) != 0;

    if !is_msr {
        let rd = ((opcode >> 12) & 0xF) as usize;
        let value = if use_spsr { ctx.cpu.regs.read_spsr(ctx.cpu.cpsr.mode()) } else { ctx.cpu.cpsr.bits() };
        ctx.cpu.regs.write(rd, value);
        return;
    }

    // Field-mask bit 16 ("c", the control byte) gates mode/T/I/F; any of
    // the flag-byte bits (19) is always writable. We model the common
    // all-or-nothing (`8f00/f000`-style) masks real firmware uses rather
    // than the full four-byte granularity (spec §4.1 is silent on this;
    // see DESIGN.md).
    let privileged = ctx.cpu.cpsr.mode().is_privileged();
    let control_fields = privileged && opcode & (1 << 16) != 0;

    let value = if opcode & (1 << 25) != 0 {
        let rotate = ((opcode >> 8) & 0xF) * 2;
        (opcode & 0xFF).rotate_right(rotate)
    } else {
        let rm = (opcode & 0xF) as usize;
        ctx.cpu.regs.read(rm)
    };

    if use_spsr {
        if ctx.cpu.cpsr.mode().has_spsr() {
            let mode = ctx.cpu.cpsr.mode();
            let mut spsr = Psr::from_bits(ctx.cpu.regs.read_spsr(mode));
            spsr.write_masked(value, control_fields);
            ctx.cpu.regs.write_spsr(mode, spsr.bits());
        }
    } else {
        let old_mode = ctx.cpu.cpsr.mode();
        let new_mode = Mode::from_bits(value);
        if control_fields && old_mode != new_mode {
            ctx.cpu.regs.switch_mode(old_mode, new_mode);
        }
        ctx.cpu.cpsr.write_masked(value, control_fields);
    }
}

// --- ARMv5TE extensions ----------------------------------------------------

fn clz(ctx: &mut ExecCtx) {
    if !ctx.cpu.kind.is_armv5() {
        memory::undefined(ctx.cpu);
        return;
    }
    let rd = ((ctx.opcode >> 12) & 0xF) as usize;
    let rm = (ctx.opcode & 0xF) as usize;
    let value = ctx.cpu.regs.read(rm);
    ctx.cpu.regs.write(rd, value.leading_zeros());
}

fn saturate_add(a: i32, b: i32) -> (i32, bool) {
    match a.checked_add(b) {
        Some(v) => (v, false),
        None => (if b > 0 { i32::MAX } else { i32::MIN }, true),
    }
}

fn saturate_sub(a: i32, b: i32) -> (i32, bool) {
    match a.checked_sub(b) {
        Some(v) => (v, false),
        None => (if b < 0 { i32::MAX } else { i32::MIN }, true),
    }
}

/// `QADD`/`QSUB`/`QDADD`/`QDSUB`: saturating add/subtract, sticky-`Q` on
/// overflow (spec §4.1 "ArmV5Extension").
fn saturating_arith(ctx: &mut ExecCtx) {
    if !ctx.cpu.kind.is_armv5() {
        memory::undefined(ctx.cpu);
        return;
    }
    let opcode = ctx.opcode;
    let variant = (opcode >> 21) & 0x3;
    let rn = ((opcode >> 16) & 0xF) as usize;
    let rd = ((opcode >> 12) & 0xF) as usize;
    let rm = (opcode & 0xF) as usize;

    let a = ctx.cpu.regs.read(rm) as i32;
    let mut b = ctx.cpu.regs.read(rn) as i32;
    let mut saturated = false;
    if variant >= 2 {
        let (doubled, sat) = saturate_add(b, b);
        b = doubled;
        saturated |= sat;
    }
    let (result, sat) = if variant & 1 == 0 { saturate_add(a, b) } else { saturate_sub(a, b) };
    saturated |= sat;
    if saturated {
        ctx.cpu.cpsr.set_q(true);
    }
    ctx.cpu.regs.write(rd, result as u32);
}

// --- Coprocessor (CP15) ----------------------------------------------------

/// `MCR`/`MRC`: transfers a register to/from coprocessor 15 (spec §4.5/§6).
/// Any other coprocessor number, or an ARMv4 core (no CP15 at all), is
/// undefined.
fn coprocessor_register_transfer(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let cp_num = (opcode >> 8) & 0xF;
    if cp_num != 15 || !ctx.cpu.kind.is_armv5() {
        memory::undefined(ctx.cpu);
        return;
    }
    if !ctx.cpu.cpsr.mode().is_privileged() {
        memory::undefined(ctx.cpu);
        return;
    }

    let crn = (opcode >> 16) & 0xF;
    let crm = opcode & 0xF;
    let opcode2 = (opcode >> 5) & 0x7;
    let op_id = ((crn << 8) | (crm << 4) | opcode2) as u16;
    let rd = ((opcode >> 12) & 0xF) as usize;
    let is_mrc = opcode & (1 << 20) != 0;

    if is_mrc {
        let value = ctx.cpu.cp15.as_ref().and_then(|c| c.read(op_id));
        match value {
            Some(value) if rd == PC => {
                // `MRC` into `r15` updates only the N/Z/C/V flags from the
                // value's top nibble, per the ARM architecture reference.
                ctx.cpu.cpsr.set_nzcv(
                    value & 0x8000_0000 != 0,
                    value & 0x4000_0000 != 0,
                    value & 0x2000_0000 != 0,
                    value & 0x1000_0000 != 0,
                );
            }
            Some(value) => ctx.cpu.regs.write(rd, value),
            None => memory::undefined(ctx.cpu),
        }
        return;
    }

    let value = ctx.cpu.regs.read(rd);
    match op_id {
        // Cache-clean/write-buffer-drain operations aren't part of
        // `Cp15::write`'s register-state table: they need the write-buffer
        // drain path (`memory::drain_write_buffer`), which only this
        // handler has the `ExecCtx` (soc/arbiter) to reach.
        0x7A1 | 0x7A2 | 0x7A4 | 0x7E1 | 0x7E2 => handle_cache_clean(ctx, op_id, value),
        _ => {
            let handled = match (ctx.cpu.icache.as_mut(), ctx.cpu.dcache.as_mut(), ctx.cpu.cp15.as_mut()) {
                (Some(icache), Some(dcache), Some(cp15)) => cp15.write(op_id, icache, dcache, value),
                _ => false,
            };
            if !handled {
                memory::undefined(ctx.cpu);
            }
        }
    }
}

/// `0x7A1` (D-cache clean by address), `0x7A2` (clean by set/way), `0x7A4`
/// (drain write buffer), `0x7E1`/`0x7E2` (clean-and-invalidate all): clears
/// the matched dirty bit(s), then forces the whole write buffer to drain.
/// The cache model here tracks dirtiness only (the backing bytes are
/// already in RAM or already queued in the write buffer by the time a line
/// goes dirty, spec §4.4), and the write buffer has no per-address index, so
/// a selective "drain just this line" isn't expressible without breaking
/// its strict-FIFO ordering (spec §9); forcing a full drain is the
/// conservative, order-preserving choice. This is also why `0x7E1`/`0x7E2`
/// live here rather than in `Cp15::write`: that table has no `ExecCtx` to
/// reach the write buffer's drain path through.
fn handle_cache_clean(ctx: &mut ExecCtx, op_id: u16, value: u32) {
    match op_id {
        0x7A1 => {
            let _ = ctx.cpu.dcache.as_mut().and_then(|c| c.clean_addr(value));
        }
        0x7A2 => {
            let set = (value >> 2) as usize & 0x3;
            let way = value as usize & 0x3;
            let _ = ctx.cpu.dcache.as_mut().and_then(|c| c.clean_set_way(set, way));
        }
        0x7A4 => {}
        0x7E1 | 0x7E2 => {
            let _ = ctx.cpu.dcache.as_mut().map(|c| c.clean_and_invalidate_all());
        }
        _ => unreachable!(),
    }
    let who = memory::requester(ctx.cpu.kind);
    memory::drain_write_buffer(ctx.cpu, ctx.soc, ctx.arbiter, who, true);
}

/// `CDP`: coprocessor data operations. CP15 defines none (its register
/// interface is entirely `MCR`/`MRC`), so this always raises `Undefined`.
fn cdp(ctx: &mut ExecCtx) {
    memory::undefined(ctx.cpu);
}

/// `LDC`/`STC`: coprocessor memory transfers. No coprocessor this core
/// models uses them (CP15 is register-only; there is no FPU), so this
/// always raises `Undefined`.
fn ldc_stc(ctx: &mut ExecCtx) {
    memory::undefined(ctx.cpu);
}

fn undefined_instruction(ctx: &mut ExecCtx) {
    memory::undefined(ctx.cpu);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cpu::{CoreKind, Cpu};
    use crate::soc::arbiter::Arbiter;
    use crate::soc::Soc;

    fn ctx_harness(cpu: &mut Cpu, soc: &mut Soc, arbiter: &mut Arbiter, opcode: u32) -> ExecCtx<'_> {
        ExecCtx { cpu, soc, arbiter, opcode }
    }

    #[test]
    fn index_of_packs_the_two_classification_fields() {
        // `MOV r0, r1` (cond=AL, opcode=1101, S=0, Rn=0, Rd=0, shift imm 0, Rm=1)
        let opcode = 0xE1A0_0001;
        let idx = index_of(opcode);
        assert_eq!(idx, (0xE1 << 4) | 0x0);
    }

    #[test]
    fn mov_immediate_writes_destination_register() {
        let mut soc = Soc::new(vec![0u8; 0x200], &crate::config::Config::default()).unwrap();
        let mut arbiter = Arbiter::new();
        let mut cpu = Cpu::new(CoreKind::Arm9);
        cpu.cpsr.set_mode(Mode::Svc);
        // MOVAL r0, #5
        let opcode = 0xE3A0_0005;
        let mut ctx = ctx_harness(&mut cpu, &mut soc, &mut arbiter, opcode);
        dispatch(&mut ctx);
        assert_eq!(cpu.regs.read(0), 5);
    }

    #[test]
    fn add_s_sets_carry_on_unsigned_overflow() {
        let mut soc = Soc::new(vec![0u8; 0x200], &crate::config::Config::default()).unwrap();
        let mut arbiter = Arbiter::new();
        let mut cpu = Cpu::new(CoreKind::Arm9);
        cpu.regs.write(0, 0xFFFF_FFFF);
        cpu.regs.write(1, 2);
        // ADDS r2, r1, r0
        let opcode = 0xE091_2000;
        let mut ctx = ctx_harness(&mut cpu, &mut soc, &mut arbiter, opcode);
        dispatch(&mut ctx);
        assert_eq!(cpu.regs.read(2), 1);
        assert!(cpu.cpsr.c());
    }

    #[test]
    fn bx_sets_thumb_state_from_target_bit0() {
        let mut soc = Soc::new(vec![0u8; 0x200], &crate::config::Config::default()).unwrap();
        let mut arbiter = Arbiter::new();
        let mut cpu = Cpu::new(CoreKind::Arm9);
        cpu.regs.write(0, 0x0200_0001);
        // BX r0
        let opcode = 0xE12F_FF10;
        let mut ctx = ctx_harness(&mut cpu, &mut soc, &mut arbiter, opcode);
        dispatch(&mut ctx);
        assert!(cpu.cpsr.thumb());
    }

    #[test]
    fn clz_counts_leading_zeros() {
        let mut soc = Soc::new(vec![0u8; 0x200], &crate::config::Config::default()).unwrap();
        let mut arbiter = Arbiter::new();
        let mut cpu = Cpu::new(CoreKind::Arm9);
        cpu.regs.write(1, 0x0000_0001);
        // CLZ r0, r1
        let opcode = 0xE16F_0F11;
        let mut ctx = ctx_harness(&mut cpu, &mut soc, &mut arbiter, opcode);
        dispatch(&mut ctx);
        assert_eq!(cpu.regs.read(0), 31);
    }

    #[test]
    fn undefined_cond_nv_is_skipped_on_arm7() {
        let mut soc = Soc::new(vec![0u8; 0x200], &crate::config::Config::default()).unwrap();
        let mut arbiter = Arbiter::new();
        let mut cpu = Cpu::new(CoreKind::Arm7);
        let before = cpu.regs.read(0);
        // cond=NV B #4 -- never taken on ARMv4.
        let opcode = 0xFA00_0001;
        let mut ctx = ctx_harness(&mut cpu, &mut soc, &mut arbiter, opcode);
        dispatch(&mut ctx);
        assert_eq!(cpu.regs.read(0), before);
    }
}
