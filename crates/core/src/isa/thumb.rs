//! The 1024-entry THUMB decode table and its instruction-format handlers
//! (spec §4.1 "C1 Instruction decoder tables").
//!
//! Indexed by `bits[15:6]` of the 16-bit instruction half-word — every
//! THUMB format's discriminating bits live at bit 6 or above, so (as with
//! the ARM table in [`super::arm`]) a handler only needs the full opcode to
//! pull out register numbers and immediates it doesn't classify on.

use std::sync::OnceLock;

use crate::common::AccessWidth;
use crate::core::arch::gpr::{LR, PC, SP};
use crate::core::cpu::memory;
use crate::core::cpu::trap;
use crate::core::units::alu::logic::nz_flags;
use crate::core::units::alu::{arithmetic, shift, ShiftKind};
use crate::isa::condition::ConditionCode;
use crate::isa::info::{DecodedInfo, FlagMask, OpKind, SpecialKind};
use crate::isa::{charge_internal, multiply_internal_cycles, register_list, sign_extend, ExecCtx};

/// One THUMB decode-table slot, mirroring [`super::arm::ArmEntry`].
pub struct ThumbEntry {
    /// The instruction-format handler this slot routes to.
    pub handler: fn(&mut ExecCtx),
    /// Classification metadata for this slot (spec §4.1).
    pub info: DecodedInfo,
}

const TABLE_LEN: usize = 1 << 10;

static TABLE: OnceLock<Vec<ThumbEntry>> = OnceLock::new();

fn table() -> &'static [ThumbEntry] {
    TABLE.get_or_init(|| (0..TABLE_LEN).map(build_entry).collect())
}

fn index_of(opcode: u32) -> usize {
    ((opcode >> 6) & 0x3FF) as usize
}

/// Looks up the decode-table entry for a 16-bit THUMB `opcode`.
pub fn decode(opcode: u32) -> &'static ThumbEntry {
    &table()[index_of(opcode)]
}

/// Decodes and executes one THUMB instruction half-word. THUMB has no
/// per-instruction condition field (only the format-16 conditional-branch
/// opcode itself tests one), so this simply dispatches through the table.
pub fn dispatch(ctx: &mut ExecCtx) {
    let entry = decode(ctx.opcode);
    (entry.handler)(ctx);
}

fn build_entry(index: usize) -> ThumbEntry {
    let hi = (index as u32) << 6;
    let handler = classify(hi);
    ThumbEntry { handler, info: info_for(handler) }
}

/// Conservative classification metadata for a resolved handler, matched by
/// function-pointer identity against the format dispatch above rather than
/// re-deriving it from `hi` a second time (spec §4.1's info record is a JIT
/// dispatch aid; register masks stay maximally conservative since THUMB's
/// short encodings leave no table-index bits free for exact register
/// numbers, matching [`super::arm::generic_info`]'s same tradeoff).
fn info_for(handler: fn(&mut ExecCtx)) -> DecodedInfo {
    let h = handler as usize;
    let is = |f: fn(&mut ExecCtx)| f as usize == h;

    if is(undefined_instruction) {
        return DecodedInfo::UNDEFINED;
    }
    let (kind, end_of_block, special_kind) = if is(software_interrupt) {
        (OpKind::SoftwareInterrupt, true, SpecialKind::None)
    } else if is(unconditional_branch) || is(conditional_branch) || is(branch_with_link) || is(hi_register_operations_branch_exchange) {
        (OpKind::Branch, true, SpecialKind::None)
    } else if is(push_pop_registers) || is(multiple_load_store) {
        (OpKind::BlockDataTransfer, false, SpecialKind::None)
    } else if is(pc_relative_load) {
        (OpKind::SingleDataTransfer, false, SpecialKind::PcRelativeLiteralLoad)
    } else if is(load_store_register_offset) || is(load_store_immediate_offset) || is(sp_relative_load_store) {
        (OpKind::SingleDataTransfer, false, SpecialKind::None)
    } else if is(load_store_halfword) || is(load_store_sign_extended) {
        (OpKind::HalfwordTransfer, false, SpecialKind::None)
    } else {
        (OpKind::DataProcessing, false, SpecialKind::None)
    };

    DecodedInfo {
        opcode_kind: kind,
        src_mask: 0xFFFF,
        dst_mask: 0xFFFF,
        flag_read: FlagMask::C,
        flag_write: FlagMask::all(),
        end_of_block,
        special_kind,
    }
}

/// Classifies a half-word's top 10 bits into one of THUMB's 19 instruction
/// formats (spec §4.1; format numbering follows the ARM7TDMI reference
/// manual).
fn classify(hi: u32) -> fn(&mut ExecCtx) {
    match (hi >> 13) & 0x7 {
        0b000 => {
            if (hi >> 11) & 0x3 == 0b11 {
                add_subtract
            } else {
                move_shifted_register
            }
        }
        0b001 => move_compare_add_subtract_immediate,
        0b010 => classify_010(hi),
        0b011 => load_store_immediate_offset,
        0b100 => {
            if (hi >> 12) & 1 == 0 {
                load_store_halfword
            } else {
                sp_relative_load_store
            }
        }
        0b101 => {
            if (hi >> 12) & 1 == 0 {
                load_address
            } else {
                classify_101(hi)
            }
        }
        0b110 => {
            if (hi >> 12) & 1 == 0 {
                multiple_load_store
            } else {
                classify_110(hi)
            }
        }
        _ => classify_111(hi),
    }
}

fn classify_010(hi: u32) -> fn(&mut ExecCtx) {
    match (hi >> 10) & 0x7 {
        0b000 => alu_operations,
        0b001 => hi_register_operations_branch_exchange,
        0b010 | 0b011 => pc_relative_load,
        _ => {
            if (hi >> 9) & 1 == 0 {
                load_store_register_offset
            } else {
                load_store_sign_extended
            }
        }
    }
}

fn classify_101(hi: u32) -> fn(&mut ExecCtx) {
    if (hi >> 8) & 0xF == 0b0000 {
        add_offset_to_stack_pointer
    } else if (hi >> 10) & 1 == 1 {
        push_pop_registers
    } else {
        undefined_instruction
    }
}

fn classify_110(hi: u32) -> fn(&mut ExecCtx) {
    if (hi >> 8) & 0xFF == 0b1111_1111 {
        software_interrupt
    } else if (hi >> 8) & 0xF == 0b1110 {
        undefined_instruction
    } else {
        conditional_branch
    }
}

fn classify_111(hi: u32) -> fn(&mut ExecCtx) {
    if (hi >> 11) & 1 == 0 {
        unconditional_branch
    } else {
        branch_with_link
    }
}

fn undefined_instruction(ctx: &mut ExecCtx) {
    memory::undefined(ctx.cpu);
}

// --- Format 1: move shifted register -----------------------------------------

fn move_shifted_register(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let op = (opcode >> 11) & 0x3;
    let offset5 = (opcode >> 6) & 0x1F;
    let rs = ((opcode >> 3) & 0x7) as usize;
    let rd = (opcode & 0x7) as usize;

    let kind = match op {
        0 => ShiftKind::Lsl,
        1 => ShiftKind::Lsr,
        _ => ShiftKind::Asr,
    };
    let carry_in = ctx.cpu.cpsr.c();
    let (result, carry) = shift(kind, ctx.cpu.regs.read(rs), offset5, carry_in, true);
    ctx.cpu.regs.write(rd, result);
    let (n, z) = nz_flags(result);
    ctx.cpu.cpsr.set_nzcv(n, z, carry, ctx.cpu.cpsr.v());
}

// --- Format 2: add/subtract ---------------------------------------------------

fn add_subtract(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let immediate = opcode & (1 << 10) != 0;
    let subtract = opcode & (1 << 9) != 0;
    let rn_or_imm = (opcode >> 6) & 0x7;
    let rs = ((opcode >> 3) & 0x7) as usize;
    let rd = (opcode & 0x7) as usize;

    let op1 = ctx.cpu.regs.read(rs);
    let op2 = if immediate { rn_or_imm } else { ctx.cpu.regs.read(rn_or_imm as usize) };
    let r = if subtract { arithmetic::sub(op1, op2) } else { arithmetic::add(op1, op2) };
    ctx.cpu.regs.write(rd, r.value);
    let (n, z) = nz_flags(r.value);
    ctx.cpu.cpsr.set_nzcv(n, z, r.carry, r.overflow);
}

// --- Format 3: move/compare/add/subtract immediate -----------------------------

fn move_compare_add_subtract_immediate(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let op = (opcode >> 11) & 0x3;
    let rd = ((opcode >> 8) & 0x7) as usize;
    let imm = opcode & 0xFF;

    match op {
        0 => {
            // MOV
            ctx.cpu.regs.write(rd, imm);
            let (n, z) = nz_flags(imm);
            ctx.cpu.cpsr.set_nzcv(n, z, ctx.cpu.cpsr.c(), ctx.cpu.cpsr.v());
        }
        1 => {
            // CMP
            let r = arithmetic::sub(ctx.cpu.regs.read(rd), imm);
            let (n, z) = nz_flags(r.value);
            ctx.cpu.cpsr.set_nzcv(n, z, r.carry, r.overflow);
        }
        2 => {
            // ADD
            let r = arithmetic::add(ctx.cpu.regs.read(rd), imm);
            ctx.cpu.regs.write(rd, r.value);
            let (n, z) = nz_flags(r.value);
            ctx.cpu.cpsr.set_nzcv(n, z, r.carry, r.overflow);
        }
        _ => {
            // SUB
            let r = arithmetic::sub(ctx.cpu.regs.read(rd), imm);
            ctx.cpu.regs.write(rd, r.value);
            let (n, z) = nz_flags(r.value);
            ctx.cpu.cpsr.set_nzcv(n, z, r.carry, r.overflow);
        }
    }
}

// --- Format 4: ALU operations ---------------------------------------------------

fn alu_operations(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let op = (opcode >> 6) & 0xF;
    let rs = ((opcode >> 3) & 0x7) as usize;
    let rd = (opcode & 0x7) as usize;
    let rd_value = ctx.cpu.regs.read(rd);
    let rs_value = ctx.cpu.regs.read(rs);
    let carry_in = ctx.cpu.cpsr.c();

    // THUMB's shift-by-register ALU ops (LSL/LSR/ASR/ROR, op 2-4,7) use the
    // low byte of Rs as the shift amount, register-supplied semantics (so
    // amount 0 means "no shift", not the ARM immediate #0 reinterpretation).
    match op {
        0x0 => write_logical(ctx, rd, rd_value & rs_value, carry_in),
        0x1 => write_logical(ctx, rd, rd_value ^ rs_value, carry_in),
        0x2 => {
            charge_internal(ctx, 1);
            let (result, carry) = shift(ShiftKind::Lsl, rd_value, rs_value & 0xFF, carry_in, false);
            write_logical(ctx, rd, result, carry);
        }
        0x3 => {
            charge_internal(ctx, 1);
            let (result, carry) = shift(ShiftKind::Lsr, rd_value, rs_value & 0xFF, carry_in, false);
            write_logical(ctx, rd, result, carry);
        }
        0x4 => {
            charge_internal(ctx, 1);
            let (result, carry) = shift(ShiftKind::Asr, rd_value, rs_value & 0xFF, carry_in, false);
            write_logical(ctx, rd, result, carry);
        }
        0x5 => {
            let r = arithmetic::add_with_carry(rd_value, rs_value, carry_in);
            write_arith(ctx, rd, r, true);
        }
        0x6 => {
            let r = arithmetic::sub_with_carry(rd_value, rs_value, carry_in);
            write_arith(ctx, rd, r, true);
        }
        0x7 => {
            charge_internal(ctx, 1);
            let (result, carry) = shift(ShiftKind::Ror, rd_value, rs_value & 0xFF, carry_in, false);
            write_logical(ctx, rd, result, carry);
        }
        0x8 => {
            // TST
            let result = rd_value & rs_value;
            let (n, z) = nz_flags(result);
            ctx.cpu.cpsr.set_nzcv(n, z, carry_in, ctx.cpu.cpsr.v());
        }
        0x9 => {
            // NEG
            let r = arithmetic::sub(0, rs_value);
            write_arith(ctx, rd, r, true);
        }
        0xA => {
            // CMP
            let r = arithmetic::sub(rd_value, rs_value);
            write_arith(ctx, rd, r, false);
        }
        0xB => {
            // CMN
            let r = arithmetic::add(rd_value, rs_value);
            write_arith(ctx, rd, r, false);
        }
        0xC => write_logical(ctx, rd, rd_value | rs_value, carry_in),
        0xD => {
            // MUL
            charge_internal(ctx, multiply_internal_cycles(rs_value));
            let result = rd_value.wrapping_mul(rs_value);
            ctx.cpu.regs.write(rd, result);
            let (n, z) = nz_flags(result);
            ctx.cpu.cpsr.set_nzcv(n, z, carry_in, ctx.cpu.cpsr.v());
        }
        0xE => write_logical(ctx, rd, rd_value & !rs_value, carry_in),
        _ => write_logical(ctx, rd, !rs_value, carry_in),
    }
}

fn write_logical(ctx: &mut ExecCtx, rd: usize, result: u32, carry: bool) {
    ctx.cpu.regs.write(rd, result);
    let (n, z) = nz_flags(result);
    ctx.cpu.cpsr.set_nzcv(n, z, carry, ctx.cpu.cpsr.v());
}

fn write_arith(ctx: &mut ExecCtx, rd: usize, r: arithmetic::AddResult, store: bool) {
    if store {
        ctx.cpu.regs.write(rd, r.value);
    }
    let (n, z) = nz_flags(r.value);
    ctx.cpu.cpsr.set_nzcv(n, z, r.carry, r.overflow);
}

// --- Format 5: hi register operations / branch exchange -------------------------

fn hi_register_operations_branch_exchange(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let op = (opcode >> 8) & 0x3;
    let h1 = (opcode >> 7) & 1;
    let h2 = (opcode >> 6) & 1;
    let rs = (((opcode >> 3) & 0x7) | (h2 << 3)) as usize;
    let rd = ((opcode & 0x7) | (h1 << 3)) as usize;

    match op {
        0 => {
            let result = ctx.cpu.regs.read(rd).wrapping_add(ctx.cpu.regs.read(rs));
            write_hi_dest(ctx, rd, result);
        }
        1 => {
            let r = arithmetic::sub(ctx.cpu.regs.read(rd), ctx.cpu.regs.read(rs));
            let (n, z) = nz_flags(r.value);
            ctx.cpu.cpsr.set_nzcv(n, z, r.carry, r.overflow);
        }
        2 => {
            let value = ctx.cpu.regs.read(rs);
            write_hi_dest(ctx, rd, value);
        }
        _ => {
            // BX / BLX(reg): H1 selects link (BLX) on ARMv5; undefined on
            // ARMv4T since the "link" encoding was reserved there.
            let target = ctx.cpu.regs.read(rs);
            if h1 == 1 {
                if !ctx.cpu.kind.is_armv5() {
                    memory::undefined(ctx.cpu);
                    return;
                }
                let return_addr = ctx.cpu.regs.pc().wrapping_sub(2) | 1;
                ctx.cpu.regs.write(LR, return_addr);
            }
            interworking_branch(ctx, target);
        }
    }
}

fn write_hi_dest(ctx: &mut ExecCtx, rd: usize, value: u32) {
    if rd == PC {
        ctx.cpu.request_flush(value & !1);
    } else {
        ctx.cpu.regs.write(rd, value);
    }
}

fn interworking_branch(ctx: &mut ExecCtx, target: u32) {
    let thumb = target & 1 != 0;
    ctx.cpu.cpsr.set_thumb(thumb);
    ctx.cpu.request_flush(if thumb { target & !1 } else { target & !3 });
}

// --- Format 6: PC-relative load ---------------------------------------------------

fn pc_relative_load(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let rd = ((opcode >> 8) & 0x7) as usize;
    let word8 = opcode & 0xFF;
    let base = ctx.cpu.regs.pc() & !3;
    let addr = base.wrapping_add(word8 * 4);
    let value = memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Word, false);
    ctx.cpu.regs.write(rd, value);
}

// --- Format 7/8: load/store with register offset ------------------------------------

fn load_store_register_offset(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let load = opcode & (1 << 11) != 0;
    let byte = opcode & (1 << 10) != 0;
    let ro = ((opcode >> 6) & 0x7) as usize;
    let rb = ((opcode >> 3) & 0x7) as usize;
    let rd = (opcode & 0x7) as usize;
    let addr = ctx.cpu.regs.read(rb).wrapping_add(ctx.cpu.regs.read(ro));
    let width = if byte { AccessWidth::Byte } else { AccessWidth::Word };

    if load {
        let value = memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, addr, width, false);
        ctx.cpu.regs.write(rd, value);
    } else {
        let value = ctx.cpu.regs.read(rd);
        memory::data_write(ctx.cpu, ctx.soc, ctx.arbiter, addr, width, value, false);
    }
}

fn load_store_sign_extended(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let h_bit = opcode & (1 << 11) != 0;
    let sign_extended = opcode & (1 << 10) != 0;
    let ro = ((opcode >> 6) & 0x7) as usize;
    let rb = ((opcode >> 3) & 0x7) as usize;
    let rd = (opcode & 0x7) as usize;
    let addr = ctx.cpu.regs.read(rb).wrapping_add(ctx.cpu.regs.read(ro));

    let value = match (sign_extended, h_bit) {
        (false, false) => {
            // STRH
            let value = ctx.cpu.regs.read(rd);
            memory::data_write(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Half, value, false);
            return;
        }
        (false, true) => memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Half, false),
        (true, false) => {
            let raw = memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Byte, false);
            sign_extend(raw, 8)
        }
        (true, true) => {
            let raw = memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Half, false);
            sign_extend(raw, 16)
        }
    };
    ctx.cpu.regs.write(rd, value);
}

// --- Format 9: load/store with immediate offset -----------------------------------

fn load_store_immediate_offset(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let byte = opcode & (1 << 12) != 0;
    let load = opcode & (1 << 11) != 0;
    let offset5 = (opcode >> 6) & 0x1F;
    let rb = ((opcode >> 3) & 0x7) as usize;
    let rd = (opcode & 0x7) as usize;
    let offset = if byte { offset5 } else { offset5 * 4 };
    let addr = ctx.cpu.regs.read(rb).wrapping_add(offset);
    let width = if byte { AccessWidth::Byte } else { AccessWidth::Word };

    if load {
        let value = memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, addr, width, false);
        ctx.cpu.regs.write(rd, value);
    } else {
        let value = ctx.cpu.regs.read(rd);
        memory::data_write(ctx.cpu, ctx.soc, ctx.arbiter, addr, width, value, false);
    }
}

// --- Format 10: load/store halfword -----------------------------------------------

fn load_store_halfword(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let load = opcode & (1 << 11) != 0;
    let offset5 = (opcode >> 6) & 0x1F;
    let rb = ((opcode >> 3) & 0x7) as usize;
    let rd = (opcode & 0x7) as usize;
    let addr = ctx.cpu.regs.read(rb).wrapping_add(offset5 * 2);

    if load {
        let value = memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Half, false);
        ctx.cpu.regs.write(rd, value);
    } else {
        let value = ctx.cpu.regs.read(rd);
        memory::data_write(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Half, value, false);
    }
}

// --- Format 11: SP-relative load/store ---------------------------------------------

fn sp_relative_load_store(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let load = opcode & (1 << 11) != 0;
    let rd = ((opcode >> 8) & 0x7) as usize;
    let word8 = opcode & 0xFF;
    let addr = ctx.cpu.regs.read(SP).wrapping_add(word8 * 4);

    if load {
        let value = memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Word, false);
        ctx.cpu.regs.write(rd, value);
    } else {
        let value = ctx.cpu.regs.read(rd);
        memory::data_write(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Word, value, false);
    }
}

// --- Format 12: load address -------------------------------------------------------

fn load_address(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let use_sp = opcode & (1 << 11) != 0;
    let rd = ((opcode >> 8) & 0x7) as usize;
    let word8 = opcode & 0xFF;
    let base = if use_sp { ctx.cpu.regs.read(SP) } else { ctx.cpu.regs.pc() & !3 };
    ctx.cpu.regs.write(rd, base.wrapping_add(word8 * 4));
}

// --- Format 13: add offset to stack pointer -----------------------------------------

fn add_offset_to_stack_pointer(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let negative = opcode & (1 << 7) != 0;
    let offset = (opcode & 0x7F) * 4;
    let sp = ctx.cpu.regs.read(SP);
    ctx.cpu.regs.write(SP, if negative { sp.wrapping_sub(offset) } else { sp.wrapping_add(offset) });
}

// --- Format 14: push/pop registers --------------------------------------------------

fn push_pop_registers(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let load = opcode & (1 << 11) != 0;
    let store_lr_load_pc = opcode & (1 << 8) != 0;
    let list = (opcode & 0xFF) as u16;
    let count = u32::try_from(register_list(list).count()).unwrap_or(0) + u32::from(store_lr_load_pc);

    if load {
        let start = ctx.cpu.regs.read(SP);
        let mut addr = start;
        for reg in register_list(list) {
            let value = memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Word, addr != start);
            ctx.cpu.regs.write(reg, value);
            addr = addr.wrapping_add(4);
        }
        if store_lr_load_pc {
            let value = memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Word, true);
            ctx.cpu.request_flush(value & !1);
            addr = addr.wrapping_add(4);
        }
        ctx.cpu.regs.write(SP, addr);
    } else {
        let start = ctx.cpu.regs.read(SP).wrapping_sub(count * 4);
        let mut addr = start;
        ctx.cpu.regs.write(SP, start);
        for reg in register_list(list) {
            let value = ctx.cpu.regs.read(reg);
            memory::data_write(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Word, value, addr != start);
            addr = addr.wrapping_add(4);
        }
        if store_lr_load_pc {
            let value = ctx.cpu.regs.read(LR);
            memory::data_write(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Word, value, true);
        }
    }
}

// --- Format 15: multiple load/store -------------------------------------------------

fn multiple_load_store(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let load = opcode & (1 << 11) != 0;
    let rb = ((opcode >> 8) & 0x7) as usize;
    let list = (opcode & 0xFF) as u16;
    let count = u32::try_from(register_list(list).count()).unwrap_or(0).max(1);
    let start = ctx.cpu.regs.read(rb);

    let mut addr = start;
    for reg in register_list(list) {
        if load {
            let value = memory::data_read(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Word, addr != start);
            ctx.cpu.regs.write(reg, value);
        } else {
            let value = ctx.cpu.regs.read(reg);
            memory::data_write(ctx.cpu, ctx.soc, ctx.arbiter, addr, AccessWidth::Word, value, addr != start);
        }
        addr = addr.wrapping_add(4);
    }
    // Writeback always happens (THUMB's block transfer has no `W`-bit
    // opt-out), except that a load into a register list containing `Rb`
    // leaves `Rb` holding the loaded value, not the incremented address.
    if !(load && register_list(list).any(|r| r == rb)) {
        ctx.cpu.regs.write(rb, start.wrapping_add(count * 4));
    }
}

// --- Format 16: conditional branch --------------------------------------------------

fn conditional_branch(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let cond = ConditionCode::from_bits((opcode >> 8) & 0xF);
    if !cond.evaluate(ctx.cpu.cpsr) {
        return;
    }
    let offset = sign_extend(opcode & 0xFF, 8) << 1;
    let pc = ctx.cpu.regs.pc();
    ctx.cpu.request_flush(pc.wrapping_add(offset));
}

// --- Format 17: software interrupt -----------------------------------------------------

fn software_interrupt(ctx: &mut ExecCtx) {
    let comment = ctx.opcode & 0xFF;
    trap::trigger_swi(ctx.cpu, comment);
}

// --- Format 18: unconditional branch ---------------------------------------------------

fn unconditional_branch(ctx: &mut ExecCtx) {
    let offset = sign_extend(ctx.opcode & 0x7FF, 11) << 1;
    let pc = ctx.cpu.regs.pc();
    ctx.cpu.request_flush(pc.wrapping_add(offset));
}

// --- Format 19: long branch with link (two half-words) -----------------------------------

/// `BL`/`BLX` are emitted as a pair of half-words, each independently
/// decoded and executed (there's no prefetch-time fusing): the first
/// (`H==10`) stashes `PC + offset_hi<<12` into `LR`; the second (`H==11`
/// `BL`, or ARMv5's `H==01` `BLX`) computes the final target from `LR` and
/// the low 11 bits, sets the return address in `LR`, and branches.
fn branch_with_link(ctx: &mut ExecCtx) {
    let opcode = ctx.opcode;
    let low_half = opcode & (1 << 11) != 0;
    let offset11 = opcode & 0x7FF;

    if !low_half {
        let offset_hi = sign_extend(offset11, 11) << 12;
        let pc = ctx.cpu.regs.pc();
        ctx.cpu.regs.write(LR, pc.wrapping_add(offset_hi));
        return;
    }

    let lr = ctx.cpu.regs.read(LR);
    let pc = ctx.cpu.regs.pc();
    let is_blx = (opcode >> 12) & 1 == 0;
    let target = if is_blx { lr.wrapping_add(offset11 << 1) & !3 } else { lr.wrapping_add(offset11 << 1) };
    ctx.cpu.regs.write(LR, (pc.wrapping_sub(2)) | 1);
    if is_blx {
        if !ctx.cpu.kind.is_armv5() {
            memory::undefined(ctx.cpu);
            return;
        }
        ctx.cpu.cpsr.set_thumb(false);
    }
    ctx.cpu.request_flush(target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cpu::{CoreKind, Cpu};
    use crate::soc::arbiter::Arbiter;
    use crate::soc::Soc;

    fn harness() -> (Cpu, Soc, Arbiter) {
        let cpu = Cpu::new(CoreKind::Arm7);
        let soc = Soc::new(vec![0u8; 0x200], &crate::config::Config::default()).unwrap();
        (cpu, soc, Arbiter::new())
    }

    #[test]
    fn index_of_keeps_only_the_top_ten_bits() {
        assert_eq!(index_of(0x1800), index_of(0x183F));
    }

    #[test]
    fn move_immediate_sets_low_register() {
        let (mut cpu, mut soc, mut arbiter) = harness();
        // MOV r0, #5
        let opcode = 0x2005;
        let mut ctx = ExecCtx { cpu: &mut cpu, soc: &mut soc, arbiter: &mut arbiter, opcode };
        dispatch(&mut ctx);
        assert_eq!(cpu.regs.read(0), 5);
    }

    #[test]
    fn add_register_sets_carry_on_overflow() {
        let (mut cpu, mut soc, mut arbiter) = harness();
        cpu.regs.write(0, 0xFFFF_FFFF);
        cpu.regs.write(1, 2);
        // ADD r2, r0, r1 (format 2, register form)
        let opcode = 0x1842;
        let mut ctx = ExecCtx { cpu: &mut cpu, soc: &mut soc, arbiter: &mut arbiter, opcode };
        dispatch(&mut ctx);
        assert_eq!(cpu.regs.read(2), 1);
        assert!(cpu.cpsr.c());
    }

    #[test]
    fn bx_sets_thumb_state_from_target_bit0() {
        let (mut cpu, mut soc, mut arbiter) = harness();
        cpu.regs.write(0, 0x0200_0001);
        // BX r0
        let opcode = 0x4700;
        let mut ctx = ExecCtx { cpu: &mut cpu, soc: &mut soc, arbiter: &mut arbiter, opcode };
        dispatch(&mut ctx);
        assert!(cpu.cpsr.thumb());
    }

    #[test]
    fn unconditional_branch_requests_flush_forward() {
        let (mut cpu, mut soc, mut arbiter) = harness();
        let pc_before = cpu.regs.pc();
        // B #4 (encoded offset 2, shifted left 1)
        let opcode = 0xE002;
        let mut ctx = ExecCtx { cpu: &mut cpu, soc: &mut soc, arbiter: &mut arbiter, opcode };
        dispatch(&mut ctx);
        // No public accessor for pending_flush; confirm dispatch didn't panic
        // and PC (read lazily via the pipeline) is unaffected until the next
        // fetch, matching request_flush's deferred-apply contract.
        assert_eq!(cpu.regs.pc(), pc_before);
    }
}
