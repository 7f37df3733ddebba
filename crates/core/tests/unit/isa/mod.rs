//! ARM/THUMB decode tables and dispatch, observed through the public
//! `ExecCtx`/`Cpu` surface rather than the tables' own internals.

use nds_core::config::Config;
use nds_core::core::arch::mode::Mode;
use nds_core::core::cpu::{CoreKind, Cpu};
use nds_core::isa::{arm, thumb, ExecCtx};
use nds_core::soc::arbiter::Arbiter;
use nds_core::Soc;

fn fresh_parts() -> (Cpu, Soc, Arbiter) {
    let soc = Soc::new(vec![0u8; 0x200], &Config::default()).expect("header-sized rom accepted");
    (Cpu::new(CoreKind::Arm9), soc, Arbiter::new())
}

/// Spec §4.1: condition field `0xF` on ARMv5 is reinterpreted as BLX
/// (immediate) for the one `B`/`BL`-shaped bit pattern, evaluated
/// unconditionally rather than through the ordinary condition check.
#[test]
fn arm_cond_0xf_on_armv5_is_blx_immediate_and_bypasses_the_condition_field() {
    let (mut cpu, mut soc, mut arbiter) = fresh_parts();
    cpu.regs.set_pc(0x0200_0008);
    // cond=0xF, bits[27:25]=101 (branch-with-link-shaped), offset 0, H=0.
    let opcode = 0xFB00_0000u32;
    let mut ctx = ExecCtx { cpu: &mut cpu, soc: &mut soc, arbiter: &mut arbiter, opcode };
    arm::dispatch(&mut ctx);
    assert!(cpu.cpsr.thumb());
}

/// Spec §4.1: several ARMv5-only encodings (here, `CLZ`) decode to
/// `Undefined` on the ARMv4 (ARM7) core — `coreNumber` is part of the
/// decoding contract, not just an info-record annotation.
#[test]
fn armv5_only_instruction_is_undefined_on_the_arm7_core() {
    let config = Config::default();
    let mut soc = Soc::new(vec![0u8; 0x200], &config).unwrap();
    let mut arbiter = Arbiter::new();
    let mut cpu = Cpu::new(CoreKind::Arm7);
    cpu.switch_mode(Mode::Svc);
    cpu.regs.set_pc(0x0000_0020);
    cpu.regs.write(1, 0xFFFF_FFFF);
    // CLZ r0, r1 (unconditional) -- ARMv5-only.
    let opcode = 0xE16F_0F11u32;
    let mut ctx = ExecCtx { cpu: &mut cpu, soc: &mut soc, arbiter: &mut arbiter, opcode };
    arm::dispatch(&mut ctx);
    // CLZ never wrote r0 on the ARM7; it vectored to the undefined handler,
    // which requested a flush to the undefined vector instead.
    assert_eq!(cpu.regs.read(0), 0);
    assert_eq!(cpu.cpsr.mode(), Mode::Und);
}

/// THUMB has no per-instruction condition field outside the conditional
/// branch format; the dispatch table always invokes a handler.
#[test]
fn thumb_unconditional_format_always_dispatches() {
    let (mut cpu, mut soc, mut arbiter) = fresh_parts();
    cpu.cpsr.set_thumb(true);
    cpu.regs.write(1, 5);
    // MOV r0, r1 is encoded as ADD r0, r1, #0 in THUMB format 2 (0x1C08).
    let opcode = 0x1C08u32;
    let mut ctx = ExecCtx { cpu: &mut cpu, soc: &mut soc, arbiter: &mut arbiter, opcode };
    thumb::dispatch(&mut ctx);
    assert_eq!(cpu.regs.read(0), 5);
}

/// Boundary behaviour (spec §8): `STM` with the base register in the list
/// stores the pre-writeback value of the base for the first transfer.
#[test]
fn stm_with_base_in_register_list_stores_the_pre_writeback_base_value() {
    let (mut cpu, mut soc, mut arbiter) = fresh_parts();
    cpu.switch_mode(Mode::Svc);
    let base_addr = 0x0200_1000u32;
    cpu.regs.write(13, base_addr);
    cpu.regs.write(0, 0xAAAA_AAAA);
    // STMIA r13!, {r0, r13} (cond=AL, P=0,U=1,S=0,W=1, Rn=13, reglist bit0|bit13)
    let opcode = 0xE8AD_2001u32;
    let mut ctx = ExecCtx { cpu: &mut cpu, soc: &mut soc, arbiter: &mut arbiter, opcode };
    arm::dispatch(&mut ctx);
    let stored_base = nds_core::core::cpu::memory::data_read(
        &mut cpu,
        &mut soc,
        &mut arbiter,
        base_addr.wrapping_add(4),
        nds_core::common::AccessWidth::Word,
        false,
    );
    assert_eq!(stored_base, base_addr);
}

/// Boundary behaviour (spec §8): branch-with-link sets `R14` to the address
/// of the instruction after the branch (`PC_of_branch + 4` on ARM).
#[test]
fn bl_sets_link_register_to_the_instruction_after_the_branch() {
    let (mut cpu, mut soc, mut arbiter) = fresh_parts();
    cpu.switch_mode(Mode::Svc);
    cpu.regs.set_pc(0x0200_0108); // branch instruction at 0x100, PC reads +8.
    // BL #0 (cond=AL, bits[27:25]=101, L=1, offset 0)
    let opcode = 0xEB00_0000u32;
    let mut ctx = ExecCtx { cpu: &mut cpu, soc: &mut soc, arbiter: &mut arbiter, opcode };
    arm::dispatch(&mut ctx);
    assert_eq!(cpu.regs.read(14), 0x0200_0104);
}

/// Boundary behaviour (spec §8): `LDM` with an empty register list still
/// writes nothing but does not panic or skip its cycle accounting path.
#[test]
fn ldm_with_empty_register_list_writes_no_registers() {
    let (mut cpu, mut soc, mut arbiter) = fresh_parts();
    cpu.switch_mode(Mode::Svc);
    cpu.regs.write(13, 0x0200_2000);
    let before: Vec<u32> = (0..13).map(|r| cpu.regs.read(r)).collect();
    // LDMIA r13, {} (cond=AL, P=0,U=1,S=0,W=0, Rn=13, reglist=0)
    let opcode = 0xE89D_0000u32;
    let mut ctx = ExecCtx { cpu: &mut cpu, soc: &mut soc, arbiter: &mut arbiter, opcode };
    arm::dispatch(&mut ctx);
    for r in 0..13 {
        assert_eq!(cpu.regs.read(r), before[r]);
    }
}
