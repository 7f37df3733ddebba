//! Decode table entry: opcode classification and the static info record.
//!
//! Spec §4.1: each ARM/THUMB decode table entry is `{handler function, info
//! record}`. The info record encodes opcode kind, source/destination
//! register bitmasks, flag read/write masks, an end-of-block flag, and a
//! special-kind tag for memory reads/writes and PC-relative literal loads
//! (consumed by the external JIT's literal-pooling pass, not by this
//! interpreter, but part of the decode contract it must still produce).

bitflags::bitflags! {
    /// A bitmask over the four ARM condition flags, used for both
    /// flag-read and flag-write masks in [`DecodedInfo`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FlagMask: u8 {
        /// Negative flag.
        const N = 1 << 0;
        /// Zero flag.
        const Z = 1 << 1;
        /// Carry flag.
        const C = 1 << 2;
        /// Overflow flag.
        const V = 1 << 3;
    }
}

/// One tag per ARM/THUMB instruction family, used to dispatch to a handler
/// and to classify the instruction for statistics and the JIT interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    /// Data-processing (`AND`..`MVN`), register or immediate operand 2.
    DataProcessing,
    /// `MUL`/`MLA`/`UMULL`/`UMLAL`/`SMULL`/`SMLAL` and THUMB's multiply.
    Multiply,
    /// Single-word/byte `LDR`/`STR`.
    SingleDataTransfer,
    /// `LDRH`/`STRH`/`LDRSB`/`LDRSH` halfword and signed-byte transfers.
    HalfwordTransfer,
    /// `LDM`/`STM` block data transfer.
    BlockDataTransfer,
    /// `SWP`/`SWPB` single data swap.
    Swap,
    /// `B`/`BL`/`BX`/`BLX` branch family.
    Branch,
    /// `SWI`/`SWI` software interrupt.
    SoftwareInterrupt,
    /// `MRS`/`MSR` PSR transfer.
    PsrTransfer,
    /// `CDP`/`MCR`/`MRC`/`LDC`/`STC` coprocessor instructions.
    Coprocessor,
    /// ARMv5TE `CLZ`, `QADD` family, and the DSP multiply-accumulates.
    ArmV5Extension,
    /// Decodes to the undefined-instruction exception.
    Undefined,
}

/// A memory-access classification finer than [`OpKind`], identifying reads,
/// writes, and PC-relative literal loads for the JIT literal-pooling
/// interface described by spec §4.1/§9.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecialKind {
    /// Not a memory access.
    None,
    /// A data memory read.
    MemoryRead,
    /// A data memory write.
    MemoryWrite,
    /// A PC-relative literal load (`LDR Rd, [PC, #imm]` or THUMB's
    /// PC-relative `LDR`); the JIT must track these for literal pooling.
    PcRelativeLiteralLoad,
}

/// The static info record produced for every decode table entry.
///
/// Immutable once built; shared by reference from the decode table so
/// building the table is a one-time startup cost (spec §4.1: "C1 is a
/// constant table built at startup").
#[derive(Clone, Copy, Debug)]
pub struct DecodedInfo {
    /// Instruction family tag.
    pub opcode_kind: OpKind,
    /// Bitmask (bit `i` set means register `ri` is read) of source registers.
    pub src_mask: u16,
    /// Bitmask of destination registers.
    pub dst_mask: u16,
    /// Condition flags this instruction reads (beyond the condition field).
    pub flag_read: FlagMask,
    /// Condition flags this instruction may write.
    pub flag_write: FlagMask,
    /// True when this instruction can end a basic block (branches, and any
    /// data-processing/load instruction that writes `r15`).
    pub end_of_block: bool,
    /// Memory-access classification for the JIT literal-pooling interface.
    pub special_kind: SpecialKind,
}

impl DecodedInfo {
    /// An info record for an instruction that decodes to the undefined
    /// exception: no registers touched, ends the block (control transfers
    /// to the undefined-instruction vector).
    pub const UNDEFINED: DecodedInfo = DecodedInfo {
        opcode_kind: OpKind::Undefined,
        src_mask: 0,
        dst_mask: 0,
        flag_read: FlagMask::empty(),
        flag_write: FlagMask::empty(),
        end_of_block: true,
        special_kind: SpecialKind::None,
    };
}
