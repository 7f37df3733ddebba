//! The ARM barrel shifter.
//!
//! Every data-processing instruction's operand 2 (when it is a register) passes
//! through the barrel shifter before reaching the ALU. The shifter also produces
//! a carry-out that feeds the `S`-bit flag update for logical operations (spec
//! §4.1 "flag-read and flag-write masks").

/// The four ARM shift types, encoded in instruction bits [6:5].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftKind {
    /// Logical shift left.
    Lsl,
    /// Logical shift right.
    Lsr,
    /// Arithmetic shift right.
    Asr,
    /// Rotate right (and RRX, the special zero-amount encoding).
    Ror,
}

impl ShiftKind {
    /// Decodes the 2-bit shift-type field.
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0b00 => ShiftKind::Lsl,
            0b01 => ShiftKind::Lsr,
            0b10 => ShiftKind::Asr,
            _ => ShiftKind::Ror,
        }
    }
}

/// Applies a barrel-shifter operation, returning `(result, carry_out)`.
///
/// `amount` is the shift amount (0-255, from an immediate or the bottom byte
/// of a register). `carry_in` is the current `C` flag, consulted for `ROR #0`
/// (which decodes to RRX: a 33-bit rotate through the carry flag) and for
/// zero-amount shifts, which pass the operand through unchanged and leave
/// carry-out equal to carry-in. `immediate` distinguishes an immediate shift
/// amount of literal zero (which LSR/ASR/ROR reinterpret as 32/32/RRX) from a
/// register-supplied amount that happens to be zero (a true no-op).
pub fn shift(kind: ShiftKind, value: u32, amount: u32, carry_in: bool, immediate: bool) -> (u32, bool) {
    match kind {
        ShiftKind::Lsl => lsl(value, amount, carry_in),
        ShiftKind::Lsr => lsr(value, amount, carry_in, immediate),
        ShiftKind::Asr => asr(value, amount, carry_in, immediate),
        ShiftKind::Ror => ror(value, amount, carry_in, immediate),
    }
}

fn lsl(value: u32, amount: u32, carry_in: bool) -> (u32, bool) {
    match amount {
        0 => (value, carry_in),
        1..=31 => (value << amount, (value >> (32 - amount)) & 1 != 0),
        32 => (0, value & 1 != 0),
        _ => (0, false),
    }
}

fn lsr(value: u32, amount: u32, carry_in: bool, immediate: bool) -> (u32, bool) {
    // `LSR #0` in an immediate encoding means `LSR #32` (there is no
    // immediate-zero LSR); a register-supplied amount of 0 is a genuine no-op.
    let amount = if immediate && amount == 0 { 32 } else { amount };
    match amount {
        0 => (value, carry_in),
        1..=31 => (value >> amount, (value >> (amount - 1)) & 1 != 0),
        32 => (0, value & 0x8000_0000 != 0),
        _ => (0, false),
    }
}

fn asr(value: u32, amount: u32, carry_in: bool, immediate: bool) -> (u32, bool) {
    let amount = if immediate && amount == 0 { 32 } else { amount };
    let signed = value as i32;
    match amount {
        0 => (value, carry_in),
        1..=31 => ((signed >> amount) as u32, (value >> (amount - 1)) & 1 != 0),
        _ => {
            let filled = if signed < 0 { 0xFFFF_FFFF } else { 0 };
            (filled, signed < 0)
        }
    }
}

fn ror(value: u32, amount: u32, carry_in: bool, immediate: bool) -> (u32, bool) {
    if immediate && amount == 0 {
        // RRX: 33-bit rotate right through the carry flag.
        let result = (value >> 1) | if carry_in { 0x8000_0000 } else { 0 };
        return (result, value & 1 != 0);
    }
    let amount = amount & 0x1F;
    match amount {
        0 => (value, carry_in),
        _ => (value.rotate_right(amount), (value >> (amount - 1)) & 1 != 0),
    }
}
