//! ALU addition/subtraction with carry, and flag computation.
//!
//! ARM's `ADC`/`SBC`/`RSC` thread the `C` flag through as a carry/borrow input,
//! and every arithmetic data-processing op (not just the logical ones) can set
//! `N`/`Z`/`C`/`V` when the `S` bit is set. `C` is carry-out of the addition;
//! `V` is signed overflow.

/// The result of an ALU addition/subtraction: the 32-bit result plus the
/// carry-out and signed-overflow flags it produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddResult {
    /// The 32-bit result.
    pub value: u32,
    /// Carry-out (unsigned overflow of the addition).
    pub carry: bool,
    /// Signed overflow.
    pub overflow: bool,
}

/// Computes `a + b + carry_in` with full carry/overflow flag semantics.
///
/// Used directly by `ADD`/`ADC`/`CMN`, and by [`sub`] (which negates `b`).
pub fn add_with_carry(a: u32, b: u32, carry_in: bool) -> AddResult {
    let (r1, c1) = a.overflowing_add(b);
    let (result, c2) = r1.overflowing_add(carry_in as u32);
    let carry = c1 || c2;
    let overflow = ((a ^ b) & 0x8000_0000 == 0) && ((a ^ result) & 0x8000_0000 != 0);
    AddResult {
        value: result,
        carry,
        overflow,
    }
}

/// Computes `a - b - (1 - carry_in)`, ARM's subtract-with-borrow convention
/// (`C` set means "no borrow"). Used by `SUB`/`SBC`/`CMP`/`RSB`/`RSC` via
/// operand ordering at the call site.
pub fn sub_with_carry(a: u32, b: u32, carry_in: bool) -> AddResult {
    add_with_carry(a, !b, carry_in)
}

/// Plain `a + b` with no incoming carry (`ADD`/`CMN`).
pub fn add(a: u32, b: u32) -> AddResult {
    add_with_carry(a, b, false)
}

/// Plain `a - b` with no incoming borrow (`SUB`/`CMP`/`RSB`), i.e. `C` forced
/// to the "no borrow yet" state of `true`.
pub fn sub(a: u32, b: u32) -> AddResult {
    sub_with_carry(a, b, true)
}
