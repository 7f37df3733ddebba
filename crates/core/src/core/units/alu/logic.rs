//! ALU logical operations and the `S`-bit flag computation they share.
//!
//! `AND`/`EOR`/`ORR`/`BIC`/`MOV`/`MVN`/`TST`/`TEQ` all set `N`/`Z` from the
//! result and `C` from the barrel shifter's carry-out (not from the ALU
//! itself); `V` is left unchanged. This module provides the flag helper used
//! by both the logical and arithmetic data-processing handlers.

/// Computes the `N`/`Z` flags for a 32-bit result, as every data-processing
/// instruction with `S` set does regardless of operation kind.
pub fn nz_flags(result: u32) -> (bool, bool) {
    (result & 0x8000_0000 != 0, result == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_result_sets_z() {
        assert_eq!(nz_flags(0), (false, true));
    }

    #[test]
    fn negative_result_sets_n() {
        assert_eq!(nz_flags(0x8000_0000), (true, false));
    }
}
