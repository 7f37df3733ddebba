//! ARM processor modes.
//!
//! This module defines the privilege modes supported by the ARMv5TE/ARMv4T
//! architectures. It implements the following:
//! 1. **Mode classification:** User, FIQ, IRQ, Supervisor, Abort, Undefined, System.
//! 2. **Encoding:** Conversion between the CPSR's low 5 mode bits and the enum.
//! 3. **Register banking:** Which of the six shadow register banks a mode uses.

/// ARM processor mode, encoded in CPSR bits [4:0].
///
/// Every mode except `User` and `System` has its own banked `r13`/`r14`
/// (and FIQ additionally banks `r8`-`r12`), plus its own `SPSR` used to
/// restore CPSR on exception return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// User mode (0x10). Lowest privilege; no SPSR.
    User = 0x10,
    /// Fast Interrupt mode (0x11). Banks `r8`-`r14` for minimal-latency dispatch.
    Fiq = 0x11,
    /// Interrupt mode (0x12).
    Irq = 0x12,
    /// Supervisor mode (0x13). Entered on reset and `SWI`.
    Svc = 0x13,
    /// Abort mode (0x17). Entered on data/prefetch abort.
    Abt = 0x17,
    /// Undefined mode (0x1B). Entered on undefined instruction.
    Und = 0x1B,
    /// System mode (0x1F). Full privilege, shares User's register bank.
    Sys = 0x1F,
}

impl Mode {
    /// Decodes the low 5 CPSR bits into a `Mode`.
    ///
    /// Unrecognized encodings fall back to `User`; real hardware treats them
    /// as reserved, but a permissive decode keeps malformed CPSR writes from
    /// panicking the interpreter.
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0x1F {
            0x10 => Mode::User,
            0x11 => Mode::Fiq,
            0x12 => Mode::Irq,
            0x13 => Mode::Svc,
            0x17 => Mode::Abt,
            0x1B => Mode::Und,
            0x1F => Mode::Sys,
            _ => Mode::User,
        }
    }

    /// Returns the low-5-bit CPSR encoding of this mode.
    pub fn bits(self) -> u32 {
        self as u32
    }

    /// Returns whether this mode has full (privileged) access to CP15 and
    /// mode-change-capable CPSR writes.
    pub fn is_privileged(self) -> bool {
        !matches!(self, Mode::User)
    }

    /// Returns whether this mode has its own banked SPSR.
    pub fn has_spsr(self) -> bool {
        !matches!(self, Mode::User | Mode::Sys)
    }

    /// Returns the register bank index (0-5) used to select banked `r13`/`r14`
    /// (and FIQ's `r8`-`r12`) in [`super::gpr::Registers`].
    ///
    /// `User` and `System` share bank 0, matching real hardware's single
    /// User/System register file.
    pub fn bank_index(self) -> usize {
        match self {
            Mode::User | Mode::Sys => 0,
            Mode::Fiq => 1,
            Mode::Irq => 2,
            Mode::Svc => 3,
            Mode::Abt => 4,
            Mode::Und => 5,
        }
    }

    /// Human-readable mode name, matching ARM reference manual naming.
    pub fn name(&self) -> &'static str {
        match self {
            Mode::User => "User",
            Mode::Fiq => "FIQ",
            Mode::Irq => "IRQ",
            Mode::Svc => "Supervisor",
            Mode::Abt => "Abort",
            Mode::Und => "Undefined",
            Mode::Sys => "System",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Number of banked register sets (User/System, FIQ, IRQ, SVC, ABT, UND).
pub const NUM_BANKS: usize = 6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bits() {
        for m in [
            Mode::User,
            Mode::Fiq,
            Mode::Irq,
            Mode::Svc,
            Mode::Abt,
            Mode::Und,
            Mode::Sys,
        ] {
            assert_eq!(Mode::from_bits(m.bits()), m);
        }
    }

    #[test]
    fn user_and_system_share_a_bank() {
        assert_eq!(Mode::User.bank_index(), Mode::Sys.bank_index());
    }

    #[test]
    fn only_user_lacks_spsr() {
        assert!(!Mode::User.has_spsr());
        assert!(Mode::Svc.has_spsr());
    }
}
