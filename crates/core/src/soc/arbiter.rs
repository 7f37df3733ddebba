//! Main-RAM bus-contention arbiter (spec §4.7, §5 "Concurrency & Resource
//! Model").
//!
//! The ARM9 and ARM7 cores (and, conceptually, DMA) contend for the one
//! shared main-RAM controller. This module is the single writer of the
//! RAM timestamp (spec §9 "Prefer ... an arbiter owns RAM timestamps and
//! each core borrows the arbiter for the duration of a memory
//! transaction" — no cross-core globals).

/// Which requester a main-RAM access belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requester {
    /// The ARM9 core.
    Arm9,
    /// The ARM7 core.
    Arm7,
    /// The DMA engine (modeled for timestamp bookkeeping only; DMA transfer
    /// semantics are out of scope per spec §1).
    Dma,
}

/// Per-region bus timing: non-sequential and sequential cycle costs for
/// 16-bit and 32-bit accesses (spec §4.6/§4.7's "region timing table").
#[derive(Clone, Copy, Debug)]
pub struct RegionTiming {
    /// Non-sequential 16-bit access cost.
    pub non_seq_16: u32,
    /// Sequential 16-bit access cost.
    pub seq_16: u32,
    /// Non-sequential 32-bit access cost.
    pub non_seq_32: u32,
    /// Sequential 32-bit access cost.
    pub seq_32: u32,
}

impl RegionTiming {
    /// Main-RAM timing (shared, contended region): matches melonDS's
    /// `kMainRAMTimings` at the emulator's default bus-clock divider.
    pub const MAIN_RAM: RegionTiming = RegionTiming { non_seq_16: 8, seq_16: 1, non_seq_32: 9, seq_32: 2 };
    /// Shared-WRAM timing (uncontended, always one cycle regardless of width).
    pub const SHARED_WRAM: RegionTiming = RegionTiming { non_seq_16: 1, seq_16: 1, non_seq_32: 1, seq_32: 1 };
    /// Cartridge-space timing in KEY2/normal mode (slower, non-contended).
    pub const CART: RegionTiming = RegionTiming { non_seq_16: 5, seq_16: 2, non_seq_32: 8, seq_32: 4 };
    /// BIOS ROM timing (ARM9 and ARM7 each have a private BIOS image).
    pub const BIOS: RegionTiming = RegionTiming { non_seq_16: 1, seq_16: 1, non_seq_32: 1, seq_32: 1 };

    /// Returns the non-sequential/sequential cost for `width`.
    pub fn cost(&self, width: crate::common::AccessWidth, sequential: bool) -> u32 {
        use crate::common::AccessWidth as W;
        match (width, sequential) {
            (W::Byte | W::Half, false) => self.non_seq_16,
            (W::Byte | W::Half, true) => self.seq_16,
            (W::Word, false) => self.non_seq_32,
            (W::Word, true) => self.seq_32,
        }
    }
}

/// Bus-contention state shared by both cores (spec §3 "Bus-contention
/// state").
pub struct Arbiter {
    arm9_timestamp: u64,
    arm7_timestamp: u64,
    dma_timestamp: u64,
    ram_timestamp: u64,
    last_ram_user: Option<Requester>,
    /// Priority bit: when timestamps tie, this requester wins (spec §4.7
    /// step 1). The ARM7 wins ties on real hardware (it runs half-speed and
    /// the arbiter favors it to keep both cores roughly in lockstep).
    priority: Requester,
}

impl Arbiter {
    /// Creates an arbiter with all timestamps at zero and ARM7 holding tie-break priority.
    pub fn new() -> Self {
        Self {
            arm9_timestamp: 0,
            arm7_timestamp: 0,
            dma_timestamp: 0,
            ram_timestamp: 0,
            last_ram_user: None,
            priority: Requester::Arm7,
        }
    }

    fn timestamp(&self, who: Requester) -> u64 {
        match who {
            Requester::Arm9 => self.arm9_timestamp,
            Requester::Arm7 => self.arm7_timestamp,
            Requester::Dma => self.dma_timestamp,
        }
    }

    fn set_timestamp(&mut self, who: Requester, t: u64) {
        match who {
            Requester::Arm9 => self.arm9_timestamp = t,
            Requester::Arm7 => self.arm7_timestamp = t,
            Requester::Dma => self.dma_timestamp = t,
        }
    }

    /// Reads `who`'s current timestamp (used by the scheduler to decide
    /// which core steps next, spec §5: "the outer emulator scheduler picks
    /// which core to step by comparing timestamps").
    pub fn current_time(&self, who: Requester) -> u64 {
        self.timestamp(who)
    }

    /// Directly sets `who`'s timestamp. Used by the wait-for-interrupt halt
    /// path: per spec §9's recorded decision, a halted core's timestamp is
    /// advanced to the scheduler's current global time at the moment an IRQ
    /// is latched (not jumped to the IRQ's own latch time), so it can't win
    /// future arbitrations on a stale clock.
    pub fn set_time(&mut self, who: Requester, t: u64) {
        self.set_timestamp(who, t);
    }

    /// Arbitrates a main-RAM access (spec §4.7 steps 1-4). `sequential` is
    /// true only when `who` is continuing the burst it last won (tracked by
    /// `last_ram_user`, consulted before charging cost). Returns the cycle
    /// cost charged and advances `who`'s timestamp and the RAM timestamp.
    pub fn access_main_ram(&mut self, who: Requester, width: crate::common::AccessWidth, sequential: bool) -> u32 {
        let mut t = self.timestamp(who);

        // Step 1: defer to a higher-or-equal-priority other requester whose
        // timestamp has not yet reached `t`.
        for other in [Requester::Arm9, Requester::Arm7, Requester::Dma] {
            if other == who {
                continue;
            }
            let other_t = self.timestamp(other);
            if other_t >= t && self.priority == other {
                t = other_t;
            }
        }

        // Step 2: the RAM controller itself may still be busy.
        if self.ram_timestamp > t {
            t = self.ram_timestamp;
        }

        let actually_sequential = sequential && self.last_ram_user == Some(who);
        let cost = RegionTiming::MAIN_RAM.cost(width, actually_sequential);

        let new_t = t + u64::from(cost);
        self.set_timestamp(who, new_t);
        self.ram_timestamp = new_t + 1;
        self.last_ram_user = Some(who);
        cost
    }

    /// Charges `who`'s timestamp for an access to a non-contended region
    /// (VRAM, shared WRAM, cartridge space, BIOS): no interaction with the
    /// other core's timestamp or the RAM timestamp (spec §4.7: "the arbiter
    /// simply advances X's timestamp ... and does not interact with the
    /// other core").
    pub fn access_uncontended(&mut self, who: Requester, timing: RegionTiming, width: crate::common::AccessWidth, sequential: bool) -> u32 {
        let cost = timing.cost(width, sequential);
        let t = self.timestamp(who) + u64::from(cost);
        self.set_timestamp(who, t);
        cost
    }

    /// Charges `who`'s timestamp for cycles that never touch the bus at all
    /// (TCM accesses, cache hits, internal ALU/shift stall cycles — ARM's
    /// `addCycles_C`/`addCycles_CI` pattern). Advances only `who`'s own
    /// timestamp; no contention, no RAM-timestamp interaction.
    pub fn charge_internal(&mut self, who: Requester, cycles: u32) {
        let t = self.timestamp(who) + u64::from(cycles);
        self.set_timestamp(who, t);
    }
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::AccessWidth;

    #[test]
    fn sequential_cost_only_applies_when_same_last_user() {
        let mut a = Arbiter::new();
        let first = a.access_main_ram(Requester::Arm9, AccessWidth::Word, false);
        let second = a.access_main_ram(Requester::Arm9, AccessWidth::Word, true);
        assert!(second < first);
        let third = a.access_main_ram(Requester::Arm7, AccessWidth::Word, true);
        assert_eq!(third, RegionTiming::MAIN_RAM.non_seq_32); // different last user, no seq discount
    }

    #[test]
    fn ram_controller_busy_time_is_one_past_the_requesters_new_timestamp() {
        let mut a = Arbiter::new();
        a.access_main_ram(Requester::Arm9, AccessWidth::Word, false);
        let arm9_new = a.current_time(Requester::Arm9);
        // The RAM controller is busy one cycle past whoever just used it, so a
        // second requester arriving at the same instant is pushed out by
        // exactly that one extra cycle (spec step 3: RAM's timestamp is set to
        // the requester's new timestamp + 1).
        a.set_time(Requester::Arm7, arm9_new);
        let cost = a.access_main_ram(Requester::Arm7, AccessWidth::Word, false);
        assert_eq!(a.current_time(Requester::Arm7), arm9_new + 1 + u64::from(cost));
    }

    #[test]
    fn uncontended_region_does_not_touch_other_core() {
        let mut a = Arbiter::new();
        a.set_time(Requester::Arm7, 100);
        a.access_uncontended(Requester::Arm9, RegionTiming::SHARED_WRAM, AccessWidth::Word, false);
        assert_eq!(a.current_time(Requester::Arm7), 100);
    }
}
