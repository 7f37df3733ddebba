//! Cooperative single-threaded core scheduler (spec §5 "Concurrency &
//! Resource Model").
//!
//! Both cores live on one host thread. There is no OS-level concurrency:
//! the outer scheduler picks which core steps next by comparing the two
//! timestamps the arbiter already tracks, and hands the whole run loop one
//! instruction at a time to whichever core is behind.

use crate::core::cpu::{execution, Cpu};
use crate::soc::arbiter::{Arbiter, Requester};
use crate::soc::Soc;

/// Advances whichever core is behind in wall-clock cycles by exactly one
/// instruction, then returns which core it was.
///
/// Ties are broken the same way bus-arbitration ties are: ARM7 runs first,
/// since it is the slower core and falling behind it would let ARM9 run
/// arbitrarily far ahead of a core with no buffering of its own.
pub fn step_once(cpu9: &mut Cpu, cpu7: &mut Cpu, soc: &mut Soc, arbiter: &mut Arbiter) -> Requester {
    let t9 = arbiter.current_time(Requester::Arm9);
    let t7 = arbiter.current_time(Requester::Arm7);

    if t7 <= t9 {
        execution::step(cpu7, soc, arbiter);
        Requester::Arm7
    } else {
        execution::step(cpu9, soc, arbiter);
        Requester::Arm9
    }
}

/// Runs both cores forward until the slower core's timestamp has advanced by
/// at least `cycles`. `cycles` measures elapsed bus time, not instructions:
/// a core blocked on contention or halted in `wait-for-interrupt` still
/// consumes wall-clock time without retiring anything.
pub fn run_cycles(cpu9: &mut Cpu, cpu7: &mut Cpu, soc: &mut Soc, arbiter: &mut Arbiter, cycles: u64) {
    let start = arbiter.current_time(Requester::Arm9).min(arbiter.current_time(Requester::Arm7));
    let target = start.saturating_add(cycles);

    loop {
        let behind = arbiter.current_time(Requester::Arm9).min(arbiter.current_time(Requester::Arm7));
        if behind >= target {
            break;
        }
        step_once(cpu9, cpu7, soc, arbiter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::cpu::CoreKind;

    fn fresh() -> (Cpu, Cpu, Soc, Arbiter) {
        let config = Config::default();
        let soc = Soc::new(vec![0u8; 0x1000], &config).expect("small rom accepted");
        (Cpu::new(CoreKind::Arm9), Cpu::new(CoreKind::Arm7), soc, Arbiter::new())
    }

    #[test]
    fn tied_timestamps_step_arm7_first() {
        let (mut cpu9, mut cpu7, mut soc, mut arbiter) = fresh();
        cpu9.request_flush(0x0200_0000);
        cpu7.request_flush(0x0000_0000);
        let who = step_once(&mut cpu9, &mut cpu7, &mut soc, &mut arbiter);
        assert_eq!(who, Requester::Arm7);
    }

    #[test]
    fn run_cycles_advances_the_slower_cores_clock_by_at_least_the_requested_amount() {
        let (mut cpu9, mut cpu7, mut soc, mut arbiter) = fresh();
        cpu9.request_flush(0x0200_0000);
        cpu7.request_flush(0x0000_0000);
        run_cycles(&mut cpu9, &mut cpu7, &mut soc, &mut arbiter, 100);
        let behind = arbiter.current_time(Requester::Arm9).min(arbiter.current_time(Requester::Arm7));
        assert!(behind >= 100);
    }
}
