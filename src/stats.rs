/*
 * Per-Tick Statistics Scan
 *
 * Charges every live slot for the tick that just elapsed: RUNNING slots
 * accumulate run time (plus queue-level time under MLFQ), SLEEPING slots
 * accumulate sleep time. Runs under each slot's own lock, one at a time,
 * from the timer path.
 */

use crate::proc::ProcState;
use crate::table::ProcessTable;

pub struct StatsTracker {
    /// MLFQ also charges per-queue time and the current quantum.
    mlfq: bool,
}

impl StatsTracker {
    pub fn new(mlfq: bool) -> Self {
        StatsTracker { mlfq }
    }

    /// Charge one tick to every RUNNING and SLEEPING slot.
    pub fn on_tick(&self, table: &ProcessTable) {
        for (_, slot) in table.iter() {
            let mut p = slot.lock();
            match p.state {
                ProcState::Running => {
                    p.run_ticks += 1;
                    p.total_run_ticks += 1;
                    if self.mlfq {
                        let q = p.queue;
                        p.queue_ticks[q] += 1;
                        p.quantum_run += 1;
                    }
                }
                ProcState::Sleeping => {
                    p.sleep_ticks += 1;
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::{Pid, ProcState};
    use crate::table::ProcessTable;

    fn table_with_states(states: &[ProcState]) -> ProcessTable {
        let table = ProcessTable::new();
        for (i, &st) in states.iter().enumerate() {
            let (_, mut p) = table.claim_slot(0).expect("slot");
            assert_eq!(p.pid, Pid(i + 1));
            p.transition(ProcState::Runnable);
            if st == ProcState::Running {
                p.transition(ProcState::Running);
            } else if st == ProcState::Sleeping {
                p.transition(ProcState::Running);
                p.transition(ProcState::Sleeping);
            }
        }
        table
    }

    #[test]
    fn running_and_sleeping_are_charged_separately() {
        use ProcState::*;
        let table = table_with_states(&[Running, Sleeping, Runnable]);
        let tracker = StatsTracker::new(false);
        for _ in 0..5 {
            tracker.on_tick(&table);
        }

        let runner = table.slot(crate::proc::SlotId(0)).lock();
        assert_eq!(runner.total_run_ticks, 5);
        assert_eq!(runner.sleep_ticks, 0);
        drop(runner);

        let sleeper = table.slot(crate::proc::SlotId(1)).lock();
        assert_eq!(sleeper.sleep_ticks, 5);
        assert_eq!(sleeper.total_run_ticks, 0);
        drop(sleeper);

        let ready = table.slot(crate::proc::SlotId(2)).lock();
        assert_eq!(ready.total_run_ticks, 0);
        assert_eq!(ready.sleep_ticks, 0);
    }

    #[test]
    fn mlfq_charges_the_current_queue_level() {
        use ProcState::*;
        let table = table_with_states(&[Running]);
        {
            let mut p = table.slot(crate::proc::SlotId(0)).lock();
            p.queue = 2;
        }
        let tracker = StatsTracker::new(true);
        for _ in 0..3 {
            tracker.on_tick(&table);
        }
        let p = table.slot(crate::proc::SlotId(0)).lock();
        assert_eq!(p.queue_ticks, [0, 0, 3, 0, 0]);
        assert_eq!(p.quantum_run, 3);
        assert_eq!(p.total_run_ticks, 3);
    }
}
