/*
 * Round-Robin Scheduling
 *
 * The baseline discipline: scan the table in slot order, resuming after
 * the previously dispatched slot, and take the first RUNNABLE process.
 * Combined with quantum preemption in the dispatcher this rotates the CPU
 * through every ready process.
 */

use crate::proc::{Proc, ProcState, SlotId};
use crate::table::ProcessTable;

use super::policy::SchedPolicy;

pub struct RoundRobin {
    /// Slot after which the next scan starts.
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        RoundRobin { cursor: 0 }
    }
}

impl SchedPolicy for RoundRobin {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn select_next(&mut self, table: &ProcessTable, _now: u64) -> Option<SlotId> {
        let n = table.len();
        for off in 0..n {
            let idx = (self.cursor + off) % n;
            let id = SlotId(idx);
            let p = table.slot(id).lock();
            if p.state == ProcState::Runnable {
                self.cursor = (idx + 1) % n;
                return Some(id);
            }
        }
        None
    }

    fn on_dispatch(&mut self, p: &mut Proc, now: u64) {
        p.started_tick = now;
        p.run_count += 1;
    }
}
