/*
 * First-Come-First-Served Scheduling
 *
 * Non-preemptive: pick the RUNNABLE process with the earliest creation
 * tick and let it run until it blocks or exits (the dispatcher suppresses
 * quantum preemption for this policy). The strict `<` comparison makes the
 * lowest slot index win among equal creation ticks, keeping picks stable.
 */

use crate::proc::{Proc, ProcState, SlotId};
use crate::table::ProcessTable;

use super::policy::SchedPolicy;

pub struct Fcfs;

impl Fcfs {
    pub fn new() -> Self {
        Fcfs
    }
}

impl SchedPolicy for Fcfs {
    fn name(&self) -> &'static str {
        "fcfs"
    }

    fn select_next(&mut self, table: &ProcessTable, _now: u64) -> Option<SlotId> {
        let mut best: Option<(SlotId, u64)> = None;
        for (id, slot) in table.iter() {
            let p = slot.lock();
            if p.state != ProcState::Runnable {
                continue;
            }
            match best {
                Some((_, tick)) if p.created_tick >= tick => {}
                _ => best = Some((id, p.created_tick)),
            }
        }
        best.map(|(id, _)| id)
    }

    fn on_dispatch(&mut self, p: &mut Proc, now: u64) {
        p.started_tick = now;
        p.run_count += 1;
    }
}
