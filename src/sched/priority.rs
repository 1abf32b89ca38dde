/*
 * Priority-Based Scheduling
 *
 * Each process carries a base priority in 0..=100 (lower is better). The
 * effective "dynamic" priority folds in recent behavior: processes that
 * spent their last stretch sleeping get a boost, processes that burned CPU
 * get penalized.
 *
 *   niceness = (sleep / (sleep + run)) * 10      (integer; 5 with no history)
 *   dp       = clamp(priority - niceness + 5, 0, 100)
 *
 * The division runs first, in integers, so niceness collapses to 0 unless
 * the whole stretch was spent asleep (then 10). That step function is the
 * contract; a mixed stretch earns no partial boost.
 *
 * Ties on dp break toward the process scheduled fewer times, then toward
 * the earlier creation tick. Dispatching resets the sleep/run history so
 * niceness always reflects the most recent stretch only.
 */

use crate::params::PRIORITY_MAX;
use crate::proc::{Proc, ProcState, SlotId};
use crate::table::ProcessTable;

use super::policy::SchedPolicy;

pub struct Pbs;

impl Pbs {
    pub fn new() -> Self {
        Pbs
    }
}

/// Recent-behavior bonus: 10 for an all-sleep stretch, 0 otherwise, 5
/// with no history since the last dispatch.
fn niceness(p: &Proc) -> i64 {
    let total = p.sleep_ticks + p.run_ticks;
    if total == 0 {
        return 5;
    }
    (p.sleep_ticks / total * 10) as i64
}

/// Effective priority, lower is better.
fn dynamic_priority(p: &Proc) -> i64 {
    (p.priority - niceness(p) + 5).clamp(0, PRIORITY_MAX)
}

impl SchedPolicy for Pbs {
    fn name(&self) -> &'static str {
        "pbs"
    }

    fn select_next(&mut self, table: &ProcessTable, _now: u64) -> Option<SlotId> {
        // (dp, run_count, created_tick) lexicographic minimum.
        let mut best: Option<(SlotId, (i64, u64, u64))> = None;
        for (id, slot) in table.iter() {
            let p = slot.lock();
            if p.state != ProcState::Runnable {
                continue;
            }
            let key = (dynamic_priority(&p), p.run_count, p.created_tick);
            match best {
                Some((_, best_key)) if key >= best_key => {}
                _ => best = Some((id, key)),
            }
        }
        best.map(|(id, _)| id)
    }

    fn on_dispatch(&mut self, p: &mut Proc, now: u64) {
        p.started_tick = now;
        p.run_count += 1;
        // History restarts with every dispatch.
        p.sleep_ticks = 0;
        p.run_ticks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DEFAULT_PRIORITY;

    fn ready(table: &ProcessTable, created: u64) -> SlotId {
        let (id, mut p) = table.claim_slot(created).expect("slot");
        p.transition(ProcState::Runnable);
        id
    }

    #[test]
    fn lower_base_priority_wins() {
        let table = ProcessTable::new();
        let _a = ready(&table, 0);
        let b = ready(&table, 0);
        table.slot(b).lock().priority = 10;

        let mut pbs = Pbs::new();
        assert_eq!(pbs.select_next(&table, 5), Some(b));
    }

    #[test]
    fn sleepers_earn_a_niceness_boost() {
        let table = ProcessTable::new();
        let burner = ready(&table, 0);
        let sleeper = ready(&table, 0);
        // Same base priority, different recent behavior.
        {
            let mut p = table.slot(burner).lock();
            p.run_count = 1;
            p.run_ticks = 8;
            p.sleep_ticks = 0; // niceness 0 -> dp = 60 + 5
        }
        {
            let mut p = table.slot(sleeper).lock();
            p.run_count = 1;
            p.run_ticks = 0;
            p.sleep_ticks = 8; // niceness 10 -> dp = 60 - 10 + 5
        }
        let mut pbs = Pbs::new();
        assert_eq!(pbs.select_next(&table, 9), Some(sleeper));
    }

    #[test]
    fn partial_sleep_earns_no_boost() {
        let table = ProcessTable::new();
        let mostly_asleep = ready(&table, 0);
        let burner = ready(&table, 2);
        {
            let mut p = table.slot(mostly_asleep).lock();
            p.sleep_ticks = 9;
            p.run_ticks = 1;
        }
        table.slot(burner).lock().run_ticks = 10;

        // 9/10 is 0 in integers: nine-tenths asleep is still niceness 0,
        // so both sit at dp 65 and the tie falls to the earlier arrival.
        assert_eq!(dynamic_priority(&table.slot(mostly_asleep).lock()), 65);
        assert_eq!(dynamic_priority(&table.slot(burner).lock()), 65);

        let mut pbs = Pbs::new();
        assert_eq!(pbs.select_next(&table, 12), Some(mostly_asleep));
    }

    #[test]
    fn dp_ties_break_by_run_count_then_creation() {
        let table = ProcessTable::new();
        let veteran = ready(&table, 0);
        let fresh = ready(&table, 2);
        table.slot(veteran).lock().run_count = 3;

        let mut pbs = Pbs::new();
        // Equal dp (both niceness 5): fewer dispatches wins.
        assert_eq!(pbs.select_next(&table, 5), Some(fresh));

        table.slot(fresh).lock().run_count = 3;
        // Equal again: earlier creation wins.
        assert_eq!(pbs.select_next(&table, 5), Some(veteran));
    }

    #[test]
    fn dispatch_resets_recent_history() {
        let table = ProcessTable::new();
        let id = ready(&table, 0);
        {
            let mut p = table.slot(id).lock();
            p.sleep_ticks = 4;
            p.run_ticks = 4;
        }
        let mut pbs = Pbs::new();
        let mut p = table.slot(id).lock();
        pbs.on_dispatch(&mut p, 7);
        assert_eq!(p.sleep_ticks, 0);
        assert_eq!(p.run_ticks, 0);
        assert_eq!(p.run_count, 1);
        assert_eq!(p.priority, DEFAULT_PRIORITY);
    }

    #[test]
    fn dp_clamps_to_the_priority_range() {
        let table = ProcessTable::new();
        let id = ready(&table, 0);
        {
            let mut p = table.slot(id).lock();
            p.priority = 100;
            p.run_count = 1;
            p.run_ticks = 9; // niceness 0 -> 100 + 5, clamped
        }
        let p = table.slot(id).lock();
        assert_eq!(dynamic_priority(&p), 100);
        drop(p);
        {
            let mut p = table.slot(id).lock();
            p.priority = 2;
            p.run_ticks = 0;
            p.sleep_ticks = 9; // niceness 10 -> 2 - 5, clamped
        }
        let p = table.slot(id).lock();
        assert_eq!(dynamic_priority(&p), 0);
    }
}
