/*
 * Lottery-Based Scheduling
 *
 * Every RUNNABLE process holds a ticket count (default 1, set through
 * settickets and inherited across fork). Each pick draws a winning ticket
 * from the live total and walks the table accumulating ticket counts until
 * the draw falls inside some process's range, so a process's share of the
 * CPU is proportional to its share of the tickets.
 *
 * The generator is Park-Miller minimal standard (the classic 16807
 * multiplicative congruential step over 2^31-1). Two modes:
 *
 * - `new()` reseeds the generator to 1 before every draw, reproducing the
 *   shipped behavior exactly: every draw yields 33613 and the winner is
 *   fully determined by the ticket layout.
 * - `seeded(s)` lets the state run free, giving a genuinely distributed
 *   (but reproducible) ticket lottery.
 */

use crate::proc::{Proc, ProcState, SlotId};
use crate::table::ProcessTable;

use super::policy::SchedPolicy;

/// One Park-Miller step. Matches the classic do_rand(): output and next
/// state are in 0..=0x7ffffffd.
fn do_rand(ctx: &mut u64) -> u64 {
    let x = (*ctx % 0x7fff_fffe) + 1;
    let hi = x / 127_773;
    let lo = x % 127_773;
    let mut next = 16_807 * lo;
    let sub = 2_836 * hi;
    if next >= sub {
        next -= sub;
    } else {
        next = next + 0x7fff_ffff - sub;
    }
    next -= 1;
    *ctx = next;
    next
}

pub struct Lottery {
    ctx: u64,
    /// Reseed to 1 before every draw (the shipped behavior).
    fixed_seed: bool,
}

impl Lottery {
    pub fn new() -> Self {
        Lottery {
            ctx: 1,
            fixed_seed: true,
        }
    }

    /// Free-running generator with a caller-chosen seed.
    pub fn seeded(seed: u64) -> Self {
        Lottery {
            ctx: seed % 0x7fff_fffe,
            fixed_seed: false,
        }
    }

    fn draw(&mut self, total: u64) -> u64 {
        if self.fixed_seed {
            self.ctx = 1;
        }
        do_rand(&mut self.ctx) % total
    }
}

impl SchedPolicy for Lottery {
    fn name(&self) -> &'static str {
        "lbs"
    }

    fn select_next(&mut self, table: &ProcessTable, _now: u64) -> Option<SlotId> {
        let mut total = 0u64;
        for (_, slot) in table.iter() {
            let p = slot.lock();
            if p.state == ProcState::Runnable {
                total += p.tickets;
            }
        }
        if total == 0 {
            return None;
        }

        let winner = self.draw(total);
        let mut cumulative = 0u64;
        for (id, slot) in table.iter() {
            let p = slot.lock();
            if p.state != ProcState::Runnable {
                continue;
            }
            cumulative += p.tickets;
            if cumulative > winner {
                return Some(id);
            }
        }
        // The table changed between the two scans; retry next pass.
        None
    }

    fn on_dispatch(&mut self, p: &mut Proc, now: u64) {
        p.started_tick = now;
        p.run_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_with_tickets(table: &ProcessTable, tickets: u64) -> SlotId {
        let (id, mut p) = table.claim_slot(0).expect("slot");
        p.tickets = tickets;
        p.transition(ProcState::Runnable);
        id
    }

    #[test]
    fn park_miller_first_step_from_one() {
        let mut ctx = 1;
        assert_eq!(do_rand(&mut ctx), 33613);
        // Free-running continues the sequence instead of repeating.
        assert_ne!(do_rand(&mut ctx), 33613);
    }

    #[test]
    fn fixed_seed_mode_is_fully_deterministic() {
        let table = ProcessTable::new();
        let a = ready_with_tickets(&table, 10);
        let _b = ready_with_tickets(&table, 10);

        // draw = 33613 % 20 = 13 -> second slot; after a leaves, the
        // modulus shrinks and the winner shifts accordingly.
        let mut lbs = Lottery::new();
        let first = lbs.select_next(&table, 0).expect("pick");
        assert_eq!(first.0, 1);
        assert_eq!(lbs.select_next(&table, 0), Some(first));

        {
            let mut p = table.slot(a).lock();
            p.transition(ProcState::Running);
            p.transition(ProcState::Sleeping);
        }
        // draw = 33613 % 10 = 3 -> only b is in the race.
        assert_eq!(lbs.select_next(&table, 0), Some(first));
    }

    #[test]
    fn zero_total_tickets_selects_nothing() {
        let table = ProcessTable::new();
        let _a = ready_with_tickets(&table, 0);
        let mut lbs = Lottery::new();
        assert_eq!(lbs.select_next(&table, 0), None);
    }

    #[test]
    fn seeded_mode_respects_ticket_proportions() {
        let table = ProcessTable::new();
        let a = ready_with_tickets(&table, 10);
        let b = ready_with_tickets(&table, 20);
        let c = ready_with_tickets(&table, 10);

        let mut lbs = Lottery::seeded(12345);
        let mut wins = [0u32; 3];
        for _ in 0..4000 {
            match lbs.select_next(&table, 0) {
                Some(id) if id == a => wins[0] += 1,
                Some(id) if id == b => wins[1] += 1,
                Some(id) if id == c => wins[2] += 1,
                other => panic!("unexpected pick {:?}", other),
            }
        }
        // Expected 25% / 50% / 25%; a generous band keeps the test robust
        // to the particular seed.
        assert!((800..1200).contains(&wins[0]), "wins {:?}", wins);
        assert!((1800..2200).contains(&wins[1]), "wins {:?}", wins);
        assert!((800..1200).contains(&wins[2]), "wins {:?}", wins);
        assert_eq!(wins.iter().sum::<u32>(), 4000);
    }
}
