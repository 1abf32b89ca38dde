/*
 * Multi-Level Feedback Queue Scheduling
 *
 * Five priority levels, queue 0 highest. New processes enter queue 0.
 * A process that exhausts its level's time slice (1 << level ticks) is
 * demoted one level; one that blocks voluntarily re-enters its current
 * level when it wakes. Waiting RUNNABLE processes age: after 30 ticks at
 * one level without being dispatched they are promoted one level, which
 * keeps the bottom queues from starving.
 *
 * Queue membership is tracked two ways and both must agree: the QUEUED
 * flag on the slot, and the slot's id in exactly one of the level vectors.
 * select_next() repairs any divergence it finds (a member that is no
 * longer RUNNABLE, or whose recorded level moved) by dropping the stale
 * entry; the slot is re-enqueued at its current level on the next pass.
 */

use heapless::Vec;

use crate::params::{MLFQ_AGING_TICKS, NPROC, NQUEUE};
use crate::proc::{Proc, ProcFlags, ProcState, SlotId};
use crate::table::ProcessTable;

use super::policy::{Relinquish, SchedPolicy};

/// Time slice at a level, in ticks: 1, 2, 4, 8, 16.
pub fn time_slice(level: usize) -> u64 {
    1 << level
}

pub struct Mlfq {
    queues: [Vec<SlotId, NPROC>; NQUEUE],
}

impl Mlfq {
    pub fn new() -> Self {
        Mlfq {
            queues: [const { Vec::new() }; NQUEUE],
        }
    }

    fn remove(&mut self, level: usize, id: SlotId) {
        if let Some(pos) = self.queues[level].iter().position(|&m| m == id) {
            self.queues[level].remove(pos);
        }
    }

    fn enqueue(&mut self, level: usize, id: SlotId) {
        // NPROC capacity and one-queue-per-slot make this infallible.
        if self.queues[level].push(id).is_err() {
            panic!("mlfq: queue {level} overflow");
        }
    }
}

impl SchedPolicy for Mlfq {
    fn name(&self) -> &'static str {
        "mlfq"
    }

    fn select_next(&mut self, table: &ProcessTable, _now: u64) -> Option<SlotId> {
        // Admit every RUNNABLE slot that is not yet a queue member.
        for (id, slot) in table.iter() {
            let mut p = slot.lock();
            if p.state == ProcState::Runnable && !p.flags.contains(ProcFlags::QUEUED) {
                p.flags.insert(ProcFlags::QUEUED);
                let level = p.queue;
                drop(p);
                self.enqueue(level, id);
            }
        }

        // Highest non-empty level wins; drop stale entries as we go.
        for level in 0..NQUEUE {
            while let Some(&id) = self.queues[level].first() {
                let mut p = table.slot(id).lock();
                let fresh = p.state == ProcState::Runnable
                    && p.flags.contains(ProcFlags::QUEUED)
                    && p.queue == level;
                if fresh {
                    self.queues[level].remove(0);
                    p.flags.remove(ProcFlags::QUEUED);
                    return Some(id);
                }
                p.flags.remove(ProcFlags::QUEUED);
                drop(p);
                self.queues[level].remove(0);
            }
        }
        None
    }

    fn on_dispatch(&mut self, p: &mut Proc, now: u64) {
        p.started_tick = now;
        p.run_count += 1;
        p.queue_stamp = now;
        p.quantum_run = 0;
    }

    fn on_tick(&mut self, table: &ProcessTable, now: u64) {
        // Aging: promote RUNNABLE waiters stuck below the top level.
        for (id, slot) in table.iter() {
            let mut p = slot.lock();
            if p.state != ProcState::Runnable || p.queue == 0 {
                continue;
            }
            if now.saturating_sub(p.queue_stamp) < MLFQ_AGING_TICKS {
                continue;
            }
            let old = p.queue;
            p.queue = old - 1;
            p.queue_stamp = now;
            if p.flags.contains(ProcFlags::QUEUED) {
                let new = p.queue;
                drop(p);
                self.remove(old, id);
                self.enqueue(new, id);
            }
            log::trace!("mlfq: promoted slot {} to queue {}", id.0, old - 1);
        }
    }

    fn on_relinquish(&mut self, p: &mut Proc, reason: Relinquish, now: u64) {
        if reason == Relinquish::QuantumExpired && p.queue + 1 < NQUEUE {
            p.queue += 1;
        }
        p.queue_stamp = now;
    }
}
