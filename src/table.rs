/*
 * Process Table
 *
 * Fixed-capacity arena of process slots. Each slot's record sits behind
 * its own spin lock so lifecycle operations and scheduler scans touching
 * different slots never contend. The pid counter has a dedicated lock of
 * its own.
 *
 * Slots are referenced by SlotId (arena index) everywhere else in the
 * core; the table hands out &Mutex<Proc>, never long-lived borrows of the
 * records themselves.
 */

use alloc::vec::Vec;
use spin::{Mutex, MutexGuard};

use crate::params::NPROC;
use crate::proc::{Pid, Proc, ProcState, SlotId};

pub struct ProcessTable {
    slots: Vec<Mutex<Proc>>,
    /// Guards pid assignment only.
    next_pid: Mutex<usize>,
}

impl ProcessTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(NPROC);
        for _ in 0..NPROC {
            slots.push(Mutex::new(Proc::unused()));
        }
        ProcessTable {
            slots,
            next_pid: Mutex::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, id: SlotId) -> &Mutex<Proc> {
        &self.slots[id.0]
    }

    /// Iterate over every slot with its arena index.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &Mutex<Proc>)> {
        self.slots.iter().enumerate().map(|(i, m)| (SlotId(i), m))
    }

    /// Assign the next pid. Pids only ever move forward.
    pub fn alloc_pid(&self) -> Pid {
        let mut next = self.next_pid.lock();
        let pid = Pid(*next);
        *next += 1;
        pid
    }

    /// Scan for an UNUSED slot and claim it: assign a fresh pid and the
    /// scheduling defaults. Returns with the slot's lock still held so the
    /// caller can finish resource setup without racing another allocator.
    /// None when the table is full.
    pub fn claim_slot(&self, now: u64) -> Option<(SlotId, MutexGuard<'_, Proc>)> {
        for (id, slot) in self.iter() {
            let mut p = slot.lock();
            if p.state == ProcState::Unused {
                let pid = self.alloc_pid();
                p.claim(pid, now);
                return Some((id, p));
            }
        }
        None
    }

    /// Find the live slot owning `pid`.
    pub fn find(&self, pid: Pid) -> Option<SlotId> {
        for (id, slot) in self.iter() {
            let p = slot.lock();
            if p.state != ProcState::Unused && p.pid == pid {
                return Some(id);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pids_are_strictly_increasing() {
        let table = ProcessTable::new();
        let mut last = 0;
        for _ in 0..10 {
            let (_, p) = table.claim_slot(0).expect("slot");
            assert!(p.pid.0 > last);
            last = p.pid.0;
        }
    }

    #[test]
    fn claim_fails_when_table_is_full() {
        let table = ProcessTable::new();
        for _ in 0..NPROC {
            let (_, mut p) = table.claim_slot(0).expect("slot");
            // Park the slot out of UNUSED so the next scan skips it.
            p.transition(ProcState::Runnable);
        }
        assert!(table.claim_slot(0).is_none());
    }

    #[test]
    fn find_matches_live_pids_only() {
        let table = ProcessTable::new();
        let (id, mut p) = table.claim_slot(0).expect("slot");
        let pid = p.pid;
        p.transition(ProcState::Runnable);
        drop(p);

        assert_eq!(table.find(pid), Some(id));
        assert_eq!(table.find(Pid(9999)), None);
    }
}
