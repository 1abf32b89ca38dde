/*
 * Scheduling Policy Interface
 *
 * Mechanism lives in sched/mod.rs; policy is anything implementing
 * `SchedPolicy` behind the kernel's policy lock. Policies see the whole
 * table and pick a slot; the dispatcher re-validates the pick under the
 * slot lock, so a policy returning a stale slot costs a retry, never a
 * broken invariant.
 *
 * Lock order within a policy method: the policy lock is already held;
 * slot locks are taken one at a time and never held across the return.
 */

use alloc::boxed::Box;

use crate::proc::{Proc, SlotId};
use crate::table::ProcessTable;

/// Why a process left the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relinquish {
    /// Blocked, exited, or yielded on its own.
    Voluntary,
    /// Ran out its time slice.
    QuantumExpired,
}

/// A pluggable CPU-scheduling discipline.
pub trait SchedPolicy: Send {
    fn name(&self) -> &'static str;

    /// Pick the next slot to run. The dispatcher re-checks RUNNABLE under
    /// the slot lock; returning a stale candidate is harmless.
    fn select_next(&mut self, table: &ProcessTable, now: u64) -> Option<SlotId>;

    /// The picked process is about to go RUNNING. Called under its slot
    /// lock.
    fn on_dispatch(&mut self, p: &mut Proc, now: u64) {
        let _ = (p, now);
    }

    /// Once-per-tick aging hook, from the timer path.
    fn on_tick(&mut self, table: &ProcessTable, now: u64) {
        let _ = (table, now);
    }

    /// The process gave up the CPU. Called under its slot lock.
    fn on_relinquish(&mut self, p: &mut Proc, reason: Relinquish, now: u64) {
        let _ = (p, reason, now);
    }
}

/// The shipped disciplines. Selected at kernel construction; fixed for
/// the lifetime of the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    RoundRobin,
    Fcfs,
    Pbs,
    Lbs,
    Mlfq,
}

impl PolicyKind {
    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::RoundRobin => "round-robin",
            PolicyKind::Fcfs => "fcfs",
            PolicyKind::Pbs => "pbs",
            PolicyKind::Lbs => "lbs",
            PolicyKind::Mlfq => "mlfq",
        }
    }

    /// Whether the dispatcher preempts on quantum expiry. FCFS runs each
    /// pick to completion or a voluntary block.
    pub fn preemptive(self) -> bool {
        !matches!(self, PolicyKind::Fcfs)
    }

    pub fn build(self) -> Box<dyn SchedPolicy> {
        match self {
            PolicyKind::RoundRobin => Box::new(super::round_robin::RoundRobin::new()),
            PolicyKind::Fcfs => Box::new(super::fcfs::Fcfs::new()),
            PolicyKind::Pbs => Box::new(super::priority::Pbs::new()),
            PolicyKind::Lbs => Box::new(super::lottery::Lottery::new()),
            PolicyKind::Mlfq => Box::new(super::mlfq::Mlfq::new()),
        }
    }
}
