/*
 * Process Control Block
 *
 * One `Proc` per table slot. Every mutable field in here is guarded by the
 * slot's own lock (see table.rs); cross-slot relationships (the parent
 * field) are additionally serialized by the kernel's wait lock.
 *
 * The state machine is enforced, not advisory: `Proc::transition` panics
 * on any edge outside the legal lifecycle, because an illegal transition
 * means a broken invariant somewhere in the core, not a runtime condition
 * a caller could react to.
 */

use bitflags::bitflags;
use heapless::String;

use crate::params::{DEFAULT_PRIORITY, DEFAULT_TICKETS, NAME_LEN, NOFILE, NQUEUE};
use crate::platform::{Context, FileRef, Frame, Space};
use crate::sync::WaitChannel;

/// Process identifier. Unique and monotonically increasing among live
/// processes; never reused while its owner is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub usize);

impl core::fmt::Display for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable index of a slot in the process table arena.
///
/// Everything that needs a long-lived reference to another process (the
/// parent link, MLFQ queue membership) stores one of these instead of a
/// borrowed reference, so freeing and reusing a slot can never dangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub usize);

/// Process lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    /// Slot is free.
    Unused,
    /// Slot claimed by allocate(), setup still in progress.
    Used,
    /// Ready to run, waiting for a scheduler to pick it.
    Runnable,
    /// Currently on a CPU.
    Running,
    /// Blocked on a wait channel.
    Sleeping,
    /// Exited, waiting for the parent to reap it.
    Zombie,
}

impl ProcState {
    /// Short fixed-width label for the process listing.
    pub fn label(self) -> &'static str {
        match self {
            ProcState::Unused => "unused",
            ProcState::Used => "used  ",
            ProcState::Runnable => "runble",
            ProcState::Running => "run   ",
            ProcState::Sleeping => "sleep ",
            ProcState::Zombie => "zombie",
        }
    }
}

bitflags! {
    /// Per-slot flag bits, guarded by the slot lock like everything else.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProcFlags: u8 {
        /// Cooperative kill requested; observed at the next checkpoint.
        const KILLED = 1 << 0;
        /// Currently a member of exactly one MLFQ queue.
        const QUEUED = 1 << 1;
        /// Tick alarm armed via sigalarm.
        const ALARM_ARMED = 1 << 2;
        /// Alarm has fired; trap frame saved to the backup frame and the
        /// trap-return path should divert to the handler.
        const ALARM_PENDING = 1 << 3;
    }
}

/// Per-slot process record.
pub struct Proc {
    // Identity
    pub state: ProcState,
    pub pid: Pid,
    pub name: String<NAME_LEN>,
    /// Non-owning back-reference into the arena; rewritten by reparenting.
    /// Only read or written under the kernel's wait lock.
    pub parent: Option<SlotId>,

    // Synchronization
    pub flags: ProcFlags,
    pub chan: Option<WaitChannel>,
    pub exit_status: i32,

    // Scheduling
    pub priority: i64,
    pub tickets: u64,
    pub queue: usize,
    /// Tick of the last MLFQ enqueue/requeue; drives aging.
    pub queue_stamp: u64,

    // Statistics
    pub created_tick: u64,
    pub started_tick: u64,
    pub exited_tick: u64,
    /// Run ticks in the current quantum (reset by PBS on dispatch).
    pub run_ticks: u64,
    pub sleep_ticks: u64,
    pub total_run_ticks: u64,
    pub run_count: u64,
    /// Accumulated ticks spent at each MLFQ level while running.
    pub queue_ticks: [u64; NQUEUE],
    /// Run ticks since the last MLFQ dispatch.
    pub quantum_run: u64,

    // Syscall tracing and tick alarm (trap-boundary features; the frames
    // involved stay opaque)
    pub trace_mask: u64,
    pub alarm_interval: u64,
    pub alarm_elapsed: u64,
    pub alarm_handler: u64,

    // Resources owned exclusively by this slot, released on free
    pub context: Context,
    pub trapframe: Option<Frame>,
    pub backup_frame: Option<Frame>,
    pub space: Option<Space>,
    pub ofile: [Option<FileRef>; NOFILE],
    pub cwd: Option<FileRef>,
}

impl Proc {
    /// A free slot.
    pub fn unused() -> Self {
        Proc {
            state: ProcState::Unused,
            pid: Pid(0),
            name: String::new(),
            parent: None,
            flags: ProcFlags::empty(),
            chan: None,
            exit_status: 0,
            priority: 0,
            tickets: 0,
            queue: 0,
            queue_stamp: 0,
            created_tick: 0,
            started_tick: 0,
            exited_tick: 0,
            run_ticks: 0,
            sleep_ticks: 0,
            total_run_ticks: 0,
            run_count: 0,
            queue_ticks: [0; NQUEUE],
            quantum_run: 0,
            trace_mask: 0,
            alarm_interval: 0,
            alarm_elapsed: 0,
            alarm_handler: 0,
            context: Context::default(),
            trapframe: None,
            backup_frame: None,
            space: None,
            ofile: [const { None }; NOFILE],
            cwd: None,
        }
    }

    /// Move to `to`, panicking on any transition outside the legal
    /// lifecycle. `Used -> Unused` is legal only because allocate() must
    /// be able to unwind a half-built slot.
    pub fn transition(&mut self, to: ProcState) {
        use ProcState::*;
        let legal = matches!(
            (self.state, to),
            (Unused, Used)
                | (Used, Runnable)
                | (Used, Unused)
                | (Runnable, Running)
                | (Running, Runnable)
                | (Running, Sleeping)
                | (Running, Zombie)
                | (Sleeping, Runnable)
                | (Zombie, Unused)
        );
        if !legal {
            panic!(
                "illegal state transition {:?} -> {:?} (pid {})",
                self.state, to, self.pid
            );
        }
        self.state = to;
    }

    /// Claim this slot for a fresh process: assign the pid and install the
    /// scheduling defaults (base priority 60, one lottery ticket, MLFQ
    /// queue 0, all statistics zeroed).
    pub fn claim(&mut self, pid: Pid, now: u64) {
        self.transition(ProcState::Used);
        self.pid = pid;
        self.priority = DEFAULT_PRIORITY;
        self.tickets = DEFAULT_TICKETS;
        self.queue = 0;
        self.queue_stamp = now;
        self.created_tick = now;
        self.started_tick = 0;
        self.exited_tick = 0;
        self.run_ticks = 0;
        self.sleep_ticks = 0;
        self.total_run_ticks = 0;
        self.run_count = 0;
        self.queue_ticks = [0; NQUEUE];
        self.quantum_run = 0;
        self.trace_mask = 0;
        self.alarm_interval = 0;
        self.alarm_elapsed = 0;
        self.alarm_handler = 0;
        self.context.reset(pid);
    }

    pub fn set_name(&mut self, name: &str) {
        self.name.clear();
        // The field is fixed-size; longer names are truncated.
        for ch in name.chars() {
            if self.name.push(ch).is_err() {
                break;
            }
        }
    }

    pub fn killed(&self) -> bool {
        self.flags.contains(ProcFlags::KILLED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runnable_proc() -> Proc {
        let mut p = Proc::unused();
        p.claim(Pid(7), 3);
        p.transition(ProcState::Runnable);
        p
    }

    #[test]
    fn claim_installs_scheduling_defaults() {
        let mut p = Proc::unused();
        p.claim(Pid(1), 42);
        assert_eq!(p.state, ProcState::Used);
        assert_eq!(p.priority, DEFAULT_PRIORITY);
        assert_eq!(p.tickets, DEFAULT_TICKETS);
        assert_eq!(p.queue, 0);
        assert_eq!(p.created_tick, 42);
        assert_eq!(p.total_run_ticks, 0);
        assert_eq!(p.context.owner(), Some(Pid(1)));
    }

    #[test]
    fn full_lifecycle_is_legal() {
        let mut p = runnable_proc();
        p.transition(ProcState::Running);
        p.transition(ProcState::Sleeping);
        p.transition(ProcState::Runnable);
        p.transition(ProcState::Running);
        p.transition(ProcState::Zombie);
        p.transition(ProcState::Unused);
    }

    #[test]
    #[should_panic(expected = "illegal state transition")]
    fn runnable_cannot_become_zombie() {
        let mut p = runnable_proc();
        p.transition(ProcState::Zombie);
    }

    #[test]
    #[should_panic(expected = "illegal state transition")]
    fn sleeping_cannot_run_directly() {
        let mut p = runnable_proc();
        p.transition(ProcState::Running);
        p.transition(ProcState::Sleeping);
        p.transition(ProcState::Running);
    }

    #[test]
    fn long_names_are_truncated() {
        let mut p = Proc::unused();
        p.set_name("a-name-much-longer-than-the-field");
        assert_eq!(p.name.len(), NAME_LEN);
    }
}
