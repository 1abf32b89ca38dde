/*
 * Kernel Core - Process Lifecycle
 *
 * This module ties the process table, the synchronization protocol and the
 * scheduling machinery together and implements the lifecycle operations:
 * allocate, fork, exit, wait/waitx, reparent, kill, plus the tick entry
 * point driven by the external timer.
 *
 * LOCK ORDER (fixed, crate-wide):
 * ==============================
 *
 *   wait lock (parent/child graph + sleep gating)
 *     -> tick lock
 *       -> policy lock
 *         -> slot locks (one at a time except fork's child+parent pair)
 *
 * The wait lock is always acquired before any slot lock and never after
 * one. Resource exhaustion is recovered locally (allocate/fork unwind and
 * return None); invariant violations panic.
 */

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::Write;

use spin::{Mutex, MutexGuard, Once};

use crate::params::{NCPU, PRIORITY_MAX};
use crate::platform::Platform;
use crate::proc::{Pid, Proc, ProcFlags, ProcState, SlotId};
use crate::sched::policy::{PolicyKind, SchedPolicy};
use crate::sched::Cpu;
use crate::stats::StatsTracker;
use crate::sync::WaitChannel;
use crate::table::ProcessTable;

/// Result of one wait()/waitx() attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A zombie child was found and its slot freed.
    Reaped {
        pid: Pid,
        status: i32,
        /// Lifetime run ticks of the reaped child.
        run_ticks: u64,
        /// All non-running time: exit tick - creation tick - run ticks.
        wait_ticks: u64,
    },
    /// The caller has no children, or has itself been killed.
    NoChildren,
    /// Children exist but none is a zombie yet; the caller is now
    /// SLEEPING on its child-exit channel and must relinquish and retry.
    Blocked,
}

/// The process-lifecycle and scheduling core.
///
/// One instance per running system. Everything the surrounding kernel
/// cannot provide through [`Platform`] lives in here.
pub struct Kernel {
    table: ProcessTable,
    platform: Arc<dyn Platform>,
    pub(crate) policy: Mutex<Box<dyn SchedPolicy>>,
    policy_kind: PolicyKind,
    stats: StatsTracker,
    /// Serializes parent/child linkage and gates sleep/wakeup for wait().
    pub(crate) wait_lock: Mutex<()>,
    /// The global logical clock, advanced by tick().
    ticks: Mutex<u64>,
    cpus: Vec<Cpu>,
    /// Root-of-the-process-tree identity, set once by userinit().
    init_proc: Once<(SlotId, Pid)>,
    /// Fires the platform's fs_init() on the very first dispatch.
    pub(crate) first_dispatch: Once<()>,
}

impl Kernel {
    /// Build a kernel with the given scheduling policy and core count.
    pub fn new(policy: PolicyKind, ncpu: usize, platform: Arc<dyn Platform>) -> Self {
        assert!(ncpu >= 1 && ncpu <= NCPU, "ncpu out of range");
        let cpus = (0..ncpu).map(Cpu::new).collect();
        log::info!(
            "kernel: policy {} on {} cpu(s)",
            policy.name(),
            ncpu
        );
        Kernel {
            table: ProcessTable::new(),
            platform,
            policy: Mutex::new(policy.build()),
            policy_kind: policy,
            stats: StatsTracker::new(policy == PolicyKind::Mlfq),
            wait_lock: Mutex::new(()),
            ticks: Mutex::new(0),
            cpus,
            init_proc: Once::new(),
            first_dispatch: Once::new(),
        }
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    pub(crate) fn platform(&self) -> &dyn Platform {
        &*self.platform
    }

    pub(crate) fn cpu(&self, cpu: usize) -> &Cpu {
        &self.cpus[cpu]
    }

    pub fn ncpu(&self) -> usize {
        self.cpus.len()
    }

    pub fn policy_kind(&self) -> PolicyKind {
        self.policy_kind
    }

    /// Pid of the root process, once userinit() has run.
    pub fn init_pid(&self) -> Option<Pid> {
        self.init_proc.get().map(|&(_, pid)| pid)
    }

    /// Current tick count.
    pub fn uptime(&self) -> u64 {
        *self.ticks.lock()
    }

    pub(crate) fn tick_lock(&self) -> &Mutex<u64> {
        &self.ticks
    }

    /// Run `f` on the live slot owning `pid`.
    pub(crate) fn with_proc<R>(&self, pid: Pid, f: impl FnOnce(&mut Proc) -> R) -> Option<R> {
        for (_, slot) in self.table.iter() {
            let mut p = slot.lock();
            if p.state != ProcState::Unused && p.pid == pid {
                return Some(f(&mut p));
            }
        }
        None
    }

    // ========================================================================
    // SLOT ALLOCATION
    // ========================================================================

    /// Claim an UNUSED slot and equip it: fresh pid, scheduling defaults,
    /// trap frame, signal-backup frame, empty address space. Returns with
    /// the slot lock held. Any resource failure unwinds the slot back to
    /// UNUSED and returns None.
    pub fn allocate(&self) -> Option<(SlotId, MutexGuard<'_, Proc>)> {
        let now = self.uptime();
        let (id, mut p) = self.table.claim_slot(now)?;

        let Some(tf) = self.platform.alloc_frame() else {
            self.free_locked(&mut p);
            return None;
        };
        p.trapframe = Some(tf);

        let Some(bf) = self.platform.alloc_frame() else {
            self.free_locked(&mut p);
            return None;
        };
        p.backup_frame = Some(bf);

        let Some(space) = self.platform.create_space() else {
            self.free_locked(&mut p);
            return None;
        };
        p.space = Some(space);

        log::debug!("allocated slot {} pid {}", id.0, p.pid);
        Some((id, p))
    }

    /// Release every resource a slot owns and return it to UNUSED.
    /// Idempotent with respect to resources: already-released handles are
    /// simply skipped. Caller must hold the slot's lock.
    pub(crate) fn free_locked(&self, p: &mut Proc) {
        if let Some(tf) = p.trapframe.take() {
            self.platform.free_frame(tf);
        }
        if let Some(bf) = p.backup_frame.take() {
            self.platform.free_frame(bf);
        }
        if let Some(space) = p.space.take() {
            self.platform.free_space(space);
        }
        for entry in p.ofile.iter_mut() {
            if let Some(f) = entry.take() {
                self.platform.close(f);
            }
        }
        if let Some(cwd) = p.cwd.take() {
            self.platform.put_cwd(cwd);
        }

        p.pid = Pid(0);
        p.name.clear();
        p.parent = None;
        p.chan = None;
        p.flags = ProcFlags::empty();
        p.exit_status = 0;
        p.priority = 0;
        p.tickets = 0;
        p.queue = 0;
        p.queue_stamp = 0;
        p.created_tick = 0;
        p.started_tick = 0;
        p.exited_tick = 0;
        p.run_ticks = 0;
        p.sleep_ticks = 0;
        p.total_run_ticks = 0;
        p.run_count = 0;
        p.queue_ticks = [0; crate::params::NQUEUE];
        p.quantum_run = 0;
        p.trace_mask = 0;
        p.alarm_interval = 0;
        p.alarm_elapsed = 0;
        p.alarm_handler = 0;
        p.context.clear();
        p.transition(ProcState::Unused);
    }

    /// Set up the root of the process tree. Must be called exactly once
    /// before any fork/exit/wait traffic.
    pub fn userinit(&self, name: &str) -> Option<Pid> {
        let (slot, mut p) = self.allocate()?;
        p.set_name(name);
        p.cwd = Some(self.platform.root_dir());
        p.transition(ProcState::Runnable);
        let pid = p.pid;
        drop(p);
        self.init_proc.call_once(|| (slot, pid));
        log::info!("userinit: {} is pid {}", name, pid);
        Some(pid)
    }

    // ========================================================================
    // FORK / EXIT / WAIT
    // ========================================================================

    /// Create a child of `parent`: duplicated address-space contents and
    /// open-file references, copied trap frame with the return-value
    /// register forced to zero, inherited tickets and trace mask, zeroed
    /// run/sleep statistics. Returns the child pid, or None when no slot
    /// is free or the address-space copy fails.
    pub fn fork(&self, parent: Pid) -> Option<Pid> {
        let parent_slot = self.table.find(parent)?;
        let (child_slot, mut child) = self.allocate()?;

        {
            let par = self.table.slot(parent_slot).lock();

            let copied = match (par.space.as_ref(), child.space.as_ref()) {
                (Some(src), Some(dst)) => self.platform.copy_space(src, dst),
                _ => false,
            };
            if !copied {
                drop(par);
                self.free_locked(&mut child);
                return None;
            }

            if let (Some(src), Some(dst)) = (par.trapframe.as_ref(), child.trapframe.as_ref()) {
                self.platform.copy_frame(src, dst);
                // The child observes fork() returning zero.
                self.platform.set_return_value(dst, 0);
            }

            for (i, entry) in par.ofile.iter().enumerate() {
                if let Some(f) = entry {
                    child.ofile[i] = Some(self.platform.dup(f));
                }
            }
            child.cwd = par.cwd.as_ref().map(|c| self.platform.dup(c));

            let name = par.name.clone();
            child.name = name;
            child.tickets = par.tickets;
            child.trace_mask = par.trace_mask;
        }

        let pid = child.pid;
        drop(child);

        // Parent linkage only under the ordering lock.
        {
            let _wl = self.wait_lock.lock();
            self.table.slot(child_slot).lock().parent = Some(parent_slot);
        }

        self.table.slot(child_slot).lock().transition(ProcState::Runnable);
        log::debug!("fork: pid {} -> child pid {}", parent, pid);
        Some(pid)
    }

    /// Terminate the calling process. Closes its open files, hands its
    /// children to the root process, wakes its parent and becomes a
    /// ZOMBIE. The caller must relinquish the CPU afterwards and never
    /// invoke another operation; the slot is reclaimed by the parent's
    /// wait().
    pub fn exit(&self, pid: Pid, status: i32) {
        if self.init_pid() == Some(pid) {
            panic!("init exiting");
        }
        let Some(slot) = self.table.find(pid) else {
            panic!("exit: no slot for pid {pid}");
        };

        // File teardown is delegated and needs no table locks.
        let (files, cwd) = {
            let mut p = self.table.slot(slot).lock();
            let mut files: Vec<_> = Vec::new();
            for entry in p.ofile.iter_mut() {
                if let Some(f) = entry.take() {
                    files.push(f);
                }
            }
            (files, p.cwd.take())
        };
        for f in files {
            self.platform.close(f);
        }
        if let Some(cwd) = cwd {
            self.platform.put_cwd(cwd);
        }

        let now = self.uptime();
        let wl = self.wait_lock.lock();

        self.reparent(slot);

        // Parent might be sleeping in wait().
        let parent_slot = self.table.slot(slot).lock().parent;
        if let Some(pp) = parent_slot {
            let parent_pid = self.table.slot(pp).lock().pid;
            self.wakeup_except(WaitChannel::ChildExit(parent_pid), Some(slot));
        }

        {
            let mut p = self.table.slot(slot).lock();
            p.exit_status = status;
            p.exited_tick = now;
            p.transition(ProcState::Zombie);
        }
        drop(wl);
        log::debug!("exit: pid {} status {}", pid, status);
    }

    /// Hand every child of `deceased` to the root process and wake it.
    /// Caller must hold the wait lock.
    fn reparent(&self, deceased: SlotId) {
        let Some((init_slot, init_pid)) = self.init_proc.get().copied() else {
            panic!("reparent before userinit");
        };
        let mut orphaned = false;
        for (id, slot) in self.table.iter() {
            if id == deceased {
                continue;
            }
            let mut p = slot.lock();
            if p.state != ProcState::Unused && p.parent == Some(deceased) {
                p.parent = Some(init_slot);
                orphaned = true;
            }
        }
        if orphaned {
            self.wakeup_except(WaitChannel::ChildExit(init_pid), Some(deceased));
        }
    }

    /// Scan once for a zombie child of `parent` and reap it. See
    /// [`WaitOutcome`] for the three possible results; `Blocked` means the
    /// caller went to sleep under the no-lost-wakeup protocol and should
    /// call again after it is redispatched.
    pub fn wait(&self, parent: Pid) -> WaitOutcome {
        let wl = self.wait_lock.lock();
        let Some(parent_slot) = self.table.find(parent) else {
            return WaitOutcome::NoChildren;
        };

        let mut have_kids = false;
        for (id, slot) in self.table.iter() {
            if id == parent_slot {
                continue;
            }
            let mut p = slot.lock();
            if p.state == ProcState::Unused || p.parent != Some(parent_slot) {
                continue;
            }
            have_kids = true;
            if p.state == ProcState::Zombie {
                let pid = p.pid;
                let status = p.exit_status;
                let run_ticks = p.total_run_ticks;
                let wait_ticks = p.exited_tick - p.created_tick - run_ticks;
                self.free_locked(&mut p);
                log::debug!("wait: pid {} reaped child {}", parent, pid);
                return WaitOutcome::Reaped {
                    pid,
                    status,
                    run_ticks,
                    wait_ticks,
                };
            }
        }

        let killed = self
            .table
            .slot(parent_slot)
            .lock()
            .flags
            .contains(ProcFlags::KILLED);
        if !have_kids || killed {
            return WaitOutcome::NoChildren;
        }

        self.sleep_on(parent, WaitChannel::ChildExit(parent), wl);
        WaitOutcome::Blocked
    }

    /// wait() with time accounting; identical scan and blocking rules.
    /// Kept as a separate name because it is a separate syscall.
    pub fn waitx(&self, parent: Pid) -> WaitOutcome {
        self.wait(parent)
    }

    // ========================================================================
    // KILL AND THE SMALL SETTERS
    // ========================================================================

    /// Cooperative kill: raise the killed flag and force a SLEEPING victim
    /// RUNNABLE so the flag is observed at its next checkpoint. A RUNNING
    /// victim is never preempted. Returns false when no live slot owns
    /// `pid`.
    pub fn kill(&self, pid: Pid) -> bool {
        let hit = self.with_proc(pid, |p| {
            p.flags.insert(ProcFlags::KILLED);
            if p.state == ProcState::Sleeping {
                p.chan = None;
                p.transition(ProcState::Runnable);
            }
        });
        if hit.is_some() {
            log::warn!("kill: pid {}", pid);
            true
        } else {
            false
        }
    }

    pub fn killed(&self, pid: Pid) -> bool {
        self.with_proc(pid, |p| p.killed()).unwrap_or(false)
    }

    /// Replace a process's base priority, returning the previous one.
    /// -1 for an out-of-range priority, 101 when the pid is not found.
    /// The target's recent run/sleep history is reset so the new priority
    /// takes effect cleanly on the next pass.
    pub fn set_priority(&self, new_priority: i64, pid: Pid) -> i64 {
        if !(0..=PRIORITY_MAX).contains(&new_priority) {
            return -1;
        }
        self.with_proc(pid, |p| {
            let old = p.priority;
            p.sleep_ticks = 0;
            p.run_ticks = 0;
            p.priority = new_priority;
            old
        })
        .unwrap_or(101)
    }

    /// Set a process's lottery ticket count. None when the pid is dead.
    pub fn set_tickets(&self, pid: Pid, tickets: u64) -> Option<u64> {
        self.with_proc(pid, |p| {
            p.tickets = tickets;
            tickets
        })
    }

    /// Install a syscall trace mask (inherited across fork).
    pub fn set_trace_mask(&self, pid: Pid, mask: u64) -> Option<u64> {
        self.with_proc(pid, |p| {
            p.trace_mask = mask;
            mask
        })
    }

    /// Arm (interval > 0) or disarm (interval == 0) the tick alarm.
    pub fn set_alarm(&self, pid: Pid, interval: u64, handler: u64) -> bool {
        self.with_proc(pid, |p| {
            if interval == 0 {
                p.flags.remove(ProcFlags::ALARM_ARMED | ProcFlags::ALARM_PENDING);
                p.alarm_interval = 0;
                p.alarm_handler = 0;
            } else {
                p.flags.insert(ProcFlags::ALARM_ARMED);
                p.alarm_interval = interval;
                p.alarm_handler = handler;
            }
            p.alarm_elapsed = 0;
        })
        .is_some()
    }

    /// Return from an alarm handler: restore the trap frame saved when the
    /// alarm fired and clear the pending flag. False if no alarm was
    /// pending.
    pub fn sigreturn(&self, pid: Pid) -> bool {
        self.with_proc(pid, |p| {
            if !p.flags.contains(ProcFlags::ALARM_PENDING) {
                return false;
            }
            if let (Some(bf), Some(tf)) = (p.backup_frame.as_ref(), p.trapframe.as_ref()) {
                self.platform.copy_frame(bf, tf);
            }
            p.flags.remove(ProcFlags::ALARM_PENDING);
            true
        })
        .unwrap_or(false)
    }

    // ========================================================================
    // TIMER
    // ========================================================================

    /// External timer entry, once per tick: advance the clock, run the
    /// statistics scan, drive alarm accounting, give the policy its aging
    /// hook and wake timed sleepers.
    pub fn tick(&self) {
        let now = {
            let mut t = self.ticks.lock();
            *t += 1;
            *t
        };

        self.stats.on_tick(&self.table);

        // Alarm accounting: only RUNNING, armed slots burn alarm ticks.
        for (_, slot) in self.table.iter() {
            let mut p = slot.lock();
            if p.state != ProcState::Running || !p.flags.contains(ProcFlags::ALARM_ARMED) {
                continue;
            }
            p.alarm_elapsed += 1;
            if p.alarm_elapsed >= p.alarm_interval && !p.flags.contains(ProcFlags::ALARM_PENDING) {
                if let (Some(tf), Some(bf)) = (p.trapframe.as_ref(), p.backup_frame.as_ref()) {
                    self.platform.copy_frame(tf, bf);
                }
                p.flags.insert(ProcFlags::ALARM_PENDING);
                p.alarm_elapsed = 0;
            }
        }

        self.policy.lock().on_tick(&self.table, now);
        self.wakeup(WaitChannel::Ticks);
    }

    // ========================================================================
    // DEBUGGING
    // ========================================================================

    /// Best-effort process listing: one line per live slot. Slots whose
    /// lock is contended are reported as busy rather than waited on, so
    /// this can run from a stuck machine. Diagnostic only.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let mlfq = self.policy_kind == PolicyKind::Mlfq;
        for (id, slot) in self.table.iter() {
            let Some(p) = slot.try_lock() else {
                let _ = writeln!(out, "slot {} <locked>", id.0);
                continue;
            };
            if p.state == ProcState::Unused {
                continue;
            }
            if mlfq {
                let _ = writeln!(
                    out,
                    "{} {} {} q{} qticks {:?}",
                    p.pid,
                    p.state.label(),
                    p.name,
                    p.queue,
                    p.queue_ticks
                );
            } else {
                let _ = writeln!(out, "{} {} {}", p.pid, p.state.label(), p.name);
            }
        }
        out
    }
}
