/*
 * Sleep / Wakeup Protocol
 *
 * Processes block on typed wait channels instead of raw memory addresses.
 * The no-lost-wakeup contract is the heart of this module:
 *
 *   register-as-sleeper (own slot lock held)
 *     happens-before release of the associated lock
 *     happens-before any wakeup scan for the same channel
 *
 * sleep_on() takes the caller's own slot lock BEFORE dropping the
 * associated lock, and wakeup() takes each slot's lock while scanning, so
 * a waker that changes the awaited condition under the associated lock
 * either runs its scan after the sleeper is visible, or the sleeper
 * re-checks the condition before ever blocking. Fixed lock order: the
 * wait/tick lock (whichever is associated) first, then slot locks.
 *
 * Yielding itself belongs to the external context-switch primitive; after
 * sleep_on() returns, the caller must relinquish and will be redispatched
 * once a wakeup (or kill) has made it RUNNABLE again.
 */

use spin::MutexGuard;

use crate::kernel::Kernel;
use crate::proc::{Pid, ProcState, SlotId};

/// Typed wait-token. Identifies the resource a sleeper is blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitChannel {
    /// The global tick counter advanced (timed sleeps).
    Ticks,
    /// A child of the named parent exited.
    ChildExit(Pid),
    /// Collaborator-defined resource (device queues, pipes, ...).
    Resource(u64),
}

/// Outcome of a timed sleep attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepWait {
    /// The requested number of ticks has elapsed.
    Elapsed,
    /// The caller was killed while waiting.
    Killed,
    /// Registered SLEEPING on the tick channel; relinquish and retry.
    Blocked,
}

impl Kernel {
    /// Atomically release `guard` and go to sleep on `chan`.
    ///
    /// The caller must be the RUNNING process `pid` and must hold the lock
    /// protecting the condition it is waiting on. On return the caller is
    /// SLEEPING and must relinquish the CPU; it re-checks its condition
    /// (reacquiring the associated lock) when next dispatched.
    pub fn sleep_on<T>(&self, pid: Pid, chan: WaitChannel, guard: MutexGuard<'_, T>) {
        let Some(slot) = self.table().find(pid) else {
            panic!("sleep_on: no slot for pid {pid}");
        };
        // Own slot lock first, then release the associated lock: any
        // wakeup for this channel now has to wait until we are visible
        // as a sleeper.
        let mut p = self.table().slot(slot).lock();
        drop(guard);
        p.chan = Some(chan);
        p.transition(ProcState::Sleeping);
        log::trace!("pid {} sleeping on {:?}", pid, chan);
    }

    /// Wake every sleeper on `chan`.
    pub fn wakeup(&self, chan: WaitChannel) {
        self.wakeup_except(chan, None);
    }

    /// Wake every sleeper on `chan` except the caller's own slot.
    /// Must be called without holding any slot lock.
    pub(crate) fn wakeup_except(&self, chan: WaitChannel, skip: Option<SlotId>) {
        for (id, slot) in self.table().iter() {
            if Some(id) == skip {
                continue;
            }
            let mut p = slot.lock();
            if p.state == ProcState::Sleeping && p.chan == Some(chan) {
                p.chan = None;
                p.transition(ProcState::Runnable);
            }
        }
    }

    /// Timed wait: sleep until `n` ticks have passed since the `since`
    /// snapshot (taken from an earlier `uptime()`), or the caller is
    /// killed. Blocks at most once per call; on `Blocked` the caller
    /// relinquishes and calls again when redispatched.
    pub fn sleep_ticks(&self, pid: Pid, since: u64, n: u64) -> SleepWait {
        let ticks = self.tick_lock().lock();
        if ticks.saturating_sub(since) >= n {
            return SleepWait::Elapsed;
        }
        if self.killed(pid) {
            return SleepWait::Killed;
        }
        self.sleep_on(pid, WaitChannel::Ticks, ticks);
        SleepWait::Blocked
    }
}
