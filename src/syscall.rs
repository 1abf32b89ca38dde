/*
 * Syscall Boundary
 *
 * Thin numeric shims between the trap layer and the kernel core. Every
 * function takes the calling pid explicitly (the trap layer knows who
 * trapped) and returns the value destined for the process's return-value
 * register.
 *
 * Blocking calls follow the restart convention: when the core parks the
 * caller SLEEPING, the shim returns ERESTART and the trap layer re-issues
 * the same call with the same arguments once the process is dispatched
 * again. For sys_sleep that means the tick snapshot travels with the
 * call's arguments, so retries measure from the original start.
 */

use crate::kernel::{Kernel, WaitOutcome};
use crate::proc::Pid;
use crate::sync::SleepWait;

/// "Park the caller and retry this call after redispatch."
pub const ERESTART: i64 = -2;

pub fn sys_fork(k: &Kernel, caller: Pid) -> i64 {
    match k.fork(caller) {
        Some(child) => child.0 as i64,
        None => -1,
    }
}

pub fn sys_exit(k: &Kernel, caller: Pid, status: i32) {
    k.exit(caller, status);
}

pub fn sys_wait(k: &Kernel, caller: Pid) -> i64 {
    match k.wait(caller) {
        WaitOutcome::Reaped { pid, .. } => pid.0 as i64,
        WaitOutcome::NoChildren => -1,
        WaitOutcome::Blocked => ERESTART,
    }
}

/// wait() plus the reaped child's accumulated run and wait ticks.
pub fn sys_waitx(k: &Kernel, caller: Pid) -> (i64, u64, u64) {
    match k.waitx(caller) {
        WaitOutcome::Reaped {
            pid,
            run_ticks,
            wait_ticks,
            ..
        } => (pid.0 as i64, run_ticks, wait_ticks),
        WaitOutcome::NoChildren => (-1, 0, 0),
        WaitOutcome::Blocked => (ERESTART, 0, 0),
    }
}

pub fn sys_kill(k: &Kernel, target: i64) -> i64 {
    if target < 0 {
        return -1;
    }
    if k.kill(Pid(target as usize)) {
        0
    } else {
        -1
    }
}

/// Returns the previous priority; 101 when the target does not exist,
/// -1 when the new priority is out of range.
pub fn sys_set_priority(k: &Kernel, new_priority: i64, target: i64) -> i64 {
    if target < 0 {
        return 101;
    }
    k.set_priority(new_priority, Pid(target as usize))
}

/// Returns the applied ticket count; -1 for a negative count or a dead
/// caller.
pub fn sys_settickets(k: &Kernel, caller: Pid, count: i64) -> i64 {
    if count < 0 {
        return -1;
    }
    match k.set_tickets(caller, count as u64) {
        Some(applied) => applied as i64,
        None => -1,
    }
}

/// `since` is the caller's tick snapshot from when the sleep was first
/// issued; retries after ERESTART pass the same value.
pub fn sys_sleep(k: &Kernel, caller: Pid, since: u64, ticks: u64) -> i64 {
    match k.sleep_ticks(caller, since, ticks) {
        SleepWait::Elapsed => 0,
        SleepWait::Killed => -1,
        SleepWait::Blocked => ERESTART,
    }
}

pub fn sys_uptime(k: &Kernel) -> i64 {
    k.uptime() as i64
}

pub fn sys_getpid(caller: Pid) -> i64 {
    caller.0 as i64
}

pub fn sys_trace(k: &Kernel, caller: Pid, mask: i64) -> i64 {
    if mask < 0 {
        return -1;
    }
    match k.set_trace_mask(caller, mask as u64) {
        Some(_) => 0,
        None => -1,
    }
}

pub fn sys_sigalarm(k: &Kernel, caller: Pid, interval: i64, handler: u64) -> i64 {
    if interval < 0 {
        return -1;
    }
    if k.set_alarm(caller, interval as u64, handler) {
        0
    } else {
        -1
    }
}

pub fn sys_sigreturn(k: &Kernel, caller: Pid) -> i64 {
    if k.sigreturn(caller) {
        0
    } else {
        -1
    }
}
