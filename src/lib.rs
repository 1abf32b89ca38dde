/*
 * minikern - process lifecycle and CPU scheduling core
 *
 * The process-management heart of a small teaching kernel, written as a
 * hosted-testable library. It owns the fixed-size process table, the
 * PID space, the process state machine, sleep/wakeup, wait/exit/kill and
 * five pluggable scheduling disciplines (round-robin, FCFS, priority,
 * lottery, MLFQ).
 *
 * Everything hardware-shaped is pushed behind the collaborator traits in
 * `platform`: register context switches, trap frames, address spaces and
 * open-file references are opaque handles here. The surrounding kernel
 * implements `Platform`, builds a `Kernel` with the policy of its choice,
 * runs `Kernel::run` on each CPU and drives `Kernel::tick` from its timer
 * interrupt.
 *
 * The crate is no_std + alloc by default; the `std` feature (on by
 * default) adds a println-backed logger for hosted use.
 */

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod kernel;
pub mod params;
pub mod platform;
pub mod proc;
pub mod sched;
pub mod stats;
pub mod sync;
pub mod syscall;
pub mod table;

#[cfg(feature = "std")]
pub mod utils;

#[cfg(test)]
mod testutil;


pub use kernel::{Kernel, WaitOutcome};
pub use platform::{BootHooks, ContextSwitch, FileOps, MemoryOps, Platform};
pub use proc::{Pid, ProcState, SlotId};
pub use sched::policy::{PolicyKind, Relinquish, SchedPolicy};
pub use sync::{SleepWait, WaitChannel};
pub use syscall::ERESTART;
