/*
 * Tunable Parameters
 *
 * Compile-time sizing and scheduling defaults for the process core.
 * Everything that a port would reasonably want to tweak lives here.
 */

/// Maximum number of process table slots.
pub const NPROC: usize = 64;

/// Maximum number of CPU cores running scheduler loops.
pub const NCPU: usize = 4;

/// Open files per process.
pub const NOFILE: usize = 16;

/// Length of the fixed-size process name field.
pub const NAME_LEN: usize = 16;

/// Number of MLFQ levels (queue 0 is the highest priority).
pub const NQUEUE: usize = 5;

/// A RUNNABLE process that has waited this many ticks in its MLFQ level
/// without running is promoted one level.
pub const MLFQ_AGING_TICKS: u64 = 30;

/// Base priority assigned to every freshly allocated process (PBS).
pub const DEFAULT_PRIORITY: i64 = 60;

/// Priority values are clamped to [0, PRIORITY_MAX].
pub const PRIORITY_MAX: i64 = 100;

/// Lottery tickets assigned to every freshly allocated process (LBS).
pub const DEFAULT_TICKETS: u64 = 1;
