/*
 * Scheduling Mechanism
 *
 * The dispatcher half of the policy/mechanism split. Per-CPU state and
 * the dispatch loop live here; the pick itself is delegated to whatever
 * SchedPolicy the kernel was built with (see policy.rs).
 *
 * One dispatch pass:
 *
 *   1. policy.select_next() picks a candidate slot
 *   2. the pick is re-validated RUNNABLE under its slot lock, marked
 *      RUNNING and reported to policy.on_dispatch()
 *   3. the slot's saved context is handed to the context-switch
 *      collaborator together with this CPU's scheduler context
 *   4. control returns here only after the process has given the CPU
 *      back; by then it must have left RUNNING (RUNNABLE, SLEEPING or
 *      ZOMBIE) - coming back still RUNNING is a fatal protocol breach
 *
 * Between step 3 and 4 no table or policy lock is held, so the running
 * process is free to fork, exit, sleep or yield.
 *
 * Preemption is cooperative with the trap layer: after each timer tick it
 * asks slice_expired() and calls quantum_expired() on the current process
 * when the policy's slice is used up (never under FCFS).
 */

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;

use crate::platform::Context;
use crate::proc::{Pid, ProcState, SlotId};

use self::policy::{PolicyKind, Relinquish};

pub mod fcfs;
pub mod lottery;
pub mod mlfq;
pub mod policy;
pub mod priority;
pub mod round_robin;

const NO_PROC: usize = usize::MAX;

/// Per-CPU scheduler state.
pub struct Cpu {
    id: usize,
    /// Slot index of the process this CPU is running, NO_PROC when idle.
    current: AtomicUsize,
    /// This CPU's scheduler-loop context, the "from" side of every
    /// dispatch hand-off.
    context: Mutex<Context>,
    switches: AtomicU64,
}

impl Cpu {
    pub(crate) fn new(id: usize) -> Self {
        Cpu {
            id,
            current: AtomicUsize::new(NO_PROC),
            context: Mutex::new(Context::for_cpu()),
            switches: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn current_slot(&self) -> Option<SlotId> {
        match self.current.load(Ordering::SeqCst) {
            NO_PROC => None,
            slot => Some(SlotId(slot)),
        }
    }

    /// Completed dispatch hand-offs on this CPU.
    pub fn switches(&self) -> u64 {
        self.switches.load(Ordering::SeqCst)
    }
}

impl crate::kernel::Kernel {
    /// The scheduler loop for one CPU. Never returns; each pass re-enables
    /// interrupts so a CPU hunting for work stays interruptible.
    pub fn run(&self, cpu: usize) -> ! {
        loop {
            self.platform().intr_on();
            let _ = self.schedule_once(cpu);
            core::hint::spin_loop();
        }
    }

    /// One dispatch pass: pick, validate, hand off, and wait for the
    /// process to come back. Returns the pid that ran, or None when
    /// nothing was runnable (or the pick went stale before validation).
    pub fn schedule_once(&self, cpu: usize) -> Option<Pid> {
        let now = self.uptime();
        let id = {
            let mut policy = self.policy.lock();
            let id = policy.select_next(self.table(), now)?;
            let mut p = self.table().slot(id).lock();
            if p.state != ProcState::Runnable {
                // Lost a race with kill/wakeup; next pass re-picks.
                return None;
            }
            p.transition(ProcState::Running);
            policy.on_dispatch(&mut p, now);
            id
        };
        Some(self.dispatch(cpu, id))
    }

    /// Hand the CPU to the process in `id`. The slot's saved context is
    /// moved out for the duration of the switch so the running process can
    /// re-enter the kernel (fork, exit, sleep) without deadlocking on its
    /// own slot.
    fn dispatch(&self, cpu: usize, id: SlotId) -> Pid {
        let cpu_state = self.cpu(cpu);
        let (pid, mut proc_ctx) = {
            let mut p = self.table().slot(id).lock();
            (p.pid, core::mem::take(&mut p.context))
        };

        self.first_dispatch.call_once(|| self.platform().fs_init());

        log::trace!("cpu {} dispatching pid {}", cpu, pid);
        cpu_state.current.store(id.0, Ordering::SeqCst);
        {
            let mut sched_ctx = cpu_state.context.lock();
            self.platform().swtch(&mut sched_ctx, &mut proc_ctx);
        }
        cpu_state.current.store(NO_PROC, Ordering::SeqCst);
        cpu_state.switches.fetch_add(1, Ordering::SeqCst);

        let mut p = self.table().slot(id).lock();
        p.context = proc_ctx;
        if p.state == ProcState::Running {
            panic!("pid {pid} returned to scheduler while still running");
        }
        pid
    }

    /// Pid currently running on `cpu`, if any.
    pub fn current(&self, cpu: usize) -> Option<Pid> {
        let slot = self.cpu(cpu).current_slot()?;
        let p = self.table().slot(slot).lock();
        (p.state == ProcState::Running).then_some(p.pid)
    }

    /// Voluntary yield: back to RUNNABLE without a quantum penalty.
    pub fn yield_now(&self, pid: Pid) {
        self.relinquish(pid, Relinquish::Voluntary);
    }

    /// Time-slice preemption: back to RUNNABLE, with whatever penalty the
    /// policy attaches (MLFQ demotes one level).
    pub fn quantum_expired(&self, pid: Pid) {
        self.relinquish(pid, Relinquish::QuantumExpired);
    }

    fn relinquish(&self, pid: Pid, reason: Relinquish) {
        let Some(slot) = self.table().find(pid) else {
            return;
        };
        let now = self.uptime();
        let mut policy = self.policy.lock();
        let mut p = self.table().slot(slot).lock();
        if p.state != ProcState::Running {
            // Already slept or exited on its own.
            return;
        }
        p.transition(ProcState::Runnable);
        policy.on_relinquish(&mut p, reason, now);
    }

    /// Whether the current slice of `pid` is used up, per the active
    /// policy: FCFS never preempts, MLFQ preempts after the level's slice,
    /// everything else preempts every tick.
    pub fn slice_expired(&self, pid: Pid) -> bool {
        match self.policy_kind() {
            PolicyKind::Fcfs => false,
            PolicyKind::Mlfq => self
                .with_proc(pid, |p| p.quantum_run >= mlfq::time_slice(p.queue))
                .unwrap_or(false),
            _ => true,
        }
    }
}
