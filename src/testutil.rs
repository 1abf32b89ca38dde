/*
 * Test Collaborators
 *
 * A counted-token platform: every Frame, Space and FileRef handed out is
 * tracked, so lifecycle tests can assert that each one comes back.
 * Allocation failures are injectable, and the context switch runs a
 * scripted action in the place of the dispatched process.
 */

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::Mutex;

use crate::kernel::Kernel;
use crate::platform::{BootHooks, Context, ContextSwitch, FileOps, FileRef, Frame, MemoryOps, Space};
use crate::proc::Pid;
use crate::sched::policy::PolicyKind;

type SwitchScript = Box<dyn FnOnce(Pid) + Send>;

pub struct TestPlatform {
    next_token: Mutex<u64>,
    live_frames: AtomicUsize,
    live_spaces: AtomicUsize,
    live_files: AtomicUsize,
    /// Remaining successful frame allocations, if capped.
    frame_budget: Mutex<Option<usize>>,
    fail_space_copy: AtomicBool,
    /// One scripted action per dispatch, run in place of the process.
    script: Mutex<VecDeque<SwitchScript>>,
    dispatch_log: Mutex<Vec<Pid>>,
    fs_inits: AtomicUsize,
}

impl TestPlatform {
    pub fn new() -> Self {
        TestPlatform {
            next_token: Mutex::new(1),
            live_frames: AtomicUsize::new(0),
            live_spaces: AtomicUsize::new(0),
            live_files: AtomicUsize::new(0),
            frame_budget: Mutex::new(None),
            fail_space_copy: AtomicBool::new(false),
            script: Mutex::new(VecDeque::new()),
            dispatch_log: Mutex::new(Vec::new()),
            fs_inits: AtomicUsize::new(0),
        }
    }

    /// Single-CPU kernel over a fresh mock platform.
    pub fn kernel(kind: PolicyKind) -> Kernel {
        Self::kernel_with_platform(kind).1
    }

    pub fn kernel_with_platform(kind: PolicyKind) -> (Arc<TestPlatform>, Kernel) {
        let platform = Arc::new(TestPlatform::new());
        let kernel = Kernel::new(kind, 1, platform.clone());
        (platform, kernel)
    }

    fn token(&self) -> u64 {
        let mut next = self.next_token.lock();
        let t = *next;
        *next += 1;
        t
    }

    /// Let `n` more frame allocations succeed, then fail the rest.
    pub fn fail_frame_allocs_after(&self, n: usize) {
        *self.frame_budget.lock() = Some(n);
    }

    pub fn fail_space_copies(&self) {
        self.fail_space_copy.store(true, Ordering::SeqCst);
    }

    pub fn live_frames(&self) -> usize {
        self.live_frames.load(Ordering::SeqCst)
    }

    pub fn live_spaces(&self) -> usize {
        self.live_spaces.load(Ordering::SeqCst)
    }

    pub fn live_files(&self) -> usize {
        self.live_files.load(Ordering::SeqCst)
    }

    /// Queue an action to run, as the process, at its next dispatch.
    pub fn script_switch(&self, action: impl FnOnce(Pid) + Send + 'static) {
        self.script.lock().push_back(Box::new(action));
    }

    /// Pids in dispatch order.
    pub fn dispatches(&self) -> Vec<Pid> {
        self.dispatch_log.lock().clone()
    }

    pub fn fs_inits(&self) -> usize {
        self.fs_inits.load(Ordering::SeqCst)
    }
}

impl ContextSwitch for TestPlatform {
    fn swtch(&self, _from: &mut Context, to: &mut Context) {
        let Some(pid) = to.owner() else {
            panic!("switch to an unowned context");
        };
        self.dispatch_log.lock().push(pid);
        let action = self.script.lock().pop_front();
        if let Some(action) = action {
            action(pid);
        }
    }
}

impl MemoryOps for TestPlatform {
    fn alloc_frame(&self) -> Option<Frame> {
        {
            let mut budget = self.frame_budget.lock();
            match budget.as_mut() {
                Some(0) => return None,
                Some(left) => *left -= 1,
                None => {}
            }
        }
        self.live_frames.fetch_add(1, Ordering::SeqCst);
        Some(Frame(self.token()))
    }

    fn free_frame(&self, _frame: Frame) {
        self.live_frames.fetch_sub(1, Ordering::SeqCst);
    }

    fn create_space(&self) -> Option<Space> {
        self.live_spaces.fetch_add(1, Ordering::SeqCst);
        Some(Space(self.token()))
    }

    fn copy_space(&self, _src: &Space, _dst: &Space) -> bool {
        !self.fail_space_copy.load(Ordering::SeqCst)
    }

    fn free_space(&self, _space: Space) {
        self.live_spaces.fetch_sub(1, Ordering::SeqCst);
    }

    fn copy_frame(&self, _src: &Frame, _dst: &Frame) {}

    fn set_return_value(&self, _frame: &Frame, _value: u64) {}
}

impl FileOps for TestPlatform {
    fn dup(&self, _file: &FileRef) -> FileRef {
        self.live_files.fetch_add(1, Ordering::SeqCst);
        FileRef(self.token())
    }

    fn close(&self, _file: FileRef) {
        self.live_files.fetch_sub(1, Ordering::SeqCst);
    }

    fn put_cwd(&self, _cwd: FileRef) {
        self.live_files.fetch_sub(1, Ordering::SeqCst);
    }

    fn root_dir(&self) -> FileRef {
        self.live_files.fetch_add(1, Ordering::SeqCst);
        FileRef(self.token())
    }
}

impl BootHooks for TestPlatform {
    fn fs_init(&self) {
        self.fs_inits.fetch_add(1, Ordering::SeqCst);
    }

    fn intr_on(&self) {}
}
