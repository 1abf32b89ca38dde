/*
 * Platform Collaborator Interfaces
 *
 * The process core does not know how to switch register sets, map pages,
 * or close files. Those belong to the surrounding kernel and are consumed
 * through the narrow traits in this module:
 *
 * - ContextSwitch: the opaque register-context hand-off primitive
 * - MemoryOps:     trap-frame and address-space management
 * - FileOps:       open-file reference counting and cwd release
 * - BootHooks:     interrupt enable and the one-shot filesystem wakeup
 *
 * All resource types here are opaque handles. The core stores, moves and
 * releases them but never inspects their contents; interpreting a Frame or
 * Space is strictly the collaborator's business. This is also what makes
 * the core testable: a mock platform hands out counted tokens and the
 * tests assert that every token comes back.
 */

use crate::proc::Pid;

/// Saved execution context of a process or scheduler loop.
///
/// One lives in every table slot and one per CPU. The core only ever moves
/// it around and tags it with its owner for diagnostics; the word of
/// storage inside belongs to the context-switch collaborator.
#[derive(Debug, Default)]
pub struct Context {
    owner: Option<Pid>,
    scratch: u64,
}

impl Context {
    /// Context storage for a CPU's scheduler loop.
    pub fn for_cpu() -> Self {
        Context::default()
    }

    pub(crate) fn reset(&mut self, owner: Pid) {
        self.owner = Some(owner);
        self.scratch = 0;
    }

    pub(crate) fn clear(&mut self) {
        self.owner = None;
        self.scratch = 0;
    }

    /// Which process this context belongs to, if any. Diagnostic only.
    pub fn owner(&self) -> Option<Pid> {
        self.owner
    }

    /// Collaborator-owned storage word.
    pub fn scratch(&self) -> u64 {
        self.scratch
    }

    /// Collaborator-owned storage word.
    pub fn set_scratch(&mut self, value: u64) {
        self.scratch = value;
    }
}

/// Opaque trap/register frame handle (also used for the signal-backup
/// frame). Allocated and interpreted by the memory collaborator.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame(pub u64);

/// Opaque address-space handle.
#[derive(Debug, PartialEq, Eq)]
pub struct Space(pub u64);

/// Opaque reference to an open file or directory.
#[derive(Debug, PartialEq, Eq)]
pub struct FileRef(pub u64);

/// The register-level context switch. Called with the outgoing and the
/// incoming context storage; returns when control comes back to the
/// outgoing side.
pub trait ContextSwitch: Send + Sync {
    fn swtch(&self, from: &mut Context, to: &mut Context);
}

/// Trap-frame and address-space management.
///
/// Any of the fallible operations may return None (out of memory); the
/// core unwinds partially allocated slots in response.
pub trait MemoryOps: Send + Sync {
    fn alloc_frame(&self) -> Option<Frame>;
    fn free_frame(&self, frame: Frame);

    fn create_space(&self) -> Option<Space>;
    /// Duplicate a parent's address-space contents into a child's
    /// already-created space. False on allocation failure; the core frees
    /// the child's space in response.
    fn copy_space(&self, src: &Space, dst: &Space) -> bool;
    fn free_space(&self, space: Space);

    /// Copy frame contents from `src` into `dst`.
    fn copy_frame(&self, src: &Frame, dst: &Frame);
    /// Override the return-value register in a frame (fork signals "child"
    /// by forcing it to zero).
    fn set_return_value(&self, frame: &Frame, value: u64);
}

/// Open-file reference management.
pub trait FileOps: Send + Sync {
    /// Take an additional reference to an open file.
    fn dup(&self, file: &FileRef) -> FileRef;
    /// Drop a reference to an open file.
    fn close(&self, file: FileRef);
    /// Release a working-directory reference.
    fn put_cwd(&self, cwd: FileRef);
    /// Reference to the filesystem root, used as the first process's
    /// working directory.
    fn root_dir(&self) -> FileRef;
}

/// Hooks the scheduler drives on behalf of the rest of the system.
pub trait BootHooks: Send + Sync {
    /// Invoked exactly once, on the very first dispatch, so filesystem
    /// initialization can run in a process context.
    fn fs_init(&self);
    /// Re-enable device interrupts. Called every scheduler-loop pass so a
    /// core hunting for work never blocks interrupts indefinitely.
    fn intr_on(&self);
}

/// The complete collaborator surface the kernel is constructed with.
pub trait Platform: ContextSwitch + MemoryOps + FileOps + BootHooks {}

impl<T: ContextSwitch + MemoryOps + FileOps + BootHooks> Platform for T {}
