use core::sync::atomic::{AtomicBool, Ordering};

use address::VirtualAddress;
use alloc::{
    boxed::Box,
    string::String,
    sync::{Arc, Weak},
    vec::Vec,
};
use constants::ErrNo;
use filesystem_abstractions::{DirectoryHandle, IFileDescriptorTable, MountTable};
use hermit_sync::SpinMutex;
use linux_loader::{DebugSymbols, PreparedElf, ProcessContext};
use log::debug;
use memory_space::{Segment, SegmentList};
use mmu_abstractions::MMUHandle;
use task_abstractions::{status::WaitStatus, IThread, TaskTrapContext};

use crate::{exec::install_image, ProcessEnvironment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
    pub euid: u32,
    pub egid: u32,
}

/// Filesystem-side resources. Released all at once when the process terminates.
pub struct ProcessResources {
    pub fd_table: Arc<dyn IFileDescriptorTable>,
    pub mounts: Arc<MountTable>,
    pub root: DirectoryHandle,
    pub cwd: DirectoryHandle,
}

impl ProcessResources {
    pub fn new(
        fd_table: Arc<dyn IFileDescriptorTable>,
        mounts: Arc<MountTable>,
        root: DirectoryHandle,
        cwd: DirectoryHandle,
    ) -> Self {
        Self {
            fd_table,
            mounts,
            root,
            cwd,
        }
    }
}

/// The heap managed by `sbrk`. `start` is page aligned, `end` is byte granular.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramBreak {
    pub start: VirtualAddress,
    pub end: VirtualAddress,
}

impl ProgramBreak {
    pub(crate) fn empty_at(start: VirtualAddress) -> Self {
        Self { start, end: start }
    }
}

pub(crate) struct ProcessMemory {
    pub(crate) mmu: Option<MMUHandle>,
    pub(crate) segments: SegmentList,
    pub(crate) symbols: Option<Arc<DebugSymbols>>,
    pub(crate) brk: ProgramBreak,
    pub(crate) mmap_cursor: VirtualAddress,
}

impl ProcessMemory {
    pub(crate) fn released() -> Self {
        Self {
            mmu: None,
            segments: SegmentList::new(),
            symbols: None,
            brk: ProgramBreak::empty_at(VirtualAddress::null()),
            mmap_cursor: VirtualAddress::null(),
        }
    }
}

#[derive(Default)]
pub(crate) struct ChildLists {
    pub(crate) live: Vec<Arc<LinuxProcess>>,
    pub(crate) zombies: Vec<Arc<LinuxProcess>>,
    /// Bumped on every change waiters may care about.
    pub(crate) generation: u64,
    /// Set once the owner terminated and handed its children to init.
    pub(crate) closed: bool,
}

impl ChildLists {
    pub(crate) fn notify(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

#[derive(Default)]
pub(crate) struct ThreadList {
    pub(crate) threads: Vec<Arc<dyn IThread>>,
    /// Set when the list became empty for good. No thread can join afterwards.
    pub(crate) exiting: bool,
}

/// A process and its place in the process tree.
///
/// Lock order inside one process: `memory` before the address space it holds.
/// Across processes, a child-list lock is taken before the child-list lock of the
/// process receiving the children, and a child's `parent` lock is only ever
/// taken while at most the losing and the receiving parent's child-list locks are held.
pub struct LinuxProcess {
    pid: u32,
    env: Arc<ProcessEnvironment>,
    pub(crate) parent: SpinMutex<Option<Weak<LinuxProcess>>>,
    pub(crate) children: SpinMutex<ChildLists>,
    pub(crate) threads: SpinMutex<ThreadList>,
    pub(crate) resources: SpinMutex<Option<ProcessResources>>,
    pub(crate) identity: SpinMutex<Credentials>,
    pub(crate) memory: SpinMutex<ProcessMemory>,
    pub(crate) path: SpinMutex<String>,
    pub(crate) is_zombie: AtomicBool,
    pub(crate) no_zombify: AtomicBool,
    pub(crate) exit_status: SpinMutex<Option<WaitStatus>>,
}

impl LinuxProcess {
    pub(crate) fn new_raw(
        pid: u32,
        env: Arc<ProcessEnvironment>,
        parent: Option<Weak<LinuxProcess>>,
        memory: ProcessMemory,
        identity: Credentials,
        path: String,
    ) -> Self {
        Self {
            pid,
            env,
            parent: SpinMutex::new(parent),
            children: SpinMutex::new(ChildLists::default()),
            threads: SpinMutex::new(ThreadList::default()),
            resources: SpinMutex::new(None),
            identity: SpinMutex::new(identity),
            memory: SpinMutex::new(memory),
            path: SpinMutex::new(path),
            is_zombie: AtomicBool::new(false),
            no_zombify: AtomicBool::new(false),
            exit_status: SpinMutex::new(None),
        }
    }

    /// Builds a parentless process from `image` and starts its main thread.
    ///
    /// While no init process is registered in `env`, the new process takes the
    /// init pid and adopts orphans. A failed attempt leaves the init pid free for
    /// the next one.
    pub fn bootstrap(
        env: &Arc<ProcessEnvironment>,
        mmu: MMUHandle,
        resources: ProcessResources,
        path: &str,
        image: &[u8],
        ctx: &ProcessContext<'_>,
    ) -> Result<Arc<LinuxProcess>, ErrNo> {
        let path = duplicate_path(path)?;
        let prepared = PreparedElf::prepare(image)?;

        let mut segments = SegmentList::new();
        let installed = {
            let mut guard = mmu.lock();
            let installed = install_image(&mut *guard, &mut segments, prepared, ctx);

            if installed.is_err() {
                segments.unmap_all(&mut *guard);
            }

            installed?
        };

        let pid = match env.init() {
            Some(_) => env.registry().allocate_pid(),
            None => constants::INIT_PID,
        };

        let memory = ProcessMemory {
            mmu: Some(mmu),
            segments,
            symbols: installed.symbols,
            brk: ProgramBreak::empty_at(installed.image_end),
            mmap_cursor: VirtualAddress::from_usize(constants::MMAP_BASE),
        };

        let process = Arc::new(Self::new_raw(
            pid,
            env.clone(),
            None,
            memory,
            Credentials::default(),
            path,
        ));
        *process.resources.lock() = Some(resources);

        process.start_main_thread(installed.trap_ctx)?;

        // only a running process may be found by its pid
        env.registry().put(&process);

        debug!("Bootstrapped process {pid} from {}", process.path());

        Ok(process)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn environment(&self) -> &Arc<ProcessEnvironment> {
        &self.env
    }

    pub fn parent(&self) -> Option<Arc<LinuxProcess>> {
        self.parent.lock().as_ref().and_then(Weak::upgrade)
    }

    /// The parent's pid, 0 for a process without one.
    pub fn parent_pid(&self) -> u32 {
        self.parent().map_or(0, |p| p.pid())
    }

    pub fn credentials(&self) -> Credentials {
        *self.identity.lock()
    }

    pub fn set_credentials(&self, credentials: Credentials) {
        *self.identity.lock() = credentials;
    }

    pub fn path(&self) -> String {
        self.path.lock().clone()
    }

    pub fn is_zombie(&self) -> bool {
        self.is_zombie.load(Ordering::Acquire)
    }

    pub fn exit_status(&self) -> Option<WaitStatus> {
        *self.exit_status.lock()
    }

    pub fn mmu(&self) -> Option<MMUHandle> {
        self.memory.lock().mmu.clone()
    }

    pub fn segments(&self) -> Vec<Segment> {
        self.memory.lock().segments.iter().copied().collect()
    }

    pub fn program_break(&self) -> ProgramBreak {
        self.memory.lock().brk
    }

    pub fn mmap_cursor(&self) -> VirtualAddress {
        self.memory.lock().mmap_cursor
    }

    /// Resolves `addr` against the debug symbols of the current image.
    pub fn symbolize(&self, addr: VirtualAddress) -> Option<(String, usize)> {
        let symbols = self.memory.lock().symbols.clone()?;

        symbols
            .symbolize(addr)
            .map(|(name, offset)| (String::from(name), offset))
    }

    pub fn fd_table(&self) -> Option<Arc<dyn IFileDescriptorTable>> {
        self.resources.lock().as_ref().map(|r| r.fd_table.clone())
    }

    pub fn mount_table(&self) -> Option<Arc<MountTable>> {
        self.resources.lock().as_ref().map(|r| r.mounts.clone())
    }

    pub fn root(&self) -> Option<DirectoryHandle> {
        self.resources.lock().as_ref().map(|r| r.root.clone())
    }

    pub fn cwd(&self) -> Option<DirectoryHandle> {
        self.resources.lock().as_ref().map(|r| r.cwd.clone())
    }

    pub fn threads(&self) -> Vec<Arc<dyn IThread>> {
        self.threads.lock().threads.clone()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().threads.len()
    }

    pub fn live_children(&self) -> Vec<u32> {
        self.children.lock().live.iter().map(|c| c.pid()).collect()
    }

    pub fn zombie_children(&self) -> Vec<u32> {
        self.children.lock().zombies.iter().map(|c| c.pid()).collect()
    }

    /// Adds a thread to the process. Fails once the last thread has left.
    pub fn attach_thread(&self, thread: Arc<dyn IThread>) -> Result<(), ErrNo> {
        let mut threads = self.threads.lock();

        if threads.exiting {
            return Err(ErrNo::NoSuchProcess);
        }

        threads
            .threads
            .try_reserve(1)
            .map_err(|_| ErrNo::CannotAllocateMemory)?;
        threads.threads.push(thread);

        Ok(())
    }

    /// Removes thread `tid`. The last thread to leave schedules the termination sequence.
    pub fn detach_thread(self: &Arc<Self>, tid: u32) -> bool {
        let last = {
            let mut threads = self.threads.lock();

            let Some(idx) = threads.threads.iter().position(|t| t.tid() == tid) else {
                return false;
            };

            threads.threads.remove(idx);

            let last = threads.threads.is_empty() && !threads.exiting;
            if last {
                threads.exiting = true;
            }

            last
        };

        if last {
            debug!("Last thread {tid} of process {} left", self.pid);
            self.schedule_termination();
        }

        true
    }

    pub(crate) fn schedule_termination(self: &Arc<Self>) {
        let process = self.clone();

        self.env
            .kernel()
            .defer(Box::new(move || process.terminate()));
    }

    /// Creates the first thread of a process under construction. If that fails,
    /// the process is torn down before the error is returned.
    pub(crate) fn start_main_thread(self: &Arc<Self>, ctx: TaskTrapContext) -> Result<(), ErrNo> {
        let started = self
            .env
            .kernel()
            .scheduler()
            .create_thread(self.pid, ctx)
            .and_then(|thread| self.attach_thread(thread));

        if let Err(e) = started {
            self.abort_construction();
            return Err(e);
        }

        Ok(())
    }

    /// Tears down a process that never became a normal child: it is never zombified
    /// and nobody has to wait for it.
    pub(crate) fn abort_construction(self: &Arc<Self>) {
        self.no_zombify.store(true, Ordering::Release);
        self.threads.lock().exiting = true;

        debug!("Aborting construction of process {}", self.pid);

        self.schedule_termination();
    }
}

pub(crate) fn duplicate_path(path: &str) -> Result<String, ErrNo> {
    if path.len() > constants::MAX_PATH_LEN {
        return Err(ErrNo::FileNameTooLong);
    }

    let mut copy = String::new();
    copy.try_reserve_exact(path.len())
        .map_err(|_| ErrNo::CannotAllocateMemory)?;
    copy.push_str(path);

    Ok(copy)
}
