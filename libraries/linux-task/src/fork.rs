use alloc::sync::Arc;
use constants::ErrNo;
use log::{debug, warn};
use task_abstractions::TaskTrapContext;
use utilities::InvokeOnDrop;

use crate::{
    process::{duplicate_path, ProcessMemory},
    LinuxProcess, ProcessResources,
};

impl LinuxProcess {
    /// Creates a child running a copy of this process. `ctx` is the register state
    /// of the calling thread; the child's only thread resumes from it with a return value of 0.
    ///
    /// If a step fails after the child became visible in the process tree, the child is
    /// unlinked again before returning, so the caller never observes it through `wait`.
    /// It then tears itself down on the deferred worker.
    pub fn fork(self: &Arc<Self>, ctx: TaskTrapContext) -> Result<Arc<LinuxProcess>, ErrNo> {
        let env = self.environment().clone();
        let kernel = env.kernel().clone();

        let (mut child_memory, child_mmu, path) = {
            let memory = self.memory.lock();
            let parent_mmu = memory.mmu.as_ref().ok_or(ErrNo::NoSuchProcess)?;

            let segments = memory
                .segments
                .try_clone()
                .map_err(|_| ErrNo::CannotAllocateMemory)?;

            let mmu = parent_mmu.lock().fork_mmu().map_err(|e| {
                warn!("Failed to copy address space of process {}: {e:?}", self.pid());
                ErrNo::CannotAllocateMemory
            })?;

            // an unused copy goes back to the kernel if anything below fails
            let mmu = InvokeOnDrop::transform(mmu, |mmu| kernel.destroy_mmu(mmu));

            let path = duplicate_path(&self.path.lock())?;

            (
                ProcessMemory {
                    mmu: None,
                    segments,
                    symbols: memory.symbols.clone(),
                    brk: memory.brk,
                    mmap_cursor: memory.mmap_cursor,
                },
                mmu,
                path,
            )
        };

        let pid = env.registry().allocate_pid();
        child_memory.mmu = Some(child_mmu.disarm());

        let child = Arc::new(LinuxProcess::new_raw(
            pid,
            env.clone(),
            Some(Arc::downgrade(self)),
            child_memory,
            self.credentials(),
            path,
        ));

        env.registry().put(&child);

        if let Err(e) = self.link_child(&child) {
            child.abort_construction();
            return Err(e);
        }

        if let Err(e) = self.share_resources_with(&child) {
            self.unlink_child(&child);
            child.abort_construction();
            return Err(e);
        }

        let child_ctx = TaskTrapContext {
            return_value: 0,
            ..ctx
        };

        if let Err(e) = child.start_main_thread(child_ctx) {
            self.unlink_child(&child);
            return Err(e);
        }

        debug!("Process {} forked child {pid}", self.pid());

        Ok(child)
    }

    fn link_child(&self, child: &Arc<LinuxProcess>) -> Result<(), ErrNo> {
        let mut children = self.children.lock();

        // a terminating parent can not adopt anything anymore
        if children.closed {
            return Err(ErrNo::NoSuchProcess);
        }

        children
            .live
            .try_reserve(1)
            .map_err(|_| ErrNo::CannotAllocateMemory)?;
        children.live.push(child.clone());
        children.notify();

        Ok(())
    }

    fn unlink_child(&self, child: &Arc<LinuxProcess>) {
        let mut children = self.children.lock();

        children.live.retain(|c| !Arc::ptr_eq(c, child));
        children.notify();
    }

    fn share_resources_with(&self, child: &LinuxProcess) -> Result<(), ErrNo> {
        let shared = {
            let resources = self.resources.lock();
            let resources = resources.as_ref().ok_or(ErrNo::NoSuchProcess)?;

            ProcessResources {
                fd_table: resources.fd_table.fork()?,
                mounts: resources.mounts.clone(),
                root: resources.root.clone(),
                cwd: resources.cwd.clone(),
            }
        };

        *child.resources.lock() = Some(shared);

        Ok(())
    }
}
