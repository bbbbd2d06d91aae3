use address::VirtualAddress;
use alloc::sync::Arc;
use constants::ErrNo;
use linux_loader::{
    check_stack_fits, setup_stack, DebugSymbols, LoadError, PreparedElf, ProcessContext,
};
use log::{debug, error, warn};
use memory_space::SegmentList;
use mmu_abstractions::IMMU;
use task_abstractions::{
    status::{Signal, WaitStatus},
    TaskTrapContext,
};

use crate::{
    process::{duplicate_path, ProgramBreak},
    LinuxProcess,
};

pub(crate) struct InstalledImage {
    pub(crate) trap_ctx: TaskTrapContext,
    pub(crate) image_end: VirtualAddress,
    pub(crate) symbols: Option<Arc<DebugSymbols>>,
}

/// Maps a validated image and its stack into an empty address space.
pub(crate) fn install_image(
    mmu: &mut dyn IMMU,
    segments: &mut SegmentList,
    prepared: PreparedElf<'_>,
    ctx: &ProcessContext<'_>,
) -> Result<InstalledImage, LoadError> {
    let loaded = prepared.load(mmu, segments)?;
    let stack = setup_stack(mmu, segments, ctx)?;

    Ok(InstalledImage {
        trap_ctx: TaskTrapContext {
            entry_pc: loaded.entry.as_usize(),
            stack_top: stack.stack_top.as_usize(),
            argc: stack.argc,
            argv_base: stack.argv_base.as_usize(),
            envp_base: stack.envp_base.as_usize(),
            return_value: 0,
        },
        image_end: loaded.image_end,
        symbols: loaded.symbols.map(Arc::new),
    })
}

impl LinuxProcess {
    /// Replaces the program image. On success thread `calling_tid` resumes at the
    /// new entry with the returned register state.
    ///
    /// Every check that can reject the image runs before the old address space is
    /// touched, so a failed validation leaves the process running its old image.
    pub fn exec(
        &self,
        calling_tid: u32,
        path: &str,
        image: &[u8],
        ctx: &ProcessContext<'_>,
    ) -> Result<TaskTrapContext, ErrNo> {
        let path = duplicate_path(path)?;

        if ctx.argv.len() > ctx.limit.argv || ctx.envp.len() > ctx.limit.envp {
            return Err(ErrNo::ArgumentListTooLong);
        }
        check_stack_fits(ctx)?;

        let prepared = PreparedElf::prepare(image).inspect_err(|e| {
            warn!("exec of {path} in process {} rejected: {e:?}", self.pid())
        })?;

        let fd_table = self.fd_table().ok_or(ErrNo::NoSuchProcess)?;

        let calling_thread = {
            let threads = self.threads.lock();

            let calling = threads
                .threads
                .iter()
                .find(|thread| thread.tid() == calling_tid)
                .cloned()
                .ok_or_else(|| {
                    warn!(
                        "exec in process {} from thread {calling_tid} which it does not own",
                        self.pid()
                    );
                    ErrNo::NoSuchProcess
                })?;

            for thread in threads.threads.iter() {
                if thread.tid() != calling_tid {
                    thread.deliver_signal(Signal::Kill);
                }
            }

            calling
        };

        // point of no return, the old image is gone after this
        let installed = {
            let mut memory = self.memory.lock();
            let mmu = memory.mmu.clone().ok_or(ErrNo::NoSuchProcess)?;
            let mut mmu = mmu.lock();

            memory.segments.unmap_all(&mut *mmu);
            memory.symbols = None;
            mmu.flush_translations();

            let installed = install_image(&mut *mmu, &mut memory.segments, prepared, ctx);

            if let Ok(image) = installed.as_ref() {
                memory.symbols = image.symbols.clone();
                memory.brk = ProgramBreak::empty_at(image.image_end);
                memory.mmap_cursor = VirtualAddress::from_usize(constants::MMAP_BASE);
            } else {
                memory.segments.unmap_all(&mut *mmu);
            }

            installed
        };

        let installed = match installed {
            Ok(installed) => installed,
            Err(e) => {
                error!(
                    "exec of {path} failed after the old image of process {} was released: {e:?}",
                    self.pid()
                );
                self.exit_with(WaitStatus::Signaled(Signal::Kill), Signal::Kill);
                return Err(e.into());
            }
        };

        *self.path.lock() = path;

        fd_table.on_execute();

        calling_thread.set_trap_context(installed.trap_ctx);

        debug!(
            "Process {} now runs {} at {:#x}",
            self.pid(),
            self.path.lock(),
            installed.trap_ctx.entry_pc
        );

        Ok(installed.trap_ctx)
    }
}
