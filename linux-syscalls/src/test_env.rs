use alloc::{borrow::Cow, sync::Arc, vec::Vec};

use filesystem_abstractions::{DirectoryHandle, FileDescriptorTable, MountTable};
use linux_loader::ProcessContext;
use linux_task::{LinuxProcess, ProcessEnvironment, ProcessResources};
use task_abstractions::IThread;
use test_utilities::{
    elf::{ElfBuilder, PF_R, PF_X},
    kernel::TestKernel,
    memory::TestMMU,
};

use crate::SyscallContext;

pub const INIT_ENTRY: u64 = 0x10000;

pub fn program(entry: u64) -> Vec<u8> {
    ElfBuilder::new64()
        .entry(entry)
        .segment(entry, PF_R | PF_X, &[0x13; 0x40], 0x40)
        .build()
}

/// Boots an init process and returns a context for its only thread.
pub fn setup_env() -> (Arc<TestKernel>, SyscallContext) {
    let kernel = TestKernel::new().build();
    let env = ProcessEnvironment::new(kernel.clone());

    let mut ctx = ProcessContext::new();
    ctx.extend_argv(&[Cow::Borrowed("/sbin/init")]).unwrap();

    let init = LinuxProcess::bootstrap(
        &env,
        TestMMU::new().build(),
        ProcessResources::new(
            Arc::new(FileDescriptorTable::new()),
            Arc::new(MountTable::new()),
            DirectoryHandle::new("/"),
            DirectoryHandle::new("/"),
        ),
        "/sbin/init",
        &program(INIT_ENTRY),
        &ctx,
    )
    .unwrap();

    let thread = init.threads()[0].clone();

    (kernel, SyscallContext::new(thread, init))
}

/// A context for the main thread of `process`.
pub fn context_of(process: &Arc<LinuxProcess>) -> SyscallContext {
    SyscallContext::new(process.threads()[0].clone(), process.clone())
}

/// Lets every thread of `process` leave and runs the resulting teardown.
pub fn finish(kernel: &TestKernel, process: &Arc<LinuxProcess>) {
    for thread in process.threads() {
        process.detach_thread(thread.tid());
    }

    kernel.run_deferred();
}
