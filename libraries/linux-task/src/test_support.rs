use alloc::{borrow::Cow, sync::Arc};

use filesystem_abstractions::{DirectoryHandle, FileDescriptorTable, MountTable};
use linux_loader::ProcessContext;
use test_utilities::{
    elf::{ElfBuilder, PF_R, PF_X},
    kernel::TestKernel,
    memory::TestMMU,
};

use crate::{LinuxProcess, ProcessEnvironment, ProcessResources};

pub const INIT_ENTRY: usize = 0x10000;

pub fn resources() -> ProcessResources {
    ProcessResources::new(
        Arc::new(FileDescriptorTable::new()),
        Arc::new(MountTable::new()),
        DirectoryHandle::new("/"),
        DirectoryHandle::new("/"),
    )
}

/// A fresh environment whose init runs a one-page program at `INIT_ENTRY`.
pub fn spawn_init(kernel: &Arc<TestKernel>) -> (Arc<ProcessEnvironment>, Arc<LinuxProcess>) {
    spawn_with_resources(kernel, resources())
}

pub fn spawn_with_resources(
    kernel: &Arc<TestKernel>,
    resources: ProcessResources,
) -> (Arc<ProcessEnvironment>, Arc<LinuxProcess>) {
    let env = ProcessEnvironment::new(kernel.clone());

    let image = ElfBuilder::new64()
        .entry(INIT_ENTRY as u64)
        .segment(INIT_ENTRY as u64, PF_R | PF_X, &[0x13; 0x40], 0x40)
        .build();

    let mut ctx = ProcessContext::new();
    ctx.extend_argv(&[Cow::Borrowed("/sbin/init")]).unwrap();

    let init = LinuxProcess::bootstrap(
        &env,
        TestMMU::new().build(),
        resources,
        "/sbin/init",
        &image,
        &ctx,
    )
    .unwrap();

    (env, init)
}

/// Detaches every thread, as if each of them ran to completion.
pub fn kill_all_threads(process: &Arc<LinuxProcess>) {
    for thread in process.threads() {
        process.detach_thread(thread.tid());
    }
}
