#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

use alloc::{boxed::Box, sync::Arc};
use downcast_rs::{impl_downcast, DowncastSync};
use mmu_abstractions::MMUHandle;
use task_abstractions::IScheduler;

/// Closure queued to run outside the caller's stack.
pub type DeferredWork = Box<dyn FnOnce() + Send + 'static>;

/// Kernel services the process lifecycle depends on.
pub trait IKernel: DowncastSync {
    fn scheduler(&self) -> Arc<dyn IScheduler>;

    /// Queues `work` on the deferred worker. Never runs it inline.
    fn defer(&self, work: DeferredWork);

    /// Switches the executing CPU onto the kernel's own address space.
    fn activate_kernel_space(&self);

    /// Releases an address space that no CPU is executing in anymore.
    fn destroy_mmu(&self, mmu: MMUHandle);
}

impl_downcast!(sync IKernel);
