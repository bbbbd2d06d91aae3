#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod flags;
pub mod status;

use alloc::sync::Arc;
use constants::ErrNo;
use downcast_rs::{impl_downcast, DowncastSync};

use crate::status::Signal;

/// Register state a thread starts (or resumes) user execution with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskTrapContext {
    pub entry_pc: usize,
    pub stack_top: usize,
    pub argc: usize,
    pub argv_base: usize,
    pub envp_base: usize,
    pub return_value: usize,
}

pub trait IThread: DowncastSync {
    fn tid(&self) -> u32;

    fn deliver_signal(&self, signal: Signal);

    /// Whether a signal is waiting that should interrupt a blocking call.
    fn has_pending_signal(&self) -> bool;

    fn trap_context(&self) -> TaskTrapContext;

    fn set_trap_context(&self, ctx: TaskTrapContext);
}

impl_downcast!(sync IThread);

pub trait IScheduler: Send + Sync {
    /// Creates a runnable thread for process `pid` starting from `ctx`.
    fn create_thread(&self, pid: u32, ctx: TaskTrapContext) -> Result<Arc<dyn IThread>, ErrNo>;
}
