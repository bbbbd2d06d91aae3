#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

use alloc::sync::Arc;
use constants::ErrNo;
use linux_task::LinuxProcess;
use task_abstractions::IThread;

pub mod sys_execve;
pub mod sys_exit;
pub mod sys_fork;
pub mod sys_getpagesize;
pub mod sys_getpid;
pub mod sys_getuid;
pub mod sys_sbrk;
pub mod sys_wait4;

#[cfg(test)]
mod test_env;

pub type SyscallResult = Result<isize, ErrNo>;

pub trait ISyscallResult {
    fn as_usize(self) -> usize;
}

impl ISyscallResult for SyscallResult {
    fn as_usize(self) -> usize {
        match self {
            Ok(v) => v as usize,
            Err(e) => e as isize as usize,
        }
    }
}

/// The calling thread and the process it belongs to.
pub struct SyscallContext {
    pub thread: Arc<dyn IThread>,
    pub process: Arc<LinuxProcess>,
}

impl SyscallContext {
    pub fn new(thread: Arc<dyn IThread>, process: Arc<LinuxProcess>) -> SyscallContext {
        Self { thread, process }
    }
}
