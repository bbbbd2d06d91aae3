use crate::{SyscallContext, SyscallResult};

impl SyscallContext {
    pub fn sys_getpid(&self) -> SyscallResult {
        Ok(self.process.pid() as isize)
    }

    /// 0 when the process has no parent, as for init.
    pub fn sys_getppid(&self) -> SyscallResult {
        Ok(self.process.parent_pid() as isize)
    }
}
