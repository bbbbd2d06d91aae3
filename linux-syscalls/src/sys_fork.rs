use crate::{SyscallContext, SyscallResult};

impl SyscallContext {
    /// Returns the child's pid in the parent. The child resumes from the same trap
    /// context with a return value of 0.
    pub fn sys_fork(&self) -> SyscallResult {
        let child = self.process.fork(self.thread.trap_context())?;

        Ok(child.pid() as isize)
    }
}
