use crate::{SyscallContext, SyscallResult};

impl SyscallContext {
    /// Records the exit status of the whole process and signals all of its threads.
    pub fn sys_exit(&self, code: u8) -> SyscallResult {
        self.process.exit(code);

        Ok(code as isize)
    }
}
