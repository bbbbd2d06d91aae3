use crate::{SyscallContext, SyscallResult};

impl SyscallContext {
    pub fn sys_getuid(&self) -> SyscallResult {
        Ok(self.process.credentials().uid as isize)
    }

    pub fn sys_geteuid(&self) -> SyscallResult {
        Ok(self.process.credentials().euid as isize)
    }

    pub fn sys_getgid(&self) -> SyscallResult {
        Ok(self.process.credentials().gid as isize)
    }

    pub fn sys_getegid(&self) -> SyscallResult {
        Ok(self.process.credentials().egid as isize)
    }
}
