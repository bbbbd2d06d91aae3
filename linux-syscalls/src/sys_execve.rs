use alloc::borrow::Cow;
use linux_loader::ProcessContext;

use crate::{SyscallContext, SyscallResult};

impl SyscallContext {
    /// Replaces the image of the calling process with `image`, loaded from `pathname`.
    ///
    /// The calling thread resumes at the new entry point with the new stack. Every
    /// other thread of the process is killed.
    pub fn sys_execve(
        &self,
        pathname: &str,
        image: &[u8],
        argv: &[&str],
        envp: &[&str],
    ) -> SyscallResult {
        let mut ctx = ProcessContext::new();

        for arg in argv {
            ctx.extend_argv(&[Cow::Borrowed(*arg)])?;
        }

        for var in envp {
            ctx.extend_envp(&[Cow::Borrowed(*var)])?;
        }

        self.process
            .exec(self.thread.tid(), pathname, image, &ctx)?;

        Ok(0)
    }
}
