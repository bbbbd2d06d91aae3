use address::VirtualAddress;
use constants::ErrNo;
use linux_task::WaitTarget;
use log::warn;
use task_abstractions::flags::WaitOptions;

use crate::{SyscallContext, SyscallResult};

impl SyscallContext {
    /// Reaps a child and returns its pid, or 0 if `WNOHANG` found nothing to reap.
    ///
    /// The status word is written to `wstatus` unless it is null. The child is
    /// reaped even if that write fails.
    pub async fn sys_wait4(
        &self,
        pid: isize,
        wstatus: VirtualAddress,
        options: u32,
    ) -> SyscallResult {
        let options = WaitOptions::from_bits(options).ok_or(ErrNo::InvalidArgument)?;
        let target = WaitTarget::from_raw(pid);

        let Some((pid, status)) = self.process.wait(&self.thread, target, options).await? else {
            return Ok(0);
        };

        if !wstatus.is_null() {
            let mmu = self.process.mmu().ok_or(ErrNo::NoSuchProcess)?;

            mmu.lock()
                .export_to_user(wstatus, status.to_raw())
                .map_err(|e| {
                    warn!("wait4 can not store status of {pid} at {wstatus}: {e:?}");
                    ErrNo::BadAddress
                })?;
        }

        Ok(pid as isize)
    }
}
