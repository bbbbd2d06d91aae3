use alloc::sync::Arc;
use constants::ErrNo;
use log::{debug, error};
use threading::yield_now;
use task_abstractions::{
    flags::WaitOptions,
    status::{Signal, WaitStatus},
    IThread,
};

use crate::LinuxProcess;

/// Which children a `wait` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    Any,
    Pid(u32),
}

impl WaitTarget {
    /// Decodes the `pid` argument of `wait4`. Process groups are not tracked, so every
    /// non-positive value means any child.
    pub fn from_raw(pid: isize) -> Self {
        match u32::try_from(pid) {
            Ok(pid) if pid > 0 => WaitTarget::Pid(pid),
            _ => WaitTarget::Any,
        }
    }

    fn matches(self, process: &LinuxProcess) -> bool {
        match self {
            WaitTarget::Any => true,
            WaitTarget::Pid(pid) => process.pid() == pid,
        }
    }
}

impl LinuxProcess {
    /// Reaps one zombie child matching `target`. Unless `WaitOptions::NOHANG` is given,
    /// the returned future yields until one shows up.
    ///
    /// Returns `Ok(None)` for a non-blocking call that found live children but no zombie.
    /// A pending signal on `thread` aborts the wait with `InterruptedSystemCall`
    /// without consuming anything.
    pub async fn wait(
        &self,
        thread: &Arc<dyn IThread>,
        target: WaitTarget,
        options: WaitOptions,
    ) -> Result<Option<(u32, WaitStatus)>, ErrNo> {
        loop {
            let generation = {
                let mut children = self.children.lock();

                if children.live.is_empty() && children.zombies.is_empty() {
                    return Err(ErrNo::NoChildProcesses);
                }

                if let WaitTarget::Pid(pid) = target {
                    let is_child = children
                        .live
                        .iter()
                        .chain(children.zombies.iter())
                        .any(|c| c.pid() == pid);

                    if !is_child {
                        return Err(ErrNo::NoChildProcesses);
                    }
                }

                if let Some(idx) = children.zombies.iter().position(|z| target.matches(z)) {
                    let zombie = children.zombies.remove(idx);
                    drop(children);

                    return Ok(Some(self.reap(zombie)));
                }

                if options.contains(WaitOptions::NOHANG) {
                    return Ok(None);
                }

                children.generation
            };

            // sleep until the child lists change
            loop {
                if thread.has_pending_signal() {
                    debug!("wait in process {} interrupted", self.pid());
                    return Err(ErrNo::InterruptedSystemCall);
                }

                yield_now().await;

                if self.children.lock().generation != generation {
                    break;
                }
            }
        }
    }

    fn reap(&self, zombie: Arc<LinuxProcess>) -> (u32, WaitStatus) {
        let status = zombie.exit_status().unwrap_or_else(|| {
            error!(
                "Zombie {} of process {} has no exit status, reporting it killed",
                zombie.pid(),
                self.pid()
            );
            WaitStatus::Signaled(Signal::Kill)
        });

        self.environment().registry().remove(&zombie);

        debug!("Process {} reaped {} with {:?}", self.pid(), zombie.pid(), status);

        (zombie.pid(), status)
    }
}
