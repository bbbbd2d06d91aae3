use core::sync::atomic::Ordering;

use alloc::sync::{Arc, Weak};
use log::{debug, error};
use task_abstractions::status::{Signal, WaitStatus};

use crate::{process::ProcessMemory, LinuxProcess};

impl LinuxProcess {
    /// Records `code` as the exit status and asks every thread to terminate.
    ///
    /// Only the first call records a status. Returns whether this call did.
    pub fn exit(&self, code: u8) -> bool {
        self.exit_with(WaitStatus::Exited(code), Signal::Terminate)
    }

    pub(crate) fn exit_with(&self, status: WaitStatus, signal: Signal) -> bool {
        let recorded = {
            let mut exit_status = self.exit_status.lock();

            match *exit_status {
                Some(_) => false,
                None => {
                    *exit_status = Some(status);
                    true
                }
            }
        };

        if recorded {
            debug!("Process {} exiting with {:?}", self.pid(), status);
        }

        for thread in self.threads.lock().threads.iter() {
            thread.deliver_signal(signal);
        }

        recorded
    }

    /// The deferred part of process death, run once the last thread is gone.
    pub(crate) fn terminate(self: &Arc<Self>) {
        let kernel = self.environment().kernel().clone();

        // the address space being destroyed may be the active one
        kernel.activate_kernel_space();

        let memory = core::mem::replace(&mut *self.memory.lock(), ProcessMemory::released());
        let mut segments = memory.segments;

        if let Some(mmu) = memory.mmu.as_ref() {
            segments.unmap_all(&mut *mmu.lock());
        }

        drop(self.resources.lock().take());

        if let Some(mmu) = memory.mmu {
            kernel.destroy_mmu(mmu);
        }

        self.reparent_children();

        self.is_zombie.store(true, Ordering::Release);

        if self.no_zombify.load(Ordering::Acquire) {
            debug!("Process {} torn down without zombie", self.pid());
            self.environment().registry().remove(self);
            return;
        }

        self.notify_parent();
    }

    /// Hands every child to init, keeping live children live and zombies zombies.
    fn reparent_children(self: &Arc<Self>) {
        let init = self
            .environment()
            .init()
            .filter(|init| !Arc::ptr_eq(init, self));

        let mut children = self.children.lock();
        children.closed = true;

        if children.live.is_empty() && children.zombies.is_empty() {
            return;
        }

        let Some(init) = init else {
            error!(
                "Process {} exits without init to adopt {} child(ren) and {} zombie(s)",
                self.pid(),
                children.live.len(),
                children.zombies.len()
            );

            for child in children.live.drain(..) {
                *child.parent.lock() = None;
            }
            for zombie in children.zombies.drain(..) {
                *zombie.parent.lock() = None;
                self.environment().registry().remove(&zombie);
            }

            return;
        };

        let adopter = Arc::downgrade(&init);
        let mut adopted = init.children.lock();

        if adopted.closed {
            error!("init is gone, orphans of process {} are lost", self.pid());
        }

        let moved_live = children.live.len();
        let moved_zombies = children.zombies.len();

        for child in children.live.drain(..) {
            *child.parent.lock() = Some(Weak::clone(&adopter));
            adopted.live.push(child);
        }

        for zombie in children.zombies.drain(..) {
            *zombie.parent.lock() = Some(Weak::clone(&adopter));
            adopted.zombies.push(zombie);
        }

        adopted.notify();
        drop(adopted);

        debug!(
            "Process {} handed {moved_live} child(ren) and {moved_zombies} zombie(s) to init",
            self.pid()
        );

        if moved_zombies > 0 {
            for thread in init.threads.lock().threads.iter() {
                thread.deliver_signal(Signal::Child);
            }
        }
    }

    /// Moves this process from its parent's live list to the zombie list.
    fn notify_parent(self: &Arc<Self>) {
        loop {
            let parent = self.parent.lock().as_ref().and_then(Weak::upgrade);

            let Some(parent) = parent else {
                // nobody will ever wait for us
                debug!("Orphaned process {} reaped on exit", self.pid());
                self.environment().registry().remove(self);
                return;
            };

            let mut children = parent.children.lock();

            let Some(idx) = children.live.iter().position(|c| Arc::ptr_eq(c, self)) else {
                if children.closed {
                    // the parent is handing us over right now, retry with the new one
                    drop(children);
                    continue;
                }

                debug!(
                    "Process {} is not a child of {}, nothing to notify",
                    self.pid(),
                    parent.pid()
                );
                self.environment().registry().remove(self);
                return;
            };

            let zombie = children.live.remove(idx);
            children.zombies.push(zombie);
            children.notify();
            drop(children);

            for thread in parent.threads.lock().threads.iter() {
                thread.deliver_signal(Signal::Child);
            }

            debug!("Process {} is now a zombie of {}", self.pid(), parent.pid());

            return;
        }
    }
}
