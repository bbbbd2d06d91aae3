use alloc::{
    collections::BTreeMap,
    sync::{Arc, Weak},
    vec::Vec,
};
use hermit_sync::SpinMutex;

use crate::LinuxProcess;

/// Index from pid to process. Holds only weak references; processes are owned by
/// their parent's child lists and by their threads.
pub struct ProcessRegistry {
    next_pid: SpinMutex<u32>,
    processes: SpinMutex<BTreeMap<u32, Weak<LinuxProcess>>>,
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self {
            next_pid: SpinMutex::new(constants::INIT_PID + 1),
            processes: SpinMutex::new(BTreeMap::new()),
        }
    }

    /// Hands out pids in increasing order, starting right after the init pid.
    /// The init pid itself is only ever taken by `LinuxProcess::bootstrap`.
    pub fn allocate_pid(&self) -> u32 {
        let mut next = self.next_pid.lock();

        let pid = *next;
        *next += 1;

        pid
    }

    /// Registers a freshly constructed process. Called once per process.
    pub fn put(&self, process: &Arc<LinuxProcess>) {
        let previous = self
            .processes
            .lock()
            .insert(process.pid(), Arc::downgrade(process));

        debug_assert!(previous.is_none(), "pid {} registered twice", process.pid());
    }

    /// Looks `pid` up. A process that is being destroyed is reported as missing.
    pub fn get(&self, pid: u32) -> Option<Arc<LinuxProcess>> {
        self.processes.lock().get(&pid).and_then(Weak::upgrade)
    }

    /// Unregisters `process`. Does nothing if `pid` now names a different process.
    pub fn remove(&self, process: &LinuxProcess) -> bool {
        let mut processes = self.processes.lock();

        let is_same = processes
            .get(&process.pid())
            .is_some_and(|entry| core::ptr::eq(entry.as_ptr(), process));

        if is_same {
            processes.remove(&process.pid());
        }

        is_same
    }

    pub fn len(&self) -> usize {
        self.processes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered pids in ascending order.
    pub fn pids(&self) -> Vec<u32> {
        self.processes.lock().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use test_utilities::kernel::TestKernel;

    use super::*;
    use crate::test_support::spawn_init;

    #[test]
    fn test_pids_are_monotonic() {
        let registry = ProcessRegistry::new();

        assert_eq!(registry.allocate_pid(), constants::INIT_PID + 1);
        assert_eq!(registry.allocate_pid(), constants::INIT_PID + 2);
        assert_eq!(registry.allocate_pid(), constants::INIT_PID + 3);
    }

    #[test]
    fn test_put_get_remove() {
        let kernel = TestKernel::new().build();
        let (env, init) = spawn_init(&kernel);
        let registry = env.registry();

        assert!(Arc::ptr_eq(&registry.get(init.pid()).unwrap(), &init));
        assert_eq!(registry.pids(), [init.pid()]);

        assert!(registry.remove(&init));
        assert!(registry.get(init.pid()).is_none());
        assert!(!registry.remove(&init));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dropped_process_is_not_found() {
        let kernel = TestKernel::new().build();
        let (env, init) = spawn_init(&kernel);
        let pid = init.pid();

        drop(init);

        assert!(env.registry().get(pid).is_none());
    }
}
