use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    vec::Vec,
};

use hermit_sync::SpinMutex;
use kernel_abstractions::{DeferredWork, IKernel};
use mmu_abstractions::MMUHandle;
use task_abstractions::IScheduler;

use crate::task::TestScheduler;

/// Kernel services for host tests. Deferred work only runs when the test asks for it.
pub struct TestKernel {
    scheduler: Arc<TestScheduler>,
    deferred: SpinMutex<VecDeque<DeferredWork>>,
    kernel_space_switches: AtomicUsize,
    destroyed: SpinMutex<Vec<MMUHandle>>,
}

impl Default for TestKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl TestKernel {
    pub fn new() -> Self {
        Self {
            scheduler: TestScheduler::new().build(),
            deferred: SpinMutex::new(VecDeque::new()),
            kernel_space_switches: AtomicUsize::new(0),
            destroyed: SpinMutex::new(Vec::new()),
        }
    }

    pub fn build(self) -> Arc<TestKernel> {
        Arc::new(self)
    }

    /// Runs queued work, including work queued while running, until the queue is empty.
    pub fn run_deferred(&self) -> usize {
        let mut ran = 0;

        loop {
            // the guard must be gone before the work runs, it may queue more
            let work = self.deferred.lock().pop_front();

            match work {
                Some(work) => {
                    work();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    pub fn pending_deferred(&self) -> usize {
        self.deferred.lock().len()
    }

    pub fn kernel_space_switches(&self) -> usize {
        self.kernel_space_switches.load(Ordering::Relaxed)
    }

    pub fn destroyed_mmus(&self) -> Vec<MMUHandle> {
        self.destroyed.lock().clone()
    }

    pub fn test_scheduler(&self) -> &Arc<TestScheduler> {
        &self.scheduler
    }
}

impl IKernel for TestKernel {
    fn scheduler(&self) -> Arc<dyn IScheduler> {
        self.scheduler.clone()
    }

    fn defer(&self, work: DeferredWork) {
        self.deferred.lock().push_back(work);
    }

    fn activate_kernel_space(&self) {
        self.kernel_space_switches.fetch_add(1, Ordering::Relaxed);
    }

    fn destroy_mmu(&self, mmu: MMUHandle) {
        self.destroyed.lock().push(mmu);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;

    #[test]
    fn test_deferred_work_is_not_inline() {
        let kernel = TestKernel::new().build();
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        kernel.defer(Box::new(move || flag.store(true, Ordering::Relaxed)));

        assert!(!ran.load(Ordering::Relaxed));
        assert_eq!(kernel.pending_deferred(), 1);

        assert_eq!(kernel.run_deferred(), 1);
        assert!(ran.load(Ordering::Relaxed));
    }

    #[test]
    fn test_work_queued_by_work_runs() {
        let kernel = TestKernel::new().build();

        let inner = kernel.clone();
        kernel.defer(Box::new(move || inner.defer(Box::new(|| {}))));

        assert_eq!(kernel.run_deferred(), 2);
        assert_eq!(kernel.pending_deferred(), 0);
    }
}
