use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    vec::Vec,
};

use constants::ErrNo;
use hermit_sync::SpinMutex;
use task_abstractions::{status::Signal, IScheduler, IThread, TaskTrapContext};

/// Thread double that records delivered signals instead of acting on them.
pub struct TestThread {
    tid: u32,
    pid: u32,
    signals: SpinMutex<Vec<Signal>>,
    trap_ctx: SpinMutex<TaskTrapContext>,
}

impl TestThread {
    pub fn new(tid: u32, pid: u32) -> Self {
        Self {
            tid,
            pid,
            signals: SpinMutex::new(Vec::new()),
            trap_ctx: SpinMutex::new(TaskTrapContext::default()),
        }
    }

    pub fn with_trap_context(self, ctx: TaskTrapContext) -> Self {
        *self.trap_ctx.lock() = ctx;
        self
    }

    pub fn build(self) -> Arc<TestThread> {
        Arc::new(self)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().clone()
    }

    pub fn clear_signals(&self) {
        self.signals.lock().clear();
    }
}

impl IThread for TestThread {
    fn tid(&self) -> u32 {
        self.tid
    }

    fn deliver_signal(&self, signal: Signal) {
        self.signals.lock().push(signal);
    }

    fn has_pending_signal(&self) -> bool {
        // SIGCHLD is ignored by default and never interrupts
        self.signals.lock().iter().any(|s| *s != Signal::Child)
    }

    fn trap_context(&self) -> TaskTrapContext {
        *self.trap_ctx.lock()
    }

    fn set_trap_context(&self, ctx: TaskTrapContext) {
        *self.trap_ctx.lock() = ctx;
    }
}

/// Scheduler double. Threads are created but never run.
pub struct TestScheduler {
    next_tid: AtomicU32,
    threads: SpinMutex<Vec<Arc<TestThread>>>,
    fail_create: AtomicBool,
}

impl Default for TestScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TestScheduler {
    pub fn new() -> Self {
        Self {
            next_tid: AtomicU32::new(1000),
            threads: SpinMutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
        }
    }

    pub fn build(self) -> Arc<TestScheduler> {
        Arc::new(self)
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::Relaxed);
    }

    pub fn thread(&self, tid: u32) -> Option<Arc<TestThread>> {
        self.threads.lock().iter().find(|t| t.tid == tid).cloned()
    }

    pub fn threads_of(&self, pid: u32) -> Vec<Arc<TestThread>> {
        self.threads
            .lock()
            .iter()
            .filter(|t| t.pid == pid)
            .cloned()
            .collect()
    }
}

impl IScheduler for TestScheduler {
    fn create_thread(&self, pid: u32, ctx: TaskTrapContext) -> Result<Arc<dyn IThread>, ErrNo> {
        if self.fail_create.load(Ordering::Relaxed) {
            return Err(ErrNo::ResourceTemporarilyUnavailable);
        }

        let tid = self.next_tid.fetch_add(1, Ordering::Relaxed);
        let thread = TestThread::new(tid, pid).with_trap_context(ctx).build();

        self.threads.lock().push(thread.clone());

        Ok(thread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_signal_does_not_interrupt() {
        let thread = TestThread::new(1, 1).build();

        thread.deliver_signal(Signal::Child);
        assert!(!thread.has_pending_signal());

        thread.deliver_signal(Signal::Interrupt);
        assert!(thread.has_pending_signal());
        assert_eq!(thread.signals(), [Signal::Child, Signal::Interrupt]);
    }

    #[test]
    fn test_create_thread() {
        let scheduler = TestScheduler::new().build();
        let ctx = TaskTrapContext {
            entry_pc: 0x1000,
            ..Default::default()
        };

        let thread = scheduler.create_thread(7, ctx).unwrap();

        assert_eq!(thread.trap_context().entry_pc, 0x1000);
        assert_eq!(scheduler.threads_of(7).len(), 1);

        scheduler.set_fail_create(true);
        assert!(scheduler.create_thread(7, ctx).is_err());
    }
}
