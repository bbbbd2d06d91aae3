use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use constants::ErrNo;
use filesystem_abstractions::{IFile, IFileDescriptorTable};

/// A file with no contents. Identity is all tests usually need.
#[derive(Default)]
pub struct TestFile;

impl TestFile {
    pub fn build() -> Arc<dyn IFile> {
        Arc::new(TestFile)
    }
}

impl IFile for TestFile {}

/// Descriptor table double with fork failure injection and an exec counter.
#[derive(Default)]
pub struct TestDescriptorTable {
    fail_fork: AtomicBool,
    executes: AtomicUsize,
}

impl TestDescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let table = Self::new();
        table.set_fail_fork(true);
        table
    }

    pub fn build(self) -> Arc<TestDescriptorTable> {
        Arc::new(self)
    }

    pub fn set_fail_fork(&self, fail: bool) {
        self.fail_fork.store(fail, Ordering::Relaxed);
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::Relaxed)
    }
}

impl IFileDescriptorTable for TestDescriptorTable {
    fn fork(&self) -> Result<Arc<dyn IFileDescriptorTable>, ErrNo> {
        if self.fail_fork.load(Ordering::Relaxed) {
            return Err(ErrNo::CannotAllocateMemory);
        }

        Ok(Arc::new(TestDescriptorTable::new()))
    }

    fn on_execute(&self) {
        self.executes.fetch_add(1, Ordering::Relaxed);
    }
}
