use alloc::{sync::Arc, vec::Vec};
use constants::ErrNo;
use hermit_sync::SpinMutex;

use crate::{IFile, IFileDescriptorTable};

#[derive(Clone)]
struct FileDescriptor {
    file: Arc<dyn IFile>,
    close_on_exec: bool,
}

pub struct FileDescriptorTable {
    table: SpinMutex<Vec<Option<FileDescriptor>>>,
    capacity: usize,
}

impl Default for FileDescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FileDescriptorTable {
    pub const MAX_SIZE: usize = 1024; // according to rlimit

    pub fn new() -> Self {
        FileDescriptorTable {
            table: SpinMutex::new(Vec::new()),
            capacity: Self::MAX_SIZE,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        FileDescriptorTable {
            table: SpinMutex::new(Vec::new()),
            capacity,
        }
    }

    pub fn get(&self, idx: usize) -> Option<Arc<dyn IFile>> {
        self.table
            .lock()
            .get(idx)
            .and_then(|entry| entry.as_ref())
            .map(|fd| fd.file.clone())
    }

    /// Places `file` in the lowest free slot.
    pub fn allocate(&self, file: Arc<dyn IFile>, close_on_exec: bool) -> Option<usize> {
        let mut table = self.table.lock();
        let fd = FileDescriptor {
            file,
            close_on_exec,
        };

        if let Some(idx) = table.iter().position(|entry| entry.is_none()) {
            table[idx] = Some(fd);
            return Some(idx);
        }

        if table.len() >= self.capacity || table.try_reserve(1).is_err() {
            return None;
        }

        table.push(Some(fd));
        Some(table.len() - 1)
    }

    pub fn remove(&self, idx: usize) -> Option<Arc<dyn IFile>> {
        self.table
            .lock()
            .get_mut(idx)
            .and_then(|entry| entry.take())
            .map(|fd| fd.file)
    }

    pub fn set_close_on_exec(&self, idx: usize, close_on_exec: bool) -> bool {
        match self.table.lock().get_mut(idx) {
            Some(Some(fd)) => {
                fd.close_on_exec = close_on_exec;
                true
            }
            _ => false,
        }
    }

    pub fn open_count(&self) -> usize {
        self.table.lock().iter().filter(|e| e.is_some()).count()
    }
}

impl IFileDescriptorTable for FileDescriptorTable {
    fn fork(&self) -> Result<Arc<dyn IFileDescriptorTable>, ErrNo> {
        let table = self.table.lock();

        let mut copy = Vec::new();
        copy.try_reserve_exact(table.len())
            .map_err(|_| ErrNo::CannotAllocateMemory)?;
        copy.extend(table.iter().cloned());

        Ok(Arc::new(FileDescriptorTable {
            table: SpinMutex::new(copy),
            capacity: self.capacity,
        }))
    }

    fn on_execute(&self) {
        let mut table = self.table.lock();

        for (idx, entry) in table.iter_mut().enumerate() {
            if entry.as_ref().is_some_and(|fd| fd.close_on_exec) {
                log::trace!("Closing fd {} on exec", idx);
                *entry = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyFile;

    impl IFile for DummyFile {}

    fn file() -> Arc<dyn IFile> {
        Arc::new(DummyFile)
    }

    #[test]
    fn test_allocate_reuses_lowest_slot() {
        let table = FileDescriptorTable::new();

        assert_eq!(table.allocate(file(), false), Some(0));
        assert_eq!(table.allocate(file(), false), Some(1));
        assert_eq!(table.allocate(file(), false), Some(2));

        table.remove(1);

        assert_eq!(table.allocate(file(), false), Some(1));
    }

    #[test]
    fn test_capacity() {
        let table = FileDescriptorTable::with_capacity(1);

        assert_eq!(table.allocate(file(), false), Some(0));
        assert_eq!(table.allocate(file(), false), None);
    }

    #[test]
    fn test_fork_shares_files_but_not_slots() {
        let table = FileDescriptorTable::new();
        let shared = file();

        table.allocate(shared.clone(), false);

        let forked = table.fork().unwrap();
        let forked = forked.downcast_arc::<FileDescriptorTable>().ok().unwrap();

        // parent, child and local handle
        assert_eq!(Arc::strong_count(&shared), 3);

        forked.remove(0);
        assert_eq!(table.open_count(), 1);
        assert_eq!(forked.open_count(), 0);

        forked.allocate(file(), false);
        assert!(Arc::ptr_eq(&table.get(0).unwrap(), &shared));
    }

    #[test]
    fn test_on_execute_closes_marked_only() {
        let table = FileDescriptorTable::new();

        table.allocate(file(), false);
        table.allocate(file(), true);
        table.allocate(file(), false);
        assert!(table.set_close_on_exec(2, true));
        assert!(!table.set_close_on_exec(7, true));

        table.on_execute();

        assert!(table.get(0).is_some());
        assert!(table.get(1).is_none());
        assert!(table.get(2).is_none());
    }
}
