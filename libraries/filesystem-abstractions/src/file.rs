use alloc::sync::Arc;
use constants::ErrNo;
use downcast_rs::{impl_downcast, DowncastSync};

/// An open file object. Descriptors in different tables may share one.
pub trait IFile: DowncastSync {
    fn read(&self, _buf: &mut [u8]) -> usize {
        0
    }

    fn write(&self, _buf: &[u8]) -> usize {
        0
    }
}

impl_downcast!(sync IFile);

/// The per-process descriptor table as seen by the process lifecycle.
pub trait IFileDescriptorTable: DowncastSync {
    /// Creates an independent table whose descriptors share this table's open files.
    fn fork(&self) -> Result<Arc<dyn IFileDescriptorTable>, ErrNo>;

    /// Closes every descriptor marked close-on-exec.
    fn on_execute(&self);
}

impl_downcast!(sync IFileDescriptorTable);
