#![cfg_attr(not(feature = "std"), no_std)]

use address::VirtualAddress;
use alloc::sync::Arc;
use downcast_rs::{impl_downcast, DowncastSync};
use hermit_sync::SpinMutex;

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

mod flags;

pub use flags::GenericMappingFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MMUError {
    InvalidAddress,
    MisalignedAddress,
    AlreadyMapped { vaddr: VirtualAddress },
    NotMapped { vaddr: VirtualAddress },
    OutOfMemory,
    PrivilegeError,
    PageNotReadable { vaddr: VirtualAddress },
    PageNotWritable { vaddr: VirtualAddress },
}

/// Shared handle to one address space.
pub type MMUHandle = Arc<SpinMutex<dyn IMMU>>;

/// A user address space as seen by the process-lifecycle code.
///
/// Ranges passed to `map_range`/`unmap_range` must be page aligned.
/// `read_bytes`/`write_bytes` access memory through the kernel's view, so they
/// only require the pages to be mapped, not to carry matching user permissions.
pub trait IMMU: DowncastSync {
    fn map_range(
        &mut self,
        vaddr: VirtualAddress,
        len: usize,
        flags: GenericMappingFlags,
    ) -> Result<(), MMUError>;

    fn unmap_range(&mut self, vaddr: VirtualAddress, len: usize) -> Result<(), MMUError>;

    fn query(&self, vaddr: VirtualAddress) -> Result<GenericMappingFlags, MMUError>;

    fn read_bytes(&self, vaddr: VirtualAddress, buf: &mut [u8]) -> Result<(), MMUError>;

    fn write_bytes(&mut self, vaddr: VirtualAddress, buf: &[u8]) -> Result<(), MMUError>;

    /// Creates a copy of this address space with identical mappings and contents.
    fn fork_mmu(&self) -> Result<MMUHandle, MMUError>;

    /// Drops every cached translation of this address space.
    fn flush_translations(&self);
}

impl_downcast!(sync IMMU);

impl dyn IMMU {
    /// Writes `len` zero bytes starting at `vaddr`.
    pub fn fill_zero(&mut self, vaddr: VirtualAddress, len: usize) -> Result<(), MMUError> {
        const CHUNK: [u8; 256] = [0; 256];

        let mut written = 0;
        while written < len {
            let n = core::cmp::min(CHUNK.len(), len - written);
            self.write_bytes(vaddr + written, &CHUNK[..n])?;
            written += n;
        }

        Ok(())
    }

    pub fn import<T: Copy>(&self, vaddr: VirtualAddress) -> Result<T, MMUError> {
        let mut value = core::mem::MaybeUninit::<T>::zeroed();
        // SAFETY: the buffer covers exactly the storage of `value`.
        let bytes = unsafe {
            core::slice::from_raw_parts_mut(value.as_mut_ptr() as *mut u8, core::mem::size_of::<T>())
        };

        self.read_bytes(vaddr, bytes)?;

        // SAFETY: `T: Copy` values read from user memory are plain data.
        Ok(unsafe { value.assume_init() })
    }

    pub fn export<T: Copy>(&mut self, vaddr: VirtualAddress, value: T) -> Result<(), MMUError> {
        // SAFETY: reads exactly the bytes of `value`.
        let bytes = unsafe {
            core::slice::from_raw_parts(&value as *const T as *const u8, core::mem::size_of::<T>())
        };

        self.write_bytes(vaddr, bytes)
    }

    /// Like [`Self::export`] but requires the destination to be user writable.
    pub fn export_to_user<T: Copy>(
        &mut self,
        vaddr: VirtualAddress,
        value: T,
    ) -> Result<(), MMUError> {
        let size = core::mem::size_of::<T>();
        let last = vaddr.checked_add(size.saturating_sub(1)).ok_or(MMUError::InvalidAddress)?;

        for page in [vaddr.page_down(), last.page_down()] {
            let flags = self.query(page)?;

            if !flags.contains(GenericMappingFlags::User) {
                return Err(MMUError::PrivilegeError);
            }

            if !flags.contains(GenericMappingFlags::Writable) {
                return Err(MMUError::PageNotWritable { vaddr: page });
            }
        }

        self.export(vaddr, value)
    }
}
