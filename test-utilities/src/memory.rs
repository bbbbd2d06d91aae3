use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    vec::Vec,
};

use address::VirtualAddress;
use constants::PAGE_SIZE;
use hermit_sync::SpinMutex;
use mmu_abstractions::{GenericMappingFlags, MMUError, MMUHandle, IMMU};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MMUEvent {
    Map {
        start: VirtualAddress,
        len: usize,
        flags: GenericMappingFlags,
    },
    Unmap {
        start: VirtualAddress,
        len: usize,
    },
    Flush,
}

struct Page {
    flags: GenericMappingFlags,
    data: Box<[u8; PAGE_SIZE]>,
}

/// Host-backed address space: every mapped page is a heap buffer keyed by its page number.
pub struct TestMMU {
    pages: BTreeMap<usize, Page>,
    events: SpinMutex<Vec<MMUEvent>>,
    // number of map_range calls still allowed to succeed
    map_budget: Option<usize>,
    fail_fork: bool,
    flushes: AtomicUsize,
}

impl Default for TestMMU {
    fn default() -> Self {
        Self::new()
    }
}

impl TestMMU {
    pub fn new() -> Self {
        Self {
            pages: BTreeMap::new(),
            events: SpinMutex::new(Vec::new()),
            map_budget: None,
            fail_fork: false,
            flushes: AtomicUsize::new(0),
        }
    }

    pub fn build(self) -> MMUHandle {
        Arc::new(SpinMutex::new(self))
    }

    /// Lets `n` more `map_range` calls succeed, then fails with `OutOfMemory`.
    pub fn fail_map_after(&mut self, n: usize) {
        self.map_budget = Some(n);
    }

    pub fn set_fail_fork(&mut self, fail: bool) {
        self.fail_fork = fail;
    }

    pub fn events(&self) -> Vec<MMUEvent> {
        self.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn mapped_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn is_mapped(&self, vaddr: VirtualAddress) -> bool {
        self.pages.contains_key(&Self::page_number(vaddr))
    }

    pub fn flags_of(&self, vaddr: VirtualAddress) -> Option<GenericMappingFlags> {
        self.pages.get(&Self::page_number(vaddr)).map(|p| p.flags)
    }

    pub fn read_vec(&self, vaddr: VirtualAddress, len: usize) -> Result<Vec<u8>, MMUError> {
        let mut buf = vec![0u8; len];
        self.read_bytes(vaddr, &mut buf)?;
        Ok(buf)
    }

    fn page_number(vaddr: VirtualAddress) -> usize {
        vaddr.as_usize() / PAGE_SIZE
    }

    fn ensure_range(vaddr: VirtualAddress, len: usize) -> Result<(), MMUError> {
        if !vaddr.is_page_aligned() || len % PAGE_SIZE != 0 {
            return Err(MMUError::MisalignedAddress);
        }

        vaddr.checked_add(len).ok_or(MMUError::InvalidAddress)?;

        Ok(())
    }

    // Splits [vaddr, vaddr + len) into per-page chunks.
    fn chunks(
        vaddr: VirtualAddress,
        len: usize,
    ) -> Result<impl Iterator<Item = (usize, usize, usize, usize)>, MMUError> {
        let start = vaddr.as_usize();
        let end = start.checked_add(len).ok_or(MMUError::InvalidAddress)?;

        let mut cursor = start;
        Ok(std::iter::from_fn(move || {
            if cursor >= end {
                return None;
            }

            let page = cursor / PAGE_SIZE;
            let offset = cursor % PAGE_SIZE;
            let n = std::cmp::min(PAGE_SIZE - offset, end - cursor);
            let buf_offset = cursor - start;

            cursor += n;

            Some((page, offset, n, buf_offset))
        }))
    }
}

impl IMMU for TestMMU {
    fn map_range(
        &mut self,
        vaddr: VirtualAddress,
        len: usize,
        flags: GenericMappingFlags,
    ) -> Result<(), MMUError> {
        Self::ensure_range(vaddr, len)?;

        if let Some(budget) = self.map_budget.as_mut() {
            if *budget == 0 {
                return Err(MMUError::OutOfMemory);
            }

            *budget -= 1;
        }

        let first = Self::page_number(vaddr);
        let count = len / PAGE_SIZE;

        if let Some(page) = (first..first + count).find(|p| self.pages.contains_key(p)) {
            return Err(MMUError::AlreadyMapped {
                vaddr: VirtualAddress::from_usize(page * PAGE_SIZE),
            });
        }

        for page in first..first + count {
            self.pages.insert(
                page,
                Page {
                    flags,
                    data: Box::new([0; PAGE_SIZE]),
                },
            );
        }

        self.events.lock().push(MMUEvent::Map {
            start: vaddr,
            len,
            flags,
        });

        Ok(())
    }

    fn unmap_range(&mut self, vaddr: VirtualAddress, len: usize) -> Result<(), MMUError> {
        Self::ensure_range(vaddr, len)?;

        let first = Self::page_number(vaddr);
        let count = len / PAGE_SIZE;

        if let Some(page) = (first..first + count).find(|p| !self.pages.contains_key(p)) {
            return Err(MMUError::NotMapped {
                vaddr: VirtualAddress::from_usize(page * PAGE_SIZE),
            });
        }

        for page in first..first + count {
            self.pages.remove(&page);
        }

        self.events.lock().push(MMUEvent::Unmap { start: vaddr, len });

        Ok(())
    }

    fn query(&self, vaddr: VirtualAddress) -> Result<GenericMappingFlags, MMUError> {
        self.flags_of(vaddr)
            .ok_or(MMUError::NotMapped { vaddr: vaddr.page_down() })
    }

    fn read_bytes(&self, vaddr: VirtualAddress, buf: &mut [u8]) -> Result<(), MMUError> {
        for (page, _, _, _) in Self::chunks(vaddr, buf.len())? {
            if !self.pages.contains_key(&page) {
                return Err(MMUError::PageNotReadable {
                    vaddr: VirtualAddress::from_usize(page * PAGE_SIZE),
                });
            }
        }

        for (page, offset, n, buf_offset) in Self::chunks(vaddr, buf.len())? {
            let data = &self.pages[&page].data;
            buf[buf_offset..buf_offset + n].copy_from_slice(&data[offset..offset + n]);
        }

        Ok(())
    }

    fn write_bytes(&mut self, vaddr: VirtualAddress, buf: &[u8]) -> Result<(), MMUError> {
        for (page, _, _, _) in Self::chunks(vaddr, buf.len())? {
            if !self.pages.contains_key(&page) {
                return Err(MMUError::PageNotWritable {
                    vaddr: VirtualAddress::from_usize(page * PAGE_SIZE),
                });
            }
        }

        for (page, offset, n, buf_offset) in Self::chunks(vaddr, buf.len())? {
            if let Some(p) = self.pages.get_mut(&page) {
                p.data[offset..offset + n].copy_from_slice(&buf[buf_offset..buf_offset + n]);
            }
        }

        Ok(())
    }

    fn fork_mmu(&self) -> Result<MMUHandle, MMUError> {
        if self.fail_fork {
            return Err(MMUError::OutOfMemory);
        }

        let pages = self
            .pages
            .iter()
            .map(|(vpn, page)| {
                (
                    *vpn,
                    Page {
                        flags: page.flags,
                        data: page.data.clone(),
                    },
                )
            })
            .collect();

        Ok(Self {
            pages,
            ..Self::new()
        }
        .build())
    }

    fn flush_translations(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.events.lock().push(MMUEvent::Flush);
    }
}

/// Runs `f` against the [`TestMMU`] behind `handle`. Panics if the handle holds another type.
pub fn inspect<R>(handle: &MMUHandle, f: impl FnOnce(&TestMMU) -> R) -> R {
    let guard = handle.lock();
    let mmu = guard
        .downcast_ref::<TestMMU>()
        .expect("address space is not a TestMMU");

    f(mmu)
}

/// Mutable counterpart of [`inspect`].
pub fn configure<R>(handle: &MMUHandle, f: impl FnOnce(&mut TestMMU) -> R) -> R {
    let mut guard = handle.lock();
    let mmu = guard
        .downcast_mut::<TestMMU>()
        .expect("address space is not a TestMMU");

    f(mmu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_across_pages() {
        let mut mmu = TestMMU::new();
        let base = VirtualAddress::from_usize(0x10000);

        mmu.map_range(base, 2 * PAGE_SIZE, GenericMappingFlags::user_data())
            .unwrap();

        let addr = base + (PAGE_SIZE - 3);
        mmu.write_bytes(addr, b"abcdef").unwrap();

        assert_eq!(mmu.read_vec(addr, 6).unwrap(), b"abcdef");
        assert!(mmu.write_bytes(base + 2 * PAGE_SIZE - 1, b"xy").is_err());
    }

    #[test]
    fn test_fork_copies_contents() {
        let mut mmu = TestMMU::new();
        let base = VirtualAddress::from_usize(0x10000);

        mmu.map_range(base, PAGE_SIZE, GenericMappingFlags::user_data())
            .unwrap();
        mmu.write_bytes(base, &[1, 2, 3]).unwrap();

        let forked = mmu.fork_mmu().unwrap();
        mmu.write_bytes(base, &[9]).unwrap();

        inspect(&forked, |child| {
            assert_eq!(child.read_vec(base, 3).unwrap(), [1, 2, 3]);
            assert!(child.events().is_empty());
        });
    }

    #[test]
    fn test_map_budget() {
        let mut mmu = TestMMU::new();
        mmu.fail_map_after(1);

        let flags = GenericMappingFlags::user_data();
        mmu.map_range(VirtualAddress::from_usize(0x1000), PAGE_SIZE, flags)
            .unwrap();

        assert_eq!(
            mmu.map_range(VirtualAddress::from_usize(0x2000), PAGE_SIZE, flags),
            Err(MMUError::OutOfMemory)
        );
    }
}
