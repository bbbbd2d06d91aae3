use core::fmt::Debug;

use crate::VirtualAddress;

/// A half-open range `[start, end)` of virtual addresses.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct VirtualAddressRange {
    start: VirtualAddress,
    end: VirtualAddress,
}

impl VirtualAddressRange {
    pub fn from_start_end(start: VirtualAddress, end: VirtualAddress) -> Self {
        debug_assert!(start <= end);

        Self { start, end }
    }

    pub fn from_start_len(start: VirtualAddress, len: usize) -> Self {
        Self::from_start_end(start, start + len)
    }

    /// Like [`Self::from_start_len`] but reports address-space wraparound instead of panicking.
    pub fn checked_from_start_len(start: VirtualAddress, len: usize) -> Option<Self> {
        start.checked_add(len).map(|end| Self { start, end })
    }

    pub fn start(&self) -> VirtualAddress {
        self.start
    }

    pub fn end(&self) -> VirtualAddress {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, addr: VirtualAddress) -> bool {
        self.start <= addr && addr < self.end
    }

    pub fn contains_range(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Expands both ends outwards to page boundaries.
    pub fn page_aligned(&self) -> Option<Self> {
        let end = self.end.checked_align_up(constants::PAGE_SIZE)?;

        Some(Self {
            start: self.start.page_down(),
            end,
        })
    }
}

impl Debug for VirtualAddressRange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start.as_usize(), self.end.as_usize())
    }
}
