use core::fmt::{Debug, Display};
use core::ops::{Add, AddAssign, Sub, SubAssign};

/// An address in a process's user address space.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualAddress(usize);

impl VirtualAddress {
    #[inline(always)]
    pub const fn from_usize(addr: usize) -> Self {
        Self(addr)
    }

    #[inline(always)]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    #[inline(always)]
    pub const fn null() -> Self {
        Self(0)
    }

    #[inline(always)]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub const fn is_aligned(self, align: usize) -> bool {
        self.0 % align == 0
    }

    pub const fn is_page_aligned(self) -> bool {
        self.is_aligned(constants::PAGE_SIZE)
    }

    pub fn align_down(self, align: usize) -> Self {
        debug_assert!(align.is_power_of_two());

        Self(self.0 & !(align - 1))
    }

    /// Rounds up to `align`, returning `None` when the result would wrap.
    pub fn checked_align_up(self, align: usize) -> Option<Self> {
        debug_assert!(align.is_power_of_two());

        let mask = align - 1;
        self.0.checked_add(mask).map(|v| Self(v & !mask))
    }

    pub fn page_down(self) -> Self {
        self.align_down(constants::PAGE_SIZE)
    }

    pub fn in_page_offset(self) -> usize {
        self.0 % constants::PAGE_SIZE
    }

    pub fn checked_add(self, offset: usize) -> Option<Self> {
        self.0.checked_add(offset).map(Self)
    }

    pub fn checked_sub(self, offset: usize) -> Option<Self> {
        self.0.checked_sub(offset).map(Self)
    }

    pub fn off_by(self, offset: isize) -> Option<Self> {
        self.0.checked_add_signed(offset).map(Self)
    }

    /// Distance in bytes from `other` up to `self`.
    pub fn diff(self, other: Self) -> isize {
        self.0.wrapping_sub(other.0) as isize
    }
}

impl Add<usize> for VirtualAddress {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub<usize> for VirtualAddress {
    type Output = Self;

    fn sub(self, rhs: usize) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl Sub<VirtualAddress> for VirtualAddress {
    type Output = usize;

    fn sub(self, rhs: VirtualAddress) -> Self::Output {
        self.0 - rhs.0
    }
}

impl AddAssign<usize> for VirtualAddress {
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs;
    }
}

impl SubAssign<usize> for VirtualAddress {
    fn sub_assign(&mut self, rhs: usize) {
        self.0 -= rhs;
    }
}

impl Display for VirtualAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl Debug for VirtualAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "VirtualAddress({:#x})", self.0)
    }
}
