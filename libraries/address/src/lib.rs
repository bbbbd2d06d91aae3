#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

#[cfg(test)]
extern crate alloc;

mod virtual_address;
mod virtual_address_range;

pub use virtual_address::*;
pub use virtual_address_range::*;

pub const PAGE_SIZE_BITS: usize = 0xc;
