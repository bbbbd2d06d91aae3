#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

mod list;
mod segment;

pub use list::*;
pub use segment::*;
