#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

mod fd_table;
mod file;
mod mount;

pub use fd_table::*;
pub use file::*;
pub use mount::*;
