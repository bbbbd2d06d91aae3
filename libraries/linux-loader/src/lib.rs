#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

mod elf;
mod loader;
mod process;
mod stack;
mod symbols;

pub use elf::*;
pub use loader::*;
pub use process::*;
pub use stack::*;
pub use symbols::*;
