#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(any(feature = "std", test))]
extern crate std;

extern crate alloc;

mod brk;
mod environment;
mod exec;
mod exit;
mod fork;
mod process;
mod registry;
mod wait;

#[cfg(test)]
mod test_support;

pub use environment::*;
pub use process::*;
pub use registry::*;
pub use wait::WaitTarget;
