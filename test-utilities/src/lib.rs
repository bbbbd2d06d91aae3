pub mod elf;
pub mod fs;
pub mod kernel;
pub mod memory;
pub mod task;

#[cfg(feature = "test_log")]
mod logging;
