#![no_std]

mod errno;
pub use errno::ErrNo;

pub const PAGE_SIZE: usize = 4096;

pub const USER_STACK_SIZE: usize = 0x10_0000; // 1MB
/// Exclusive upper bound of the initial user stack, the first address above user space.
pub const USER_STACK_TOP: usize = 0x0000_003f_ffff_f000;
/// Where the mmap growth cursor starts after a fresh image is loaded.
pub const MMAP_BASE: usize = 0x0000_0020_0000_0000;

/// Well-known pid of the bootstrap process, the target of orphan reparenting.
pub const INIT_PID: u32 = 1;

pub const MAX_PATH_LEN: usize = 4096;
pub const MAX_ARGV_COUNT: usize = 4096;
pub const MAX_ENVP_COUNT: usize = 4096;
