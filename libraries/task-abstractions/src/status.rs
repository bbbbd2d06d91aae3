#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Interrupt = 2,
    Kill = 9,
    Terminate = 15,
    Child = 17,
}

impl Signal {
    pub const fn number(self) -> u8 {
        self as u8
    }
}

/// How a reaped child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Exited(u8),
    Signaled(Signal),
}

impl WaitStatus {
    /// Encodes the status in the `wstatus` layout expected by userspace.
    pub const fn to_raw(self) -> i32 {
        match self {
            WaitStatus::Exited(code) => (code as i32) << 8,
            WaitStatus::Signaled(sig) => (sig.number() as i32) & 0x7f,
        }
    }
}
