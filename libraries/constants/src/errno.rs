#[repr(isize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrNo {
    // No such process
    NoSuchProcess = -3,
    // Interrupted system call
    InterruptedSystemCall = -4,
    // Argument list too long
    ArgumentListTooLong = -7,
    // Exec format error
    ExecFormatError = -8,
    // No child processes
    NoChildProcesses = -10,
    // Resource temporarily unavailable
    ResourceTemporarilyUnavailable = -11,
    // Cannot allocate memory
    CannotAllocateMemory = -12,
    // Bad address
    BadAddress = -14,
    // Invalid argument
    InvalidArgument = -22,
    // File name too long
    FileNameTooLong = -36,
}
