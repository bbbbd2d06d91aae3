use address::VirtualAddress;
use constants::ErrNo;
use memory_space::SegmentList;
use mmu_abstractions::IMMU;

use crate::{DebugSymbols, PreparedElf};

/// The error type for the loader's `prepare`/`load` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The image does not start with the ELF magic.
    NotElf,
    /// The image is an ELF file this kernel can not run (class, byte order, version or type).
    NotExecutable,
    /// A header or table points past the end of the image.
    IncompleteExecutable,
    /// A loadable segment declares more file bytes than memory bytes.
    InvalidSegment,
    /// Two loadable segments, or a segment and the stack, share a page.
    OverlappingSegments,
    /// The kernel ran out of memory.
    InsufficientMemory,
    /// The address space refused a mapping or a copy.
    FailedToLoad,
    /// A segment wraps around the address space.
    TooLarge,
    /// The argument and environment strings do not fit on the stack.
    StackOverflow,
    /// The required argument count is exceeded.
    ArgumentCountExceeded,
    /// The required environment variable count is exceeded.
    EnvironmentCountExceeded,
}

impl LoadError {
    /// Whether the image was recognised as ELF before the error occurred.
    pub fn is_format_determined(&self) -> bool {
        !matches!(self, LoadError::NotElf)
    }
}

impl From<LoadError> for ErrNo {
    fn from(value: LoadError) -> Self {
        match value {
            LoadError::NotElf
            | LoadError::NotExecutable
            | LoadError::IncompleteExecutable
            | LoadError::InvalidSegment
            | LoadError::OverlappingSegments
            | LoadError::TooLarge => ErrNo::ExecFormatError,
            LoadError::InsufficientMemory | LoadError::FailedToLoad => {
                ErrNo::CannotAllocateMemory
            }
            LoadError::StackOverflow
            | LoadError::ArgumentCountExceeded
            | LoadError::EnvironmentCountExceeded => ErrNo::ArgumentListTooLong,
        }
    }
}

/// What a successful load leaves behind.
pub struct LoadedElf {
    pub entry: VirtualAddress,
    /// First page after the highest loaded segment.
    pub image_end: VirtualAddress,
    pub symbols: Option<DebugSymbols>,
}

/// Validates `image` and loads it into `mmu`, recording the mapped segments.
///
/// Nothing is mapped unless the whole image validates.
pub fn construct(
    image: &[u8],
    mmu: &mut dyn IMMU,
    segments: &mut SegmentList,
) -> Result<LoadedElf, LoadError> {
    PreparedElf::prepare(image)?.load(mmu, segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_determined() {
        assert!(!LoadError::NotElf.is_format_determined());
        assert!(LoadError::NotExecutable.is_format_determined());
        assert!(LoadError::OverlappingSegments.is_format_determined());
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(ErrNo::from(LoadError::NotElf), ErrNo::ExecFormatError);
        assert_eq!(
            ErrNo::from(LoadError::InsufficientMemory),
            ErrNo::CannotAllocateMemory
        );
        assert_eq!(
            ErrNo::from(LoadError::ArgumentCountExceeded),
            ErrNo::ArgumentListTooLong
        );
    }
}
