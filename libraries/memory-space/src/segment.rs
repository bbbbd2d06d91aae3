use address::VirtualAddressRange;
use mmu_abstractions::GenericMappingFlags;

/// Scheduling/accounting class of a segment. Protection is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    None,
    Text,
    Data,
}

impl SegmentKind {
    /// Classifies a loadable region from its read/write/execute flags.
    pub fn classify(read: bool, write: bool, execute: bool) -> Self {
        match (read, write, execute) {
            (false, false, false) => SegmentKind::None,
            (_, _, true) => SegmentKind::Text,
            _ => SegmentKind::Data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentError {
    Misaligned,
    Empty,
    Overlapping { existing: VirtualAddressRange },
    NotFound,
    OutOfMemory,
}

/// One mapped region of a user address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    range: VirtualAddressRange,
    kind: SegmentKind,
    permissions: GenericMappingFlags,
}

impl Segment {
    pub fn new(
        range: VirtualAddressRange,
        kind: SegmentKind,
        permissions: GenericMappingFlags,
    ) -> Result<Self, SegmentError> {
        if !range.start().is_page_aligned() || !range.end().is_page_aligned() {
            return Err(SegmentError::Misaligned);
        }

        if range.is_empty() {
            return Err(SegmentError::Empty);
        }

        Ok(Self {
            range,
            kind,
            permissions,
        })
    }

    pub fn range(&self) -> VirtualAddressRange {
        self.range
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn permissions(&self) -> GenericMappingFlags {
        self.permissions
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub(crate) fn set_range(&mut self, range: VirtualAddressRange) {
        self.range = range;
    }
}
