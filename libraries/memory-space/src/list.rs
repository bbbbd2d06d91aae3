use address::{VirtualAddress, VirtualAddressRange};
use alloc::vec::Vec;
use mmu_abstractions::{MMUError, IMMU};

use crate::{Segment, SegmentError};

/// The mapped regions of one process, kept sorted by start address and disjoint.
#[derive(Debug, Default)]
pub struct SegmentList {
    segments: Vec<Segment>,
}

impl SegmentList {
    pub const fn new() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    // index of the first segment ending after `addr`
    fn lower_bound(&self, addr: VirtualAddress) -> usize {
        self.segments.partition_point(|s| s.range().end() <= addr)
    }

    /// Fails if `range` intersects any segment in the list.
    pub fn check_available(&self, range: VirtualAddressRange) -> Result<(), SegmentError> {
        let idx = self.lower_bound(range.start());

        match self.segments.get(idx) {
            Some(existing) if existing.range().intersects(&range) => {
                Err(SegmentError::Overlapping {
                    existing: existing.range(),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn insert(&mut self, segment: Segment) -> Result<(), SegmentError> {
        self.check_available(segment.range())?;

        self.segments
            .try_reserve(1)
            .map_err(|_| SegmentError::OutOfMemory)?;

        let idx = self.lower_bound(segment.range().start());
        self.segments.insert(idx, segment);

        Ok(())
    }

    /// Maps `segment` into `mmu` and records it. Nothing is mapped if the range is taken.
    pub fn map_and_insert(
        &mut self,
        mmu: &mut dyn IMMU,
        segment: Segment,
    ) -> Result<(), SegmentMapError> {
        self.check_available(segment.range())?;

        self.segments
            .try_reserve(1)
            .map_err(|_| SegmentError::OutOfMemory)?;

        let range = segment.range();
        mmu.map_range(range.start(), range.len(), segment.permissions())?;

        let idx = self.lower_bound(range.start());
        self.segments.insert(idx, segment);

        Ok(())
    }

    pub fn remove(&mut self, start: VirtualAddress) -> Result<Segment, SegmentError> {
        let idx = self
            .segments
            .binary_search_by_key(&start, |s| s.range().start())
            .map_err(|_| SegmentError::NotFound)?;

        Ok(self.segments.remove(idx))
    }

    /// The segment containing `addr`, if any.
    pub fn find(&self, addr: VirtualAddress) -> Option<&Segment> {
        let idx = self.lower_bound(addr);

        self.segments.get(idx).filter(|s| s.range().contains(addr))
    }

    pub fn get(&self, start: VirtualAddress) -> Option<&Segment> {
        self.segments
            .binary_search_by_key(&start, |s| s.range().start())
            .ok()
            .map(|idx| &self.segments[idx])
    }

    /// Moves the end of the segment starting at `start`, keeping its start fixed.
    ///
    /// Only the bookkeeping changes; the caller maps or unmaps the difference.
    pub fn resize(
        &mut self,
        start: VirtualAddress,
        new_end: VirtualAddress,
    ) -> Result<Segment, SegmentError> {
        if !new_end.is_page_aligned() {
            return Err(SegmentError::Misaligned);
        }

        if new_end <= start {
            return Err(SegmentError::Empty);
        }

        let idx = self
            .segments
            .binary_search_by_key(&start, |s| s.range().start())
            .map_err(|_| SegmentError::NotFound)?;

        if let Some(next) = self.segments.get(idx + 1) {
            if next.range().start() < new_end {
                return Err(SegmentError::Overlapping {
                    existing: next.range(),
                });
            }
        }

        let segment = &mut self.segments[idx];
        segment.set_range(VirtualAddressRange::from_start_end(start, new_end));

        Ok(*segment)
    }

    /// Deep copy with independent storage. Reports allocation failure instead of aborting.
    pub fn try_clone(&self) -> Result<Self, SegmentError> {
        let mut segments = Vec::new();
        segments
            .try_reserve_exact(self.segments.len())
            .map_err(|_| SegmentError::OutOfMemory)?;
        segments.extend_from_slice(&self.segments);

        Ok(Self { segments })
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Segment> + '_ {
        self.segments.drain(..)
    }

    /// Unmaps every segment from `mmu` and empties the list.
    pub fn unmap_all(&mut self, mmu: &mut dyn IMMU) {
        for segment in self.segments.drain(..) {
            let range = segment.range();

            if let Err(e) = mmu.unmap_range(range.start(), range.len()) {
                log::warn!("Failed to unmap segment {:?}: {:?}", range, e);
            }
        }
    }

    /// End of the highest segment in the list.
    pub fn highest_end(&self) -> Option<VirtualAddress> {
        self.segments.last().map(|s| s.range().end())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentMapError {
    Segment(SegmentError),
    Mmu(MMUError),
}

impl From<SegmentError> for SegmentMapError {
    fn from(value: SegmentError) -> Self {
        SegmentMapError::Segment(value)
    }
}

impl From<MMUError> for SegmentMapError {
    fn from(value: MMUError) -> Self {
        SegmentMapError::Mmu(value)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use mmu_abstractions::GenericMappingFlags;
    use rand::Rng;
    use test_utilities::memory::{MMUEvent, TestMMU};

    use super::*;
    use crate::SegmentKind;

    const PAGE: usize = constants::PAGE_SIZE;

    fn range(start_page: usize, pages: usize) -> VirtualAddressRange {
        VirtualAddressRange::from_start_len(VirtualAddress::from_usize(start_page * PAGE), pages * PAGE)
    }

    fn data(start_page: usize, pages: usize) -> Segment {
        Segment::new(
            range(start_page, pages),
            SegmentKind::Data,
            GenericMappingFlags::user_data(),
        )
        .unwrap()
    }

    fn assert_sorted_and_disjoint(list: &SegmentList) {
        let segments = list.iter().collect::<Vec<_>>();

        for pair in segments.windows(2) {
            assert!(pair[0].range().end() <= pair[1].range().start());
        }
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut list = SegmentList::new();

        list.insert(data(10, 2)).unwrap();
        list.insert(data(1, 1)).unwrap();
        list.insert(data(5, 3)).unwrap();

        let starts = list
            .iter()
            .map(|s| s.range().start().as_usize() / PAGE)
            .collect::<Vec<_>>();

        assert_eq!(starts, [1, 5, 10]);
    }

    #[test]
    fn test_insert_rejects_overlap() {
        let mut list = SegmentList::new();
        list.insert(data(4, 4)).unwrap();

        assert_eq!(
            list.insert(data(7, 2)),
            Err(SegmentError::Overlapping {
                existing: range(4, 4)
            })
        );
        assert!(list.insert(data(2, 3)).is_err());
        assert!(list.insert(data(5, 1)).is_err());
        assert!(list.insert(data(3, 8)).is_err());

        // adjacent is fine
        list.insert(data(8, 1)).unwrap();
        list.insert(data(3, 1)).unwrap();

        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_find_and_remove() {
        let mut list = SegmentList::new();
        list.insert(data(2, 2)).unwrap();
        list.insert(data(6, 1)).unwrap();

        let inside = VirtualAddress::from_usize(3 * PAGE + 0x10);
        assert_eq!(list.find(inside).map(|s| s.range()), Some(range(2, 2)));
        assert!(list.find(VirtualAddress::from_usize(4 * PAGE)).is_none());

        assert_eq!(
            list.remove(VirtualAddress::from_usize(3 * PAGE)),
            Err(SegmentError::NotFound)
        );

        let removed = list.remove(VirtualAddress::from_usize(2 * PAGE)).unwrap();
        assert_eq!(removed.range(), range(2, 2));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_resize_stops_at_next_segment() {
        let mut list = SegmentList::new();
        list.insert(data(1, 1)).unwrap();
        list.insert(data(4, 1)).unwrap();

        let start = VirtualAddress::from_usize(PAGE);

        let grown = list.resize(start, VirtualAddress::from_usize(4 * PAGE)).unwrap();
        assert_eq!(grown.range(), range(1, 3));

        assert!(matches!(
            list.resize(start, VirtualAddress::from_usize(5 * PAGE)),
            Err(SegmentError::Overlapping { .. })
        ));
        assert_eq!(list.resize(start, start), Err(SegmentError::Empty));
        assert_eq!(
            list.resize(start, VirtualAddress::from_usize(2 * PAGE + 1)),
            Err(SegmentError::Misaligned)
        );

        let shrunk = list.resize(start, VirtualAddress::from_usize(2 * PAGE)).unwrap();
        assert_eq!(shrunk.range(), range(1, 1));
    }

    #[test]
    fn test_try_clone_is_independent() {
        let mut list = SegmentList::new();
        list.insert(data(1, 1)).unwrap();

        let mut cloned = list.try_clone().unwrap();
        cloned.insert(data(3, 1)).unwrap();
        cloned.remove(VirtualAddress::from_usize(PAGE)).unwrap();

        assert_eq!(list.len(), 1);
        assert_eq!(list.iter().next().unwrap().range(), range(1, 1));
        assert_eq!(cloned.len(), 1);
        assert_eq!(cloned.iter().next().unwrap().range(), range(3, 1));
    }

    #[test]
    fn test_map_and_insert_maps_once() {
        let mut mmu = TestMMU::new();
        let mut list = SegmentList::new();

        list.map_and_insert(&mut mmu, data(2, 2)).unwrap();
        assert!(mmu.is_mapped(VirtualAddress::from_usize(3 * PAGE)));

        mmu.clear_events();

        let result = list.map_and_insert(&mut mmu, data(3, 1));
        assert!(matches!(
            result,
            Err(SegmentMapError::Segment(SegmentError::Overlapping { .. }))
        ));
        assert!(mmu.events().is_empty());
    }

    #[test]
    fn test_map_failure_leaves_list_untouched() {
        let mut mmu = TestMMU::new();
        mmu.fail_map_after(0);

        let mut list = SegmentList::new();
        let result = list.map_and_insert(&mut mmu, data(2, 2));

        assert_eq!(result, Err(SegmentMapError::Mmu(MMUError::OutOfMemory)));
        assert!(list.is_empty());
    }

    #[test]
    fn test_unmap_all() {
        let mut mmu = TestMMU::new();
        let mut list = SegmentList::new();

        list.map_and_insert(&mut mmu, data(1, 1)).unwrap();
        list.map_and_insert(&mut mmu, data(8, 2)).unwrap();
        mmu.clear_events();

        list.unmap_all(&mut mmu);

        assert!(list.is_empty());
        assert_eq!(mmu.mapped_pages(), 0);
        assert_eq!(
            mmu.events(),
            [
                MMUEvent::Unmap {
                    start: VirtualAddress::from_usize(PAGE),
                    len: PAGE
                },
                MMUEvent::Unmap {
                    start: VirtualAddress::from_usize(8 * PAGE),
                    len: 2 * PAGE
                },
            ]
        );
    }

    #[test]
    fn test_random_inserts_stay_disjoint() {
        let mut rng = rand::rng();
        let mut list = SegmentList::new();
        let mut occupied = [false; 256];

        for _ in 0..512 {
            let start = rng.random_range(0..250);
            let pages = rng.random_range(1..=6);

            let free = occupied[start..start + pages].iter().all(|o| !o);
            let result = list.insert(data(start, pages));

            assert_eq!(result.is_ok(), free, "insert [{start}, +{pages})");

            if free {
                occupied[start..start + pages].fill(true);
            }
        }

        assert_sorted_and_disjoint(&list);

        let total = list.iter().map(|s| s.len() / PAGE).sum::<usize>();
        assert_eq!(total, occupied.iter().filter(|o| **o).count());
    }
}
