use address::{VirtualAddress, VirtualAddressRange};
use constants::{ErrNo, PAGE_SIZE};
use log::{trace, warn};
use memory_space::{Segment, SegmentKind, SegmentMapError};
use mmu_abstractions::GenericMappingFlags;

use crate::LinuxProcess;

impl LinuxProcess {
    /// Moves the program break by `increment` bytes and returns the previous break.
    ///
    /// The heap is a data segment starting at the page after the loaded image. Whole
    /// pages are mapped or unmapped as the break crosses page boundaries. The break
    /// never goes below the heap start, and the heap never grows into another segment.
    pub fn sbrk(&self, increment: isize) -> Result<VirtualAddress, ErrNo> {
        let mut memory = self.memory.lock();
        let mmu = memory.mmu.clone().ok_or(ErrNo::NoSuchProcess)?;
        let old = memory.brk;

        if increment == 0 {
            return Ok(old.end);
        }

        let new_end = old
            .end
            .off_by(increment)
            .filter(|end| *end >= old.start)
            .ok_or(ErrNo::CannotAllocateMemory)?;

        let old_top = old.end.checked_align_up(PAGE_SIZE).ok_or(ErrNo::CannotAllocateMemory)?;
        let new_top = new_end.checked_align_up(PAGE_SIZE).ok_or(ErrNo::CannotAllocateMemory)?;

        let mut mmu = mmu.lock();

        if new_top > old_top {
            if old_top == old.start {
                let heap = Segment::new(
                    VirtualAddressRange::from_start_end(old.start, new_top),
                    SegmentKind::Data,
                    GenericMappingFlags::user_data(),
                )
                .map_err(|_| ErrNo::CannotAllocateMemory)?;

                memory
                    .segments
                    .map_and_insert(&mut *mmu, heap)
                    .map_err(|e| self.heap_error(new_top, e))?;
            } else {
                memory
                    .segments
                    .resize(old.start, new_top)
                    .map_err(|e| self.heap_error(new_top, e.into()))?;

                let mapped =
                    mmu.map_range(old_top, new_top - old_top, GenericMappingFlags::user_data());

                if let Err(e) = mapped {
                    if let Err(rollback) = memory.segments.resize(old.start, old_top) {
                        warn!(
                            "Heap segment of process {} is out of sync: {rollback:?}",
                            self.pid()
                        );
                    }

                    return Err(self.heap_error(new_top, e.into()));
                }
            }
        } else if new_top < old_top {
            if let Err(e) = mmu.unmap_range(new_top, old_top - new_top) {
                warn!("Failed to unmap heap pages of process {}: {e:?}", self.pid());
            }

            let shrunk = if new_top == old.start {
                memory.segments.remove(old.start).map(|_| ())
            } else {
                memory.segments.resize(old.start, new_top).map(|_| ())
            };

            if let Err(e) = shrunk {
                warn!("Heap segment of process {} is out of sync: {e:?}", self.pid());
            }
        }

        memory.brk.end = new_end;

        trace!(
            "Process {} moved its break from {} to {}",
            self.pid(),
            old.end,
            new_end
        );

        Ok(old.end)
    }

    fn heap_error(&self, new_top: VirtualAddress, error: SegmentMapError) -> ErrNo {
        warn!(
            "Process {} can not grow its heap to {}: {error:?}",
            self.pid(),
            new_top
        );

        ErrNo::CannotAllocateMemory
    }
}

#[cfg(test)]
mod tests {
    use test_utilities::{
        kernel::TestKernel,
        memory::{configure, inspect},
    };

    use super::*;
    use crate::test_support::spawn_init;

    fn heap_segment(process: &LinuxProcess) -> Option<Segment> {
        let start = process.program_break().start;

        process
            .segments()
            .into_iter()
            .find(|s| s.range().start() == start)
    }

    #[test_log::test]
    fn test_grow_from_empty_heap() {
        let kernel = TestKernel::new().build();
        let (_env, init) = spawn_init(&kernel);
        let start = init.program_break().start;
        let mmu = init.mmu().unwrap();
        let pages_before = inspect(&mmu, |m| m.mapped_pages());

        assert_eq!(init.sbrk(0), Ok(start));
        assert!(heap_segment(&init).is_none());

        assert_eq!(init.sbrk(100), Ok(start));
        assert_eq!(init.sbrk(0), Ok(start + 100));

        let heap = heap_segment(&init).unwrap();
        assert_eq!(heap.kind(), SegmentKind::Data);
        assert_eq!(heap.len(), PAGE_SIZE);
        assert_eq!(inspect(&mmu, |m| m.mapped_pages()), pages_before + 1);
        assert_eq!(
            inspect(&mmu, |m| m.flags_of(start)),
            Some(GenericMappingFlags::user_data())
        );
    }

    #[test]
    fn test_grow_within_page_maps_nothing() {
        let kernel = TestKernel::new().build();
        let (_env, init) = spawn_init(&kernel);
        let start = init.program_break().start;
        let mmu = init.mmu().unwrap();

        init.sbrk(16).unwrap();
        let pages = inspect(&mmu, |m| m.mapped_pages());

        assert_eq!(init.sbrk(PAGE_SIZE as isize - 16), Ok(start + 16));
        assert_eq!(inspect(&mmu, |m| m.mapped_pages()), pages);
        assert_eq!(heap_segment(&init).unwrap().len(), PAGE_SIZE);

        // one byte more needs the next page
        init.sbrk(1).unwrap();
        assert_eq!(inspect(&mmu, |m| m.mapped_pages()), pages + 1);
        assert_eq!(heap_segment(&init).unwrap().len(), 2 * PAGE_SIZE);
    }

    #[test]
    fn test_shrink_releases_pages() {
        let kernel = TestKernel::new().build();
        let (_env, init) = spawn_init(&kernel);
        let start = init.program_break().start;
        let mmu = init.mmu().unwrap();
        let pages_before = inspect(&mmu, |m| m.mapped_pages());

        init.sbrk(3 * PAGE_SIZE as isize).unwrap();
        assert_eq!(inspect(&mmu, |m| m.mapped_pages()), pages_before + 3);

        assert_eq!(
            init.sbrk(-2 * PAGE_SIZE as isize),
            Ok(start + 3 * PAGE_SIZE)
        );
        assert_eq!(heap_segment(&init).unwrap().len(), PAGE_SIZE);
        assert_eq!(inspect(&mmu, |m| m.mapped_pages()), pages_before + 1);
        assert!(!inspect(&mmu, |m| m.is_mapped(start + PAGE_SIZE)));

        init.sbrk(-(PAGE_SIZE as isize)).unwrap();
        assert_eq!(init.sbrk(0), Ok(start));
        assert!(heap_segment(&init).is_none());
        assert_eq!(inspect(&mmu, |m| m.mapped_pages()), pages_before);
    }

    #[test]
    fn test_shrink_below_start() {
        let kernel = TestKernel::new().build();
        let (_env, init) = spawn_init(&kernel);
        let start = init.program_break().start;

        assert_eq!(init.sbrk(-1), Err(ErrNo::CannotAllocateMemory));

        init.sbrk(10).unwrap();
        assert_eq!(init.sbrk(-11), Err(ErrNo::CannotAllocateMemory));
        assert_eq!(init.sbrk(0), Ok(start + 10));
        assert_eq!(init.sbrk(isize::MIN), Err(ErrNo::CannotAllocateMemory));
    }

    #[test]
    fn test_heap_never_overlaps_other_segments() {
        let kernel = TestKernel::new().build();
        let (_env, init) = spawn_init(&kernel);
        let start = init.program_break().start;
        let mmu = init.mmu().unwrap();
        let segments_before = init.segments();
        let pages_before = inspect(&mmu, |m| m.mapped_pages());

        // reaches into the stack
        let too_far = (constants::USER_STACK_TOP - start.as_usize()) as isize;

        assert_eq!(init.sbrk(too_far), Err(ErrNo::CannotAllocateMemory));
        assert_eq!(init.segments(), segments_before);
        assert_eq!(inspect(&mmu, |m| m.mapped_pages()), pages_before);

        init.sbrk(PAGE_SIZE as isize).unwrap();
        assert_eq!(init.sbrk(too_far), Err(ErrNo::CannotAllocateMemory));
        assert_eq!(heap_segment(&init).unwrap().len(), PAGE_SIZE);
        assert_eq!(init.sbrk(0), Ok(start + PAGE_SIZE));

        assert_eq!(init.sbrk(isize::MAX), Err(ErrNo::CannotAllocateMemory));
    }

    #[test]
    fn test_map_failure_keeps_heap() {
        let kernel = TestKernel::new().build();
        let (_env, init) = spawn_init(&kernel);
        let start = init.program_break().start;
        let mmu = init.mmu().unwrap();

        init.sbrk(PAGE_SIZE as isize).unwrap();
        configure(&mmu, |m| m.fail_map_after(0));

        assert_eq!(
            init.sbrk(PAGE_SIZE as isize),
            Err(ErrNo::CannotAllocateMemory)
        );
        assert_eq!(init.sbrk(0), Ok(start + PAGE_SIZE));
        assert_eq!(heap_segment(&init).unwrap().len(), PAGE_SIZE);
        assert!(!inspect(&mmu, |m| m.is_mapped(start + PAGE_SIZE)));

        // the rolled back segment still matches the page tables
        configure(&mmu, |m| m.fail_map_after(usize::MAX));

        assert_eq!(init.sbrk(PAGE_SIZE as isize), Ok(start + PAGE_SIZE));
        assert_eq!(heap_segment(&init).unwrap().len(), 2 * PAGE_SIZE);
        assert!(inspect(&mmu, |m| m.is_mapped(start + PAGE_SIZE)));
    }

    #[test]
    fn test_sbrk_after_termination() {
        let kernel = TestKernel::new().build();
        let (_env, init) = spawn_init(&kernel);
        let child = init.fork(init.threads()[0].trap_context()).unwrap();

        child.exit(0);
        crate::test_support::kill_all_threads(&child);
        kernel.run_deferred();

        assert_eq!(child.sbrk(PAGE_SIZE as isize), Err(ErrNo::NoSuchProcess));
    }
}
