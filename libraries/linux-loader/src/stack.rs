use address::{VirtualAddress, VirtualAddressRange};
use alloc::vec::Vec;
use memory_space::{Segment, SegmentKind, SegmentList, SegmentMapError};
use mmu_abstractions::{GenericMappingFlags, IMMU};

use crate::{elf::segment_error, LoadError, ProcessContext};

const WORD: usize = core::mem::size_of::<usize>();

/// The range reserved for the main thread's stack.
pub fn stack_region() -> VirtualAddressRange {
    VirtualAddressRange::from_start_end(
        VirtualAddress::from_usize(constants::USER_STACK_TOP - constants::USER_STACK_SIZE),
        VirtualAddress::from_usize(constants::USER_STACK_TOP),
    )
}

/// Upper bound of the bytes [`init_stack`] writes for `ctx`, `None` on overflow.
pub fn stack_footprint(ctx: &ProcessContext<'_>) -> Option<usize> {
    let strings = ctx
        .argv
        .iter()
        .chain(ctx.envp.iter())
        .try_fold(0usize, |acc, s| acc.checked_add(s.len() + 1))?;

    // argc, both NULL terminators and one padding word
    let words = ctx.argv.len().checked_add(ctx.envp.len())?.checked_add(4)?;

    strings
        .checked_add(words.checked_mul(WORD)?)?
        .checked_add(15)
}

/// Fails early when `ctx` can not fit in the stack region.
pub fn check_stack_fits(ctx: &ProcessContext<'_>) -> Result<(), LoadError> {
    match stack_footprint(ctx) {
        Some(size) if size <= constants::USER_STACK_SIZE => Ok(()),
        _ => Err(LoadError::StackOverflow),
    }
}

/// Maps the stack region as a data segment and writes `ctx` onto it.
pub fn setup_stack(
    mmu: &mut dyn IMMU,
    segments: &mut SegmentList,
    ctx: &ProcessContext<'_>,
) -> Result<StackLayout, LoadError> {
    let stack = stack_region();
    let segment = Segment::new(stack, SegmentKind::Data, GenericMappingFlags::user_data())
        .map_err(|e| segment_error(SegmentMapError::Segment(e)))?;

    segments
        .map_and_insert(mmu, segment)
        .map_err(segment_error)?;

    init_stack(mmu, stack, ctx)
}

/// Where the initial stack contents ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackLayout {
    /// Points at `argc`; always 16-byte aligned.
    pub stack_top: VirtualAddress,
    pub argc: usize,
    pub argv_base: VirtualAddress,
    pub envp_base: VirtualAddress,
}

/// Writes the strings and pointer arrays of `ctx` at the top of `stack`.
///
/// From the final stack pointer upwards: `argc`, `argv[]`, NULL, `envp[]`,
/// NULL, optional padding, then the NUL-terminated strings.
pub fn init_stack(
    mmu: &mut dyn IMMU,
    stack: VirtualAddressRange,
    ctx: &ProcessContext<'_>,
) -> Result<StackLayout, LoadError> {
    let mut writer = StackWriter {
        mmu,
        bottom: stack.start(),
        cursor: stack.end(),
    };

    let envps = writer.push_strings(ctx.envp.iter().map(|s| s.as_bytes()))?;
    let argvs = writer.push_strings(ctx.argv.iter().map(|s| s.as_bytes()))?;

    writer.align_down(16)?;

    let words = (envps.len() + 1) + (argvs.len() + 1) + 1;
    if words % 2 != 0 {
        writer.push_word(0)?;
    }

    writer.push_word(0)?;
    for ptr in envps.iter().rev() {
        writer.push_word(ptr.as_usize())?;
    }
    let envp_base = writer.cursor;

    writer.push_word(0)?;
    for ptr in argvs.iter().rev() {
        writer.push_word(ptr.as_usize())?;
    }
    let argv_base = writer.cursor;

    writer.push_word(argvs.len())?;

    debug_assert!(writer.cursor.is_aligned(16));

    Ok(StackLayout {
        stack_top: writer.cursor,
        argc: argvs.len(),
        argv_base,
        envp_base,
    })
}

struct StackWriter<'a> {
    mmu: &'a mut dyn IMMU,
    bottom: VirtualAddress,
    cursor: VirtualAddress,
}

impl StackWriter<'_> {
    fn reserve(&mut self, len: usize) -> Result<VirtualAddress, LoadError> {
        let next = self
            .cursor
            .checked_sub(len)
            .filter(|next| *next >= self.bottom)
            .ok_or(LoadError::StackOverflow)?;

        self.cursor = next;

        Ok(next)
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<VirtualAddress, LoadError> {
        let at = self.reserve(bytes.len())?;

        self.mmu
            .write_bytes(at, bytes)
            .map_err(|_| LoadError::FailedToLoad)?;

        Ok(at)
    }

    fn push_word(&mut self, word: usize) -> Result<(), LoadError> {
        debug_assert!(self.cursor.is_aligned(WORD));

        self.push_bytes(&word.to_ne_bytes()).map(|_| ())
    }

    fn align_down(&mut self, align: usize) -> Result<(), LoadError> {
        let aligned = self.cursor.align_down(align);

        if aligned < self.bottom {
            return Err(LoadError::StackOverflow);
        }

        self.cursor = aligned;

        Ok(())
    }

    /// Pushes each string with a trailing NUL, returning their addresses in order.
    fn push_strings<'s>(
        &mut self,
        strings: impl ExactSizeIterator<Item = &'s [u8]>,
    ) -> Result<Vec<VirtualAddress>, LoadError> {
        let mut pointers = Vec::new();
        pointers
            .try_reserve_exact(strings.len())
            .map_err(|_| LoadError::InsufficientMemory)?;

        for string in strings {
            self.push_bytes(&[0])?;
            pointers.push(self.push_bytes(string)?);
        }

        Ok(pointers)
    }
}

#[cfg(test)]
mod tests {
    use alloc::{borrow::Cow, string::String};

    use mmu_abstractions::GenericMappingFlags;
    use test_utilities::memory::TestMMU;

    use super::*;
    use crate::ProcessContextLimit;

    fn stack_mmu(stack: VirtualAddressRange) -> TestMMU {
        let mut mmu = TestMMU::new();
        mmu.map_range(stack.start(), stack.len(), GenericMappingFlags::user_data())
            .unwrap();
        mmu
    }

    fn read_word(mmu: &TestMMU, at: VirtualAddress) -> usize {
        let bytes = mmu.read_vec(at, WORD).unwrap();
        usize::from_ne_bytes(bytes.try_into().unwrap())
    }

    fn read_str(mmu: &TestMMU, at: VirtualAddress) -> String {
        let mut bytes = Vec::new();
        let mut cursor = at;

        loop {
            let byte = mmu.read_vec(cursor, 1).unwrap()[0];
            if byte == 0 {
                break;
            }
            bytes.push(byte);
            cursor += 1;
        }

        String::from_utf8(bytes).unwrap()
    }

    fn read_array(mmu: &TestMMU, base: VirtualAddress) -> Vec<String> {
        let mut strings = Vec::new();
        let mut cursor = base;

        loop {
            let ptr = read_word(mmu, cursor);
            if ptr == 0 {
                break;
            }
            strings.push(read_str(mmu, VirtualAddress::from_usize(ptr)));
            cursor += WORD;
        }

        strings
    }

    #[test]
    fn test_stack_layout() {
        let stack = stack_region();
        let mut mmu = stack_mmu(stack);

        let mut ctx = ProcessContext::new();
        ctx.extend_argv(&[
            Cow::Borrowed("./test_program"),
            Cow::Borrowed("arg1"),
            Cow::Borrowed("hello world"),
        ])
        .unwrap();
        ctx.extend_envp(&[Cow::Borrowed("PATH=/bin"), Cow::Borrowed("HOME=/root")])
            .unwrap();

        let layout = init_stack(&mut mmu, stack, &ctx).unwrap();

        assert!(layout.stack_top.is_aligned(16));
        assert!(stack.contains(layout.stack_top));
        assert_eq!(layout.argc, 3);
        assert_eq!(read_word(&mmu, layout.stack_top), 3);
        assert_eq!(layout.argv_base, layout.stack_top + WORD);
        assert_eq!(layout.envp_base, layout.argv_base + 4 * WORD);

        assert_eq!(
            read_array(&mmu, layout.argv_base),
            ["./test_program", "arg1", "hello world"]
        );
        assert_eq!(read_array(&mmu, layout.envp_base), ["PATH=/bin", "HOME=/root"]);
    }

    #[test]
    fn test_empty_context_is_aligned() {
        let stack = stack_region();
        let mut mmu = stack_mmu(stack);

        let layout = init_stack(&mut mmu, stack, &ProcessContext::new()).unwrap();

        assert!(layout.stack_top.is_aligned(16));
        assert_eq!(read_word(&mmu, layout.stack_top), 0);
        assert_eq!(read_word(&mmu, layout.argv_base), 0);
        assert_eq!(read_word(&mmu, layout.envp_base), 0);
    }

    #[test]
    fn test_alignment_for_every_argc() {
        let stack = stack_region();

        for argc in 0..6 {
            let mut mmu = stack_mmu(stack);
            let mut ctx = ProcessContext::new_limited(ProcessContextLimit::Unlimited);

            for i in 0..argc {
                ctx.argv.push(Cow::Owned("x".repeat(i + 1)));
            }

            let layout = init_stack(&mut mmu, stack, &ctx).unwrap();

            assert!(layout.stack_top.is_aligned(16), "argc = {argc}");
        }
    }

    #[test]
    fn test_setup_stack_maps_segment() {
        let mut mmu = TestMMU::new();
        let mut segments = SegmentList::new();

        let mut ctx = ProcessContext::new();
        ctx.extend_argv(&[Cow::Borrowed("init")]).unwrap();

        let layout = setup_stack(&mut mmu, &mut segments, &ctx).unwrap();

        let segment = segments.get(stack_region().start()).unwrap();
        assert_eq!(segment.range(), stack_region());
        assert_eq!(segment.kind(), SegmentKind::Data);
        assert_eq!(
            mmu.flags_of(layout.stack_top),
            Some(GenericMappingFlags::user_data())
        );
        assert_eq!(read_array(&mmu, layout.argv_base), ["init"]);

        // a second stack collides with the first
        assert_eq!(
            setup_stack(&mut mmu, &mut segments, &ctx),
            Err(LoadError::OverlappingSegments)
        );
    }

    #[test]
    fn test_footprint_covers_layout() {
        let stack = stack_region();
        let mut mmu = stack_mmu(stack);

        let mut ctx = ProcessContext::new();
        ctx.extend_argv(&[Cow::Borrowed("sh"), Cow::Borrowed("-c"), Cow::Borrowed("ls")])
            .unwrap();
        ctx.extend_envp(&[Cow::Borrowed("TERM=vt100")]).unwrap();

        let layout = init_stack(&mut mmu, stack, &ctx).unwrap();
        let used = stack.end() - layout.stack_top;

        assert!(used <= stack_footprint(&ctx).unwrap());
        assert!(check_stack_fits(&ctx).is_ok());
    }

    #[test]
    fn test_oversized_context_is_rejected_early() {
        let mut ctx = ProcessContext::new();
        ctx.extend_argv(&[Cow::Owned("a".repeat(constants::USER_STACK_SIZE))])
            .unwrap();

        assert_eq!(check_stack_fits(&ctx), Err(LoadError::StackOverflow));
    }

    #[test]
    fn test_stack_overflow() {
        let stack = VirtualAddressRange::from_start_len(
            VirtualAddress::from_usize(0x8000_0000),
            constants::PAGE_SIZE,
        );
        let mut mmu = stack_mmu(stack);

        let huge = "a".repeat(constants::PAGE_SIZE);
        let mut ctx = ProcessContext::new();
        ctx.extend_argv(&[Cow::Owned(huge)]).unwrap();

        assert_eq!(
            init_stack(&mut mmu, stack, &ctx),
            Err(LoadError::StackOverflow)
        );
    }
}
