use crate::{SyscallContext, SyscallResult};

impl SyscallContext {
    /// Returns the previous program break.
    pub fn sys_sbrk(&self, increment: isize) -> SyscallResult {
        let old = self.process.sbrk(increment)?;

        Ok(old.as_usize() as isize)
    }
}

#[cfg(test)]
mod tests {
    use address::VirtualAddress;
    use constants::{ErrNo, PAGE_SIZE};
    use test_utilities::memory::inspect;

    use crate::test_env::setup_env;

    #[test]
    fn test_break_moves() {
        let (_kernel, ctx) = setup_env();
        let start = ctx.sys_sbrk(0).unwrap();

        assert_eq!(ctx.sys_sbrk(PAGE_SIZE as isize + 8), Ok(start));
        assert_eq!(ctx.sys_sbrk(-8), Ok(start + PAGE_SIZE as isize + 8));
        assert_eq!(ctx.sys_sbrk(0), Ok(start + PAGE_SIZE as isize));

        let mmu = ctx.process.mmu().unwrap();
        let heap = VirtualAddress::from_usize(start as usize);
        inspect(&mmu, |m| {
            assert!(m.is_mapped(heap));
            assert!(!m.is_mapped(heap + PAGE_SIZE));
        });
    }

    #[test]
    fn test_break_below_start() {
        let (_kernel, ctx) = setup_env();

        assert_eq!(ctx.sys_sbrk(-(PAGE_SIZE as isize)), Err(ErrNo::CannotAllocateMemory));
    }
}
