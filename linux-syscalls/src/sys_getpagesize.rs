use crate::{SyscallContext, SyscallResult};

impl SyscallContext {
    pub fn sys_getpagesize(&self) -> SyscallResult {
        Ok(constants::PAGE_SIZE as isize)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_env::setup_env;

    #[test]
    fn test_page_size() {
        let (_kernel, ctx) = setup_env();

        assert_eq!(ctx.sys_getpagesize(), Ok(4096));
    }
}
