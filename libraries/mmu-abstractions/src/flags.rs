bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GenericMappingFlags: usize {
        const Readable = 1 << 0;
        const Writable = 1 << 1;
        const Executable = 1 << 2;
        const User = 1 << 3;
        const Kernel = 1 << 4;
    }
}

impl GenericMappingFlags {
    /// User-accessible protection built from the ELF-style read/write/execute triple.
    pub fn from_rwx(read: bool, write: bool, execute: bool) -> Self {
        let mut flags = GenericMappingFlags::User;

        flags.set(GenericMappingFlags::Readable, read);
        flags.set(GenericMappingFlags::Writable, write);
        flags.set(GenericMappingFlags::Executable, execute);

        flags
    }

    pub fn user_data() -> Self {
        Self::from_rwx(true, true, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rwx() {
        let text = GenericMappingFlags::from_rwx(true, false, true);

        assert!(text.contains(GenericMappingFlags::User));
        assert!(text.contains(GenericMappingFlags::Readable | GenericMappingFlags::Executable));
        assert!(!text.contains(GenericMappingFlags::Writable));

        assert_eq!(
            GenericMappingFlags::from_rwx(false, false, false),
            GenericMappingFlags::User
        );
    }
}
