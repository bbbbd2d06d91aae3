use alloc::{borrow::Cow, vec::Vec};

use crate::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessContextLimit {
    pub argv: usize,
    pub envp: usize,
}

impl ProcessContextLimit {
    #[allow(non_upper_case_globals)]
    pub const Unlimited: ProcessContextLimit = ProcessContextLimit {
        argv: usize::MAX,
        envp: usize::MAX,
    };
}

impl Default for ProcessContextLimit {
    fn default() -> Self {
        ProcessContextLimit {
            argv: constants::MAX_ARGV_COUNT,
            envp: constants::MAX_ENVP_COUNT,
        }
    }
}

/// Argument and environment strings handed to a new program image.
#[derive(Debug, Clone, Default)]
pub struct ProcessContext<'a> {
    pub argv: Vec<Cow<'a, str>>,
    pub envp: Vec<Cow<'a, str>>,
    pub limit: ProcessContextLimit,
}

impl ProcessContext<'_> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_limited(limit: ProcessContextLimit) -> Self {
        Self {
            argv: Vec::new(),
            envp: Vec::new(),
            limit,
        }
    }
}

impl<'a> ProcessContext<'a> {
    /// Appends `argv`, leaving the context untouched if the limit would be exceeded.
    pub fn extend_argv(&mut self, argv: &[Cow<'a, str>]) -> Result<(), LoadError> {
        if argv.len() + self.argv.len() > self.limit.argv {
            return Err(LoadError::ArgumentCountExceeded);
        }

        self.argv
            .try_reserve(argv.len())
            .map_err(|_| LoadError::InsufficientMemory)?;
        self.argv.extend_from_slice(argv);

        Ok(())
    }

    pub fn extend_envp(&mut self, envp: &[Cow<'a, str>]) -> Result<(), LoadError> {
        if envp.len() + self.envp.len() > self.limit.envp {
            return Err(LoadError::EnvironmentCountExceeded);
        }

        self.envp
            .try_reserve(envp.len())
            .map_err(|_| LoadError::InsufficientMemory)?;
        self.envp.extend_from_slice(envp);

        Ok(())
    }
}
