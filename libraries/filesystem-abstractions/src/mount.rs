use alloc::{string::String, vec::Vec};
use hermit_sync::SpinMutex;

/// A directory a process can resolve paths against (root or cwd).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryHandle {
    path: String,
}

impl DirectoryHandle {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub target: String,
    pub source: String,
}

/// Mounts visible to a group of processes. Shared by reference across fork.
#[derive(Default)]
pub struct MountTable {
    mounts: SpinMutex<Vec<MountPoint>>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&self, source: impl Into<String>, target: impl Into<String>) {
        self.mounts.lock().push(MountPoint {
            target: target.into(),
            source: source.into(),
        });
    }

    pub fn mounts(&self) -> Vec<MountPoint> {
        self.mounts.lock().clone()
    }
}
