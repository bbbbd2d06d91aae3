use alloc::sync::Arc;
use kernel_abstractions::IKernel;

use crate::{LinuxProcess, ProcessRegistry};

/// State shared by every process of one kernel instance. Created once at boot.
pub struct ProcessEnvironment {
    kernel: Arc<dyn IKernel>,
    registry: ProcessRegistry,
}

impl ProcessEnvironment {
    pub fn new(kernel: Arc<dyn IKernel>) -> Arc<Self> {
        Arc::new(Self {
            kernel,
            registry: ProcessRegistry::new(),
        })
    }

    pub fn kernel(&self) -> &Arc<dyn IKernel> {
        &self.kernel
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// The process orphans are reparented to, if it is still around.
    pub fn init(&self) -> Option<Arc<LinuxProcess>> {
        self.registry.get(constants::INIT_PID)
    }
}
