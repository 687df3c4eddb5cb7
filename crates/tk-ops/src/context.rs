use tk_runtime::{ExecutionConfig, Handle};

/// Read-only view of the handle that solvers consult when deciding
/// applicability and sizing workspaces.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    handle: &'a Handle,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(handle: &'a Handle) -> Self {
        ExecutionContext { handle }
    }

    pub fn config(&self) -> &'a ExecutionConfig {
        self.handle.config()
    }

    pub fn max_local_size(&self) -> usize {
        self.handle.config().max_local_size
    }

    pub fn region_alignment(&self) -> usize {
        self.handle.config().region_alignment
    }
}
