//! `tk-ops` - Operator families built on a shared dispatch substrate.
//!
//! Every operator call goes through the same pipeline:
//! 1. a `ProblemDescription` validates descriptors and parameters,
//! 2. a `SolverChain` picks the first applicable `Solver`,
//! 3. the solver's kernel plan is compiled and wrapped in an `Invoker`,
//!    which is cached on the handle under the problem's key,
//! 4. the invoker launches the kernels against the caller's buffers.

pub mod context;
pub mod diag;
pub mod embedding;
pub mod embedding_bag;
pub mod error;
pub mod gather;
pub mod glu;
pub mod kernels;
pub mod l1loss;
pub mod prelu;
pub mod problem;
pub mod reduce;
pub mod select;
pub mod solver;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use tk_runtime::{ExecutionConfig, Handle};

pub use context::ExecutionContext;
pub use diag::{diag_embed_forward, diag_forward, diagflat_forward};
pub use embedding::{embedding_backward, embedding_forward};
pub use embedding_bag::{embedding_bag_forward, EmbeddingBagMode};
pub use error::{Error, Result, Status};
pub use gather::{gatherv2_backward, gatherv2_forward, GatherParams};
pub use glu::{glu_backward, glu_forward};
pub use kernels::HostKernels;
pub use l1loss::{
    l1loss_backward, l1loss_forward, l1loss_forward_workspace_size, smooth_l1loss_backward,
    smooth_l1loss_forward, smooth_l1loss_forward_workspace_size, L1LossParams, Reduction,
};
pub use prelu::{prelu_backward, prelu_backward_workspace_size, prelu_forward};
pub use select::{where_backward, where_forward};
pub use problem::{CacheKey, ProblemDescription, TensorRef};
pub use solver::{
    type_build_params, Invoker, InvokerFactory, KernelPlan, Solution, Solver, SolverChain,
};

/// Returned by workspace-size queries whose problem is invalid or has no
/// applicable solver.
pub const WORKSPACE_UNAVAILABLE: usize = usize::MAX;

/// A handle backed by the host kernels, configured from the environment.
pub fn create_handle() -> Handle {
    create_handle_with_config(ExecutionConfig::from_env())
}

pub fn create_handle_with_config(config: ExecutionConfig) -> Handle {
    Handle::with_config(Arc::new(HostKernels), config)
}
