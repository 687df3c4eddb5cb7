//! Solvers, kernel plans and invokers.
//!
//! A [`Solver`] turns a validated problem into a [`Solution`]: the kernels
//! to build plus a factory for the closure that launches them. A
//! [`SolverChain`] tries its solvers in a fixed priority order, and caches
//! the resulting [`Invoker`] on the handle so repeated calls with the same
//! problem skip planning and compilation.

use std::sync::Arc;

use log::{debug, warn};
use tk_runtime::{BuildParams, Handle, Kernel, KernelArg, KernelInfo};
use tk_tensor::DType;

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::problem::ProblemDescription;

/// Ordered kernel launches making up one solution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelPlan {
    pub kernels: Vec<KernelInfo>,
}

impl KernelPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a launch. Returns self for builder-style usage.
    pub fn with(mut self, info: KernelInfo) -> Self {
        self.kernels.push(info);
        self
    }

    pub fn push(&mut self, info: KernelInfo) {
        self.kernels.push(info);
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}

type InvokeFn<T> = dyn Fn(&mut Handle, &[Kernel], &T) -> Result<()> + Send + Sync;

/// Produces invokers once the plan's kernels are built.
pub struct InvokerFactory<T> {
    func: Arc<InvokeFn<T>>,
}

impl<T> InvokerFactory<T> {
    /// The closure receives the realized kernels in plan order. It must only
    /// capture owned data, since the invoker outlives the call that built it.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut Handle, &[Kernel], &T) -> Result<()> + Send + Sync + 'static,
    {
        InvokerFactory {
            func: Arc::new(func),
        }
    }

    pub fn build(&self, kernels: Vec<Kernel>) -> Invoker<T> {
        Invoker {
            kernels,
            func: Arc::clone(&self.func),
        }
    }
}

/// Compiled kernels bound to the closure that issues them.
pub struct Invoker<T> {
    kernels: Vec<Kernel>,
    func: Arc<InvokeFn<T>>,
}

impl<T> Invoker<T> {
    pub fn invoke(&self, handle: &mut Handle, params: &T) -> Result<()> {
        (self.func)(handle, &self.kernels, params)
    }

    pub fn kernels(&self) -> &[Kernel] {
        &self.kernels
    }
}

pub struct Solution<T> {
    pub plan: KernelPlan,
    pub workspace_size: usize,
    pub invoker_factory: InvokerFactory<T>,
}

/// One way of executing problems of type `P`.
pub trait Solver<P: ProblemDescription>: Sync {
    fn name(&self) -> &'static str;

    fn is_applicable(&self, ctx: &ExecutionContext<'_>, problem: &P) -> bool;

    /// Workspace bytes the caller must supply.
    fn workspace_size(&self, _ctx: &ExecutionContext<'_>, _problem: &P) -> usize {
        0
    }

    fn solution(&self, ctx: &ExecutionContext<'_>, problem: &P)
        -> Result<Solution<P::InvokeParams>>;
}

/// Fixed-priority list of solvers for one algorithm.
pub struct SolverChain<P: 'static> {
    algorithm: &'static str,
    solvers: &'static [&'static dyn Solver<P>],
}

impl<P: ProblemDescription> SolverChain<P> {
    pub const fn new(algorithm: &'static str, solvers: &'static [&'static dyn Solver<P>]) -> Self {
        SolverChain { algorithm, solvers }
    }

    pub fn algorithm(&self) -> &'static str {
        self.algorithm
    }

    /// First applicable solver, in priority order.
    pub fn find(&self, ctx: &ExecutionContext<'_>, problem: &P) -> Option<&'static dyn Solver<P>> {
        self.solvers
            .iter()
            .copied()
            .find(|s| s.is_applicable(ctx, problem))
    }

    /// Workspace size of the solver `execute` would pick.
    pub fn workspace_size(&self, handle: &Handle, problem: &P) -> Result<usize> {
        let ctx = ExecutionContext::new(handle);
        let solver = self.find(&ctx, problem).ok_or_else(|| self.no_solver(problem))?;
        Ok(solver.workspace_size(&ctx, problem))
    }

    /// Workspace sizes of every applicable solver, in priority order.
    pub fn workspace_sizes(&self, handle: &Handle, problem: &P) -> Vec<(&'static str, usize)> {
        let ctx = ExecutionContext::new(handle);
        self.solvers
            .iter()
            .filter(|s| s.is_applicable(&ctx, problem))
            .map(|s| (s.name(), s.workspace_size(&ctx, problem)))
            .collect()
    }

    /// Run `problem` with the cached invoker for its key, building and
    /// caching one from the first applicable solver on a miss.
    pub fn execute(&self, handle: &mut Handle, problem: &P, params: &P::InvokeParams) -> Result<()> {
        let key = format!("{}::{}", self.algorithm, problem.cache_key());
        if let Some(invoker) = handle.cached_invoker::<Invoker<P::InvokeParams>>(&key) {
            debug!("invoker cache hit: {key}");
            return invoker.invoke(handle, params);
        }
        debug!("invoker cache miss: {key}");

        let solution = {
            let ctx = ExecutionContext::new(handle);
            let solver = self.find(&ctx, problem).ok_or_else(|| self.no_solver(problem))?;
            debug!("{}: selected solver {}", self.algorithm, solver.name());
            solver.solution(&ctx, problem)?
        };

        let kernels = solution
            .plan
            .kernels
            .iter()
            .map(|info| handle.compile(info))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let invoker = Arc::new(solution.invoker_factory.build(kernels));
        handle.cache_invoker(key, Arc::clone(&invoker));
        invoker.invoke(handle, params)
    }

    fn no_solver(&self, problem: &P) -> Error {
        warn!(
            "{}: no applicable solver for {}",
            self.algorithm,
            problem.cache_key()
        );
        Error::NotImplemented(format!(
            "{}: no solver applies to {}",
            self.algorithm,
            problem.cache_key()
        ))
    }
}

/// Build defines selecting the element type of a kernel.
pub fn type_build_params(dtype: DType) -> BuildParams {
    BuildParams::new()
        .define("IO_TYPE", dtype.kernel_type_name())
        .define("USE_FP16", u8::from(dtype == DType::F16))
        .define("USE_BFP16", u8::from(dtype == DType::BF16))
        .define("USE_FP32", u8::from(dtype == DType::F32))
        .define("USE_FP64", u8::from(dtype == DType::F64))
}

/// Run a fixed sequence of launches as one profiled span.
pub(crate) fn run_sequence(handle: &mut Handle, launches: &[(&Kernel, Vec<KernelArg>)]) -> Result<()> {
    let mut scope = handle.profiling_scope();
    for (kernel, args) in launches {
        scope.run(kernel, args)?;
    }
    scope.finish();
    Ok(())
}

/// Destructure the realized kernels of a plan with a known length.
pub(crate) fn plan_kernels<const K: usize>(kernels: &[Kernel]) -> Result<&[Kernel; K]> {
    kernels.try_into().map_err(|_| {
        Error::Internal(format!(
            "solution expected {K} kernels, invoker holds {}",
            kernels.len()
        ))
    })
}
