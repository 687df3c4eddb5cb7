use tk_runtime::KernelInfo;
use tk_tensor::TensorView5;

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::reduce::{push_reduce_kernels, run_reduction, WorkspaceLayout, LOCAL_SIZE_FWD, LOCAL_SIZE_REDUCE};
use crate::solver::{
    plan_kernels, type_build_params, InvokerFactory, KernelPlan, Solution, Solver, SolverChain,
};

use super::problem::{BwdInvokeParams, BwdProblemDescription, FwdInvokeParams, FwdProblemDescription};

const KERNEL_FILE: &str = "L1Loss.cl";

/// Sum or mean: per-element losses into the workspace, then a multi-pass
/// reduction into the one-element output.
pub struct ReducedForward5d;

/// No reduction: one elementwise launch, no workspace.
pub struct UnreducedForward5d;

pub struct ReducedBackward5d;
pub struct UnreducedBackward5d;

pub static FORWARD: SolverChain<FwdProblemDescription> =
    SolverChain::new("L1LossForward", &[&ReducedForward5d, &UnreducedForward5d]);

pub static BACKWARD: SolverChain<BwdProblemDescription> =
    SolverChain::new("L1LossBackward", &[&ReducedBackward5d, &UnreducedBackward5d]);

fn layout(ctx: &ExecutionContext<'_>, problem: &FwdProblemDescription) -> WorkspaceLayout {
    WorkspaceLayout::new(
        problem.input().element_count(),
        LOCAL_SIZE_REDUCE,
        problem.input().dtype().size_in_bytes(),
        ctx.region_alignment(),
    )
}

impl Solver<FwdProblemDescription> for ReducedForward5d {
    fn name(&self) -> &'static str {
        "L1LossReducedForward5d"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, problem: &FwdProblemDescription) -> bool {
        problem.is_reduced()
    }

    fn workspace_size(&self, ctx: &ExecutionContext<'_>, problem: &FwdProblemDescription) -> usize {
        layout(ctx, problem).total_bytes()
    }

    fn solution(
        &self,
        ctx: &ExecutionContext<'_>,
        problem: &FwdProblemDescription,
    ) -> Result<Solution<FwdInvokeParams>> {
        let dtype = problem.input().dtype();
        let n = problem.input().element_count();
        let layout = layout(ctx, problem);

        let mut plan = KernelPlan::new().with(KernelInfo::linear(
            KERNEL_FILE,
            "L1LossReducedForward5d",
            type_build_params(dtype),
            n,
            LOCAL_SIZE_FWD,
        ));
        push_reduce_kernels(&mut plan, &layout, dtype);

        let divisor = problem.divisor();
        let beta = problem.params().beta as f64;
        let workspace_size = layout.total_bytes();
        Ok(Solution {
            plan,
            workspace_size,
            invoker_factory: InvokerFactory::new(move |handle, kernels, p: &FwdInvokeParams| {
                let (phase1, passes) = kernels
                    .split_first()
                    .ok_or_else(|| Error::Internal("reduced loss plan has no kernels".into()))?;
                let iv = TensorView5::from_descriptor(&p.input_desc)?;
                let tv = TensorView5::from_descriptor(&p.target_desc)?;

                let mut scope = handle.profiling_scope();
                scope.run(
                    phase1,
                    &[
                        p.input.into(),
                        p.target.into(),
                        p.workspace.into(),
                        divisor.into(),
                        beta.into(),
                        iv.into(),
                        tv.into(),
                    ],
                )?;
                run_reduction(&mut scope, passes, &layout, p.workspace, p.output)?;
                scope.finish();
                Ok(())
            }),
        })
    }
}

impl Solver<FwdProblemDescription> for UnreducedForward5d {
    fn name(&self) -> &'static str {
        "L1LossUnreducedForward5d"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, problem: &FwdProblemDescription) -> bool {
        !problem.is_reduced()
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &FwdProblemDescription,
    ) -> Result<Solution<FwdInvokeParams>> {
        let plan = KernelPlan::new().with(KernelInfo::linear(
            KERNEL_FILE,
            "L1LossUnreducedForward5d",
            type_build_params(problem.input().dtype()),
            problem.input().element_count(),
            LOCAL_SIZE_FWD,
        ));
        let beta = problem.params().beta as f64;
        Ok(Solution {
            plan,
            workspace_size: 0,
            invoker_factory: InvokerFactory::new(move |handle, kernels, p: &FwdInvokeParams| {
                let [kernel] = plan_kernels::<1>(kernels)?;
                let iv = TensorView5::from_descriptor(&p.input_desc)?;
                let tv = TensorView5::from_descriptor(&p.target_desc)?;
                let ov = TensorView5::from_descriptor(&p.output_desc)?;
                handle.run(
                    kernel,
                    &[
                        p.input.into(),
                        p.target.into(),
                        p.output.into(),
                        beta.into(),
                        iv.into(),
                        tv.into(),
                        ov.into(),
                    ],
                )?;
                Ok(())
            }),
        })
    }
}

impl Solver<BwdProblemDescription> for ReducedBackward5d {
    fn name(&self) -> &'static str {
        "L1LossReducedBackward5d"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, problem: &BwdProblemDescription) -> bool {
        problem.is_reduced()
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &BwdProblemDescription,
    ) -> Result<Solution<BwdInvokeParams>> {
        let plan = KernelPlan::new().with(KernelInfo::linear(
            KERNEL_FILE,
            "L1LossReducedBackward5d",
            type_build_params(problem.input().dtype()),
            problem.input().element_count(),
            LOCAL_SIZE_FWD,
        ));
        let divisor = problem.divisor();
        let beta = problem.params().beta as f64;
        Ok(Solution {
            plan,
            workspace_size: 0,
            invoker_factory: InvokerFactory::new(move |handle, kernels, p: &BwdInvokeParams| {
                let [kernel] = plan_kernels::<1>(kernels)?;
                handle.run(
                    kernel,
                    &[
                        p.input.into(),
                        p.target.into(),
                        p.output_grad.into(),
                        p.input_grad.into(),
                        p.target_grad.into(),
                        divisor.into(),
                        beta.into(),
                        TensorView5::from_descriptor(&p.input_desc)?.into(),
                        TensorView5::from_descriptor(&p.target_desc)?.into(),
                        TensorView5::from_descriptor(&p.input_grad_desc)?.into(),
                        TensorView5::from_descriptor(&p.target_grad_desc)?.into(),
                    ],
                )?;
                Ok(())
            }),
        })
    }
}

impl Solver<BwdProblemDescription> for UnreducedBackward5d {
    fn name(&self) -> &'static str {
        "L1LossUnreducedBackward5d"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, problem: &BwdProblemDescription) -> bool {
        !problem.is_reduced()
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &BwdProblemDescription,
    ) -> Result<Solution<BwdInvokeParams>> {
        let plan = KernelPlan::new().with(KernelInfo::linear(
            KERNEL_FILE,
            "L1LossUnreducedBackward5d",
            type_build_params(problem.input().dtype()),
            problem.input().element_count(),
            LOCAL_SIZE_FWD,
        ));
        let beta = problem.params().beta as f64;
        Ok(Solution {
            plan,
            workspace_size: 0,
            invoker_factory: InvokerFactory::new(move |handle, kernels, p: &BwdInvokeParams| {
                let [kernel] = plan_kernels::<1>(kernels)?;
                handle.run(
                    kernel,
                    &[
                        p.input.into(),
                        p.target.into(),
                        p.output_grad.into(),
                        p.input_grad.into(),
                        p.target_grad.into(),
                        beta.into(),
                        TensorView5::from_descriptor(&p.input_desc)?.into(),
                        TensorView5::from_descriptor(&p.target_desc)?.into(),
                        TensorView5::from_descriptor(&p.output_grad_desc)?.into(),
                        TensorView5::from_descriptor(&p.input_grad_desc)?.into(),
                        TensorView5::from_descriptor(&p.target_grad_desc)?.into(),
                    ],
                )?;
                Ok(())
            }),
        })
    }
}
