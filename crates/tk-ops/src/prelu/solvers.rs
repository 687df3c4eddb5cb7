use tk_runtime::{DevicePtr, KernelArg, KernelInfo};
use tk_tensor::TensorView5;

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::reduce::{push_reduce_kernels, run_reduction, WorkspaceLayout, LOCAL_SIZE_FWD, LOCAL_SIZE_REDUCE};
use crate::solver::{
    plan_kernels, run_sequence, type_build_params, InvokerFactory, KernelPlan, Solution, Solver,
    SolverChain,
};

use super::problem::{BwdInvokeParams, BwdProblemDescription, FwdInvokeParams, FwdProblemDescription};

const KERNEL_FILE: &str = "PReLU.cl";

/// One work item per element, any layout.
pub struct PReluForward;

/// One shared slope: input gradient plus per-element weight-gradient terms
/// in the workspace, then a multi-pass reduction into the single slot.
pub struct PReluSingleWeightBackward;

/// One slope per channel: input gradient, then one work item per channel
/// for the weight gradient. No workspace.
pub struct PReluMultiWeightsBackward;

pub static FORWARD: SolverChain<FwdProblemDescription> = SolverChain::new("PReLUForward", &[&PReluForward]);

pub static BACKWARD: SolverChain<BwdProblemDescription> = SolverChain::new(
    "PReLUBackward",
    &[&PReluSingleWeightBackward, &PReluMultiWeightsBackward],
);

impl Solver<FwdProblemDescription> for PReluForward {
    fn name(&self) -> &'static str {
        "PReLUForward"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, _problem: &FwdProblemDescription) -> bool {
        true
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &FwdProblemDescription,
    ) -> Result<Solution<FwdInvokeParams>> {
        let plan = KernelPlan::new().with(KernelInfo::linear(
            KERNEL_FILE,
            "PReLUForward",
            type_build_params(problem.input().dtype()),
            problem.input().element_count(),
            LOCAL_SIZE_FWD,
        ));
        let shared = problem.is_single_weight();
        Ok(Solution {
            plan,
            workspace_size: 0,
            invoker_factory: InvokerFactory::new(move |handle, kernels, p: &FwdInvokeParams| {
                let [kernel] = plan_kernels::<1>(kernels)?;
                handle.run(
                    kernel,
                    &[
                        p.input.into(),
                        p.weight.into(),
                        p.output.into(),
                        TensorView5::from_descriptor(&p.input_desc)?.into(),
                        TensorView5::from_descriptor(&p.weight_desc)?.into(),
                        TensorView5::from_descriptor(&p.output_desc)?.into(),
                        shared.into(),
                    ],
                )?;
                Ok(())
            }),
        })
    }
}

fn backward_kernel(problem: &BwdProblemDescription) -> KernelInfo {
    KernelInfo::linear(
        KERNEL_FILE,
        "PReLUBackward",
        type_build_params(problem.input().dtype()),
        problem.input().element_count(),
        LOCAL_SIZE_FWD,
    )
}

fn backward_args(p: &BwdInvokeParams, partials: DevicePtr, shared: bool) -> Result<Vec<KernelArg>> {
    Ok(vec![
        p.input.into(),
        p.weight.into(),
        p.output_grad.into(),
        p.input_grad.into(),
        partials.into(),
        TensorView5::from_descriptor(&p.input_desc)?.into(),
        TensorView5::from_descriptor(&p.weight_desc)?.into(),
        TensorView5::from_descriptor(&p.output_grad_desc)?.into(),
        TensorView5::from_descriptor(&p.input_grad_desc)?.into(),
        shared.into(),
    ])
}

fn layout(ctx: &ExecutionContext<'_>, problem: &BwdProblemDescription) -> WorkspaceLayout {
    WorkspaceLayout::new(
        problem.input().element_count(),
        LOCAL_SIZE_REDUCE,
        problem.input().dtype().size_in_bytes(),
        ctx.region_alignment(),
    )
}

impl Solver<BwdProblemDescription> for PReluSingleWeightBackward {
    fn name(&self) -> &'static str {
        "PReLUSingleWeightBackward"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, problem: &BwdProblemDescription) -> bool {
        problem.is_single_weight()
    }

    fn workspace_size(&self, ctx: &ExecutionContext<'_>, problem: &BwdProblemDescription) -> usize {
        layout(ctx, problem).total_bytes()
    }

    fn solution(
        &self,
        ctx: &ExecutionContext<'_>,
        problem: &BwdProblemDescription,
    ) -> Result<Solution<BwdInvokeParams>> {
        let layout = layout(ctx, problem);
        let mut plan = KernelPlan::new().with(backward_kernel(problem));
        push_reduce_kernels(&mut plan, &layout, problem.input().dtype());
        let workspace_size = layout.total_bytes();
        Ok(Solution {
            plan,
            workspace_size,
            invoker_factory: InvokerFactory::new(move |handle, kernels, p: &BwdInvokeParams| {
                let (grad, passes) = kernels
                    .split_first()
                    .ok_or_else(|| Error::Internal("prelu backward plan has no kernels".into()))?;
                let want_weight_grad = !p.weight_grad.is_null();
                let partials = if want_weight_grad { p.workspace } else { DevicePtr::NULL };

                let mut scope = handle.profiling_scope();
                scope.run(grad, &backward_args(p, partials, true)?)?;
                if want_weight_grad {
                    run_reduction(&mut scope, passes, &layout, p.workspace, p.weight_grad)?;
                }
                scope.finish();
                Ok(())
            }),
        })
    }
}

impl Solver<BwdProblemDescription> for PReluMultiWeightsBackward {
    fn name(&self) -> &'static str {
        "PReLUMultiWeightsBackward"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, problem: &BwdProblemDescription) -> bool {
        !problem.is_single_weight()
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &BwdProblemDescription,
    ) -> Result<Solution<BwdInvokeParams>> {
        let plan = KernelPlan::new()
            .with(backward_kernel(problem))
            .with(KernelInfo::linear(
                KERNEL_FILE,
                "PReLUWeightGrad",
                type_build_params(problem.input().dtype()),
                problem.weight().element_count(),
                LOCAL_SIZE_FWD,
            ));
        Ok(Solution {
            plan,
            workspace_size: 0,
            invoker_factory: InvokerFactory::new(move |handle, kernels, p: &BwdInvokeParams| {
                let [grad, weight_grad] = plan_kernels::<2>(kernels)?;
                let mut launches = vec![(grad, backward_args(p, DevicePtr::NULL, false)?)];
                if !p.weight_grad.is_null() {
                    launches.push((
                        weight_grad,
                        vec![
                            p.input.into(),
                            p.output_grad.into(),
                            p.weight_grad.into(),
                            TensorView5::from_descriptor(&p.input_desc)?.into(),
                            TensorView5::from_descriptor(&p.output_grad_desc)?.into(),
                            TensorView5::from_descriptor(&p.weight_grad_desc)?.into(),
                        ],
                    ));
                }
                run_sequence(handle, &launches)
            }),
        })
    }
}
