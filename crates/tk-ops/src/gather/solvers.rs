use tk_runtime::{BuildParams, KernelArg, KernelInfo};
use tk_tensor::{TensorDescriptor, TensorView5};

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::reduce::LOCAL_SIZE_FWD;
use crate::solver::{
    plan_kernels, run_sequence, type_build_params, InvokerFactory, KernelPlan, Solution, Solver,
    SolverChain,
};

use super::problem::{
    BwdInvokeParams, BwdProblemDescription, FwdInvokeParams, FwdProblemDescription,
};

const KERNEL_FILE: &str = "GatherV2.cl";
const FILL_KERNEL_FILE: &str = "Fill.cl";

pub struct GatherV2Forward;

/// Zero the param gradient, then scatter-add over a single flat batch.
pub struct GatherV2Backward;

/// Same as [`GatherV2Backward`] with `batch_dims > 0`: each batch scatters
/// only into its own slice of the param gradient.
pub struct BatchedGatherV2Backward;

pub static FORWARD: SolverChain<FwdProblemDescription> =
    SolverChain::new("GatherV2Forward", &[&GatherV2Forward]);

pub static BACKWARD: SolverChain<BwdProblemDescription> = SolverChain::new(
    "GatherV2Backward",
    &[&GatherV2Backward, &BatchedGatherV2Backward],
);

fn indexed_build_params(data: &TensorDescriptor, indices: &TensorDescriptor) -> BuildParams {
    type_build_params(data.dtype()).define("INDEX_TYPE", indices.dtype().kernel_type_name())
}

fn zero_fill_info(desc: &TensorDescriptor) -> KernelInfo {
    KernelInfo::linear(
        FILL_KERNEL_FILE,
        "FillZero",
        type_build_params(desc.dtype()),
        desc.element_count(),
        LOCAL_SIZE_FWD,
    )
}

impl Solver<FwdProblemDescription> for GatherV2Forward {
    fn name(&self) -> &'static str {
        "GatherV2Forward"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, problem: &FwdProblemDescription) -> bool {
        problem.is_all_contiguous()
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &FwdProblemDescription,
    ) -> Result<Solution<FwdInvokeParams>> {
        let geom = problem.geometry();
        let plan = KernelPlan::new().with(KernelInfo::linear(
            KERNEL_FILE,
            "GatherV2Forward",
            indexed_build_params(problem.param(), problem.indices()),
            geom.output_count(),
            LOCAL_SIZE_FWD,
        ));
        Ok(Solution {
            plan,
            workspace_size: 0,
            invoker_factory: InvokerFactory::new(move |handle, kernels, p: &FwdInvokeParams| {
                let [kernel] = plan_kernels::<1>(kernels)?;
                handle.run(
                    kernel,
                    &[
                        p.param.into(),
                        p.indices.into(),
                        p.output.into(),
                        (geom.batch as i64).into(),
                        (geom.outer as i64).into(),
                        (geom.gather as i64).into(),
                        (geom.indices as i64).into(),
                        (geom.inner as i64).into(),
                    ],
                )?;
                Ok(())
            }),
        })
    }
}

fn backward_solution(
    problem: &BwdProblemDescription,
    kernel_name: &str,
) -> Result<Solution<BwdInvokeParams>> {
    let geom = problem.geometry();
    let batched = problem.batch_dims() > 0;
    let plan = KernelPlan::new()
        .with(zero_fill_info(problem.param_grad()))
        .with(KernelInfo::linear(
            KERNEL_FILE,
            kernel_name,
            indexed_build_params(problem.param_grad(), problem.indices()),
            geom.output_count(),
            LOCAL_SIZE_FWD,
        ));
    Ok(Solution {
        plan,
        workspace_size: 0,
        invoker_factory: InvokerFactory::new(move |handle, kernels, p: &BwdInvokeParams| {
            let [fill, scatter] = plan_kernels::<2>(kernels)?;
            let mut scatter_args: Vec<KernelArg> = vec![p.output_grad.into(), p.indices.into(), p.param_grad.into()];
            if batched {
                scatter_args.push((geom.batch as i64).into());
            }
            scatter_args.extend::<[KernelArg; 4]>([
                (geom.outer as i64).into(),
                (geom.gather as i64).into(),
                (geom.indices as i64).into(),
                (geom.inner as i64).into(),
            ]);
            run_sequence(
                handle,
                &[
                    (
                        fill,
                        vec![
                            p.param_grad.into(),
                            TensorView5::from_descriptor(&p.param_grad_desc)?.into(),
                        ],
                    ),
                    (scatter, scatter_args),
                ],
            )
        }),
    })
}

impl Solver<BwdProblemDescription> for GatherV2Backward {
    fn name(&self) -> &'static str {
        "GatherV2Backward"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, problem: &BwdProblemDescription) -> bool {
        problem.is_all_contiguous() && problem.batch_dims() == 0
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &BwdProblemDescription,
    ) -> Result<Solution<BwdInvokeParams>> {
        backward_solution(problem, "GatherV2Backward")
    }
}

impl Solver<BwdProblemDescription> for BatchedGatherV2Backward {
    fn name(&self) -> &'static str {
        "BatchedGatherV2Backward"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, problem: &BwdProblemDescription) -> bool {
        problem.is_all_contiguous() && problem.batch_dims() > 0
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &BwdProblemDescription,
    ) -> Result<Solution<BwdInvokeParams>> {
        backward_solution(problem, "BatchedGatherV2Backward")
    }
}
