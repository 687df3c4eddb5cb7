use tk_runtime::KernelInfo;
use tk_tensor::TensorView5;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::reduce::LOCAL_SIZE_FWD;
use crate::solver::{
    plan_kernels, run_sequence, type_build_params, InvokerFactory, KernelPlan, Solution, Solver,
    SolverChain,
};

use super::problem::{DiagProblemDescription, Direction, InvokeParams};

const KERNEL_FILE: &str = "Diag.cl";
const FILL_KERNEL_FILE: &str = "Fill.cl";

/// Zero the output, then copy the input onto the output's diagonal view.
pub struct DiagEmbedForward;

/// Copy the diagonal view of the input into the output.
pub struct DiagExtractForward;

pub static FORWARD: SolverChain<DiagProblemDescription> =
    SolverChain::new("DiagForward", &[&DiagEmbedForward, &DiagExtractForward]);

fn copy_info(problem: &DiagProblemDescription, count: usize) -> KernelInfo {
    KernelInfo::linear(
        KERNEL_FILE,
        "StridedCopy",
        type_build_params(problem.input().dtype()),
        count,
        LOCAL_SIZE_FWD,
    )
}

impl Solver<DiagProblemDescription> for DiagEmbedForward {
    fn name(&self) -> &'static str {
        "DiagEmbedForward"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, problem: &DiagProblemDescription) -> bool {
        matches!(problem.direction(), Direction::Embed { .. })
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &DiagProblemDescription,
    ) -> Result<Solution<InvokeParams>> {
        let (dim1, dim2) = match problem.direction() {
            Direction::Embed { dim1, dim2 } => (dim1, dim2),
            Direction::Extract => (0, 1),
        };
        let offset = problem.offset();
        let plan = KernelPlan::new()
            .with(KernelInfo::linear(
                FILL_KERNEL_FILE,
                "FillZero",
                type_build_params(problem.output().dtype()),
                problem.output().element_count(),
                LOCAL_SIZE_FWD,
            ))
            .with(copy_info(problem, problem.input().element_count()));
        Ok(Solution {
            plan,
            workspace_size: 0,
            invoker_factory: InvokerFactory::new(move |handle, kernels, p: &InvokeParams| {
                let [fill, copy] = plan_kernels::<2>(kernels)?;
                let output_view = TensorView5::from_descriptor(&p.output_desc)?;
                let (diagonal, base) = TensorView5::diagonal_of(&p.output_desc, dim1, dim2, offset)?;
                run_sequence(
                    handle,
                    &[
                        (fill, vec![p.output.into(), output_view.into()]),
                        (
                            copy,
                            vec![
                                p.input.into(),
                                p.output.into(),
                                TensorView5::from_descriptor(&p.input_desc)?.into(),
                                diagonal.into(),
                                0i64.into(),
                                base.into(),
                            ],
                        ),
                    ],
                )
            }),
        })
    }
}

impl Solver<DiagProblemDescription> for DiagExtractForward {
    fn name(&self) -> &'static str {
        "DiagExtractForward"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, problem: &DiagProblemDescription) -> bool {
        problem.direction() == Direction::Extract
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &DiagProblemDescription,
    ) -> Result<Solution<InvokeParams>> {
        let offset = problem.offset();
        let plan = KernelPlan::new().with(copy_info(problem, problem.output().element_count()));
        Ok(Solution {
            plan,
            workspace_size: 0,
            invoker_factory: InvokerFactory::new(move |handle, kernels, p: &InvokeParams| {
                let [copy] = plan_kernels::<1>(kernels)?;
                let (diagonal, base) = TensorView5::diagonal_of(&p.input_desc, 0, 1, offset)?;
                handle.run(
                    copy,
                    &[
                        p.input.into(),
                        p.output.into(),
                        diagonal.into(),
                        TensorView5::from_descriptor(&p.output_desc)?.into(),
                        base.into(),
                        0i64.into(),
                    ],
                )?;
                Ok(())
            }),
        })
    }
}
