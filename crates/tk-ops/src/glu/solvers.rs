use tk_runtime::KernelInfo;
use tk_tensor::TensorView5;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::reduce::LOCAL_SIZE_FWD;
use crate::solver::{plan_kernels, type_build_params, InvokerFactory, KernelPlan, Solution, Solver, SolverChain};

use super::problem::{BwdInvokeParams, BwdProblemDescription, FwdInvokeParams, FwdProblemDescription};

const KERNEL_FILE: &str = "GLU.cl";

/// One work item per output element, any layout.
pub struct GluForward;
pub struct GluBackward;

pub static FORWARD: SolverChain<FwdProblemDescription> = SolverChain::new("GLUForward", &[&GluForward]);
pub static BACKWARD: SolverChain<BwdProblemDescription> = SolverChain::new("GLUBackward", &[&GluBackward]);

impl Solver<FwdProblemDescription> for GluForward {
    fn name(&self) -> &'static str {
        "GLUForward"
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
            "GLUForward",
            type_build_params(problem.input().dtype()),
            problem.output().element_count(),
            LOCAL_SIZE_FWD,
        ));
        let dim = problem.dim();
        Ok(Solution {
            plan,
            workspace_size: 0,
            invoker_factory: InvokerFactory::new(move |handle, kernels, p: &FwdInvokeParams| {
                let [kernel] = plan_kernels::<1>(kernels)?;
                handle.run(
                    kernel,
                    &[
                        p.input.into(),
                        p.output.into(),
                        TensorView5::from_descriptor(&p.input_desc)?.into(),
                        TensorView5::from_descriptor(&p.output_desc)?.into(),
                        dim.into(),
                    ],
                )?;
                Ok(())
            }),
        })
    }
}

impl Solver<BwdProblemDescription> for GluBackward {
    fn name(&self) -> &'static str {
        "GLUBackward"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, _problem: &BwdProblemDescription) -> bool {
        true
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &BwdProblemDescription,
    ) -> Result<Solution<BwdInvokeParams>> {
        let plan = KernelPlan::new().with(KernelInfo::linear(
            KERNEL_FILE,
            "GLUBackward",
            type_build_params(problem.input().dtype()),
            problem.output_grad().element_count(),
            LOCAL_SIZE_FWD,
        ));
        let dim = problem.dim();
        Ok(Solution {
            plan,
            workspace_size: 0,
            invoker_factory: InvokerFactory::new(move |handle, kernels, p: &BwdInvokeParams| {
                let [kernel] = plan_kernels::<1>(kernels)?;
                handle.run(
                    kernel,
                    &[
                        p.input.into(),
                        p.output_grad.into(),
                        p.input_grad.into(),
                        TensorView5::from_descriptor(&p.input_desc)?.into(),
                        TensorView5::from_descriptor(&p.output_grad_desc)?.into(),
                        TensorView5::from_descriptor(&p.input_grad_desc)?.into(),
                        dim.into(),
                    ],
                )?;
                Ok(())
            }),
        })
    }
}
