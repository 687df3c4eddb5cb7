use tk_runtime::{KernelArg, KernelInfo};
use tk_tensor::{TensorDescriptor, TensorView5};

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::reduce::LOCAL_SIZE_FWD;
use crate::solver::{
    plan_kernels, run_sequence, type_build_params, InvokerFactory, KernelPlan, Solution, Solver,
    SolverChain,
};

use super::problem::{BwdInvokeParams, BwdProblemDescription, FwdInvokeParams, FwdProblemDescription};

const KERNEL_FILE: &str = "Where.cl";
const FILL_KERNEL_FILE: &str = "Fill.cl";

/// Every operand is read through a view broadcast to the output shape.
pub struct WhereBroadcastForward;

/// Zero the present gradients, then route each output-grad element.
pub struct WhereBroadcastBackward;

pub static FORWARD: SolverChain<FwdProblemDescription> =
    SolverChain::new("WhereForward", &[&WhereBroadcastForward]);

pub static BACKWARD: SolverChain<BwdProblemDescription> =
    SolverChain::new("WhereBackward", &[&WhereBroadcastBackward]);

fn fill_info(desc: &TensorDescriptor) -> KernelInfo {
    KernelInfo::linear(
        FILL_KERNEL_FILE,
        "FillZero",
        type_build_params(desc.dtype()),
        desc.element_count(),
        LOCAL_SIZE_FWD,
    )
}

impl Solver<FwdProblemDescription> for WhereBroadcastForward {
    fn name(&self) -> &'static str {
        "WhereBroadcastForward"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, _problem: &FwdProblemDescription) -> bool {
        true
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &FwdProblemDescription,
    ) -> Result<Solution<FwdInvokeParams>> {
        let output = problem.output();
        let plan = KernelPlan::new().with(KernelInfo::linear(
            KERNEL_FILE,
            "WhereForward",
            type_build_params(output.dtype()),
            output.element_count(),
            LOCAL_SIZE_FWD,
        ));
        Ok(Solution {
            plan,
            workspace_size: 0,
            invoker_factory: InvokerFactory::new(|handle, kernels, p: &FwdInvokeParams| {
                let [kernel] = plan_kernels::<1>(kernels)?;
                let shape = p.output_desc.shape();
                handle.run(
                    kernel,
                    &[
                        p.condition.into(),
                        p.input.into(),
                        p.other.into(),
                        p.output.into(),
                        TensorView5::broadcast_from(&p.condition_desc, shape)?.into(),
                        TensorView5::broadcast_from(&p.input_desc, shape)?.into(),
                        TensorView5::broadcast_from(&p.other_desc, shape)?.into(),
                        TensorView5::from_descriptor(&p.output_desc)?.into(),
                    ],
                )?;
                Ok(())
            }),
        })
    }
}

impl Solver<BwdProblemDescription> for WhereBroadcastBackward {
    fn name(&self) -> &'static str {
        "WhereBroadcastBackward"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, _problem: &BwdProblemDescription) -> bool {
        true
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &BwdProblemDescription,
    ) -> Result<Solution<BwdInvokeParams>> {
        let output_grad = problem.output_grad();
        let plan = KernelPlan::new()
            .with(fill_info(problem.input_grad()))
            .with(fill_info(problem.other_grad()))
            .with(KernelInfo::linear(
                KERNEL_FILE,
                "WhereBackward",
                type_build_params(output_grad.dtype()),
                output_grad.element_count(),
                LOCAL_SIZE_FWD,
            ));
        Ok(Solution {
            plan,
            workspace_size: 0,
            invoker_factory: InvokerFactory::new(|handle, kernels, p: &BwdInvokeParams| {
                let [fill_input, fill_other, route] = plan_kernels::<3>(kernels)?;
                let shape = p.output_grad_desc.shape();
                let mut launches: Vec<(_, Vec<KernelArg>)> = Vec::with_capacity(3);
                for (kernel, ptr, desc) in [
                    (fill_input, p.input_grad, &p.input_grad_desc),
                    (fill_other, p.other_grad, &p.other_grad_desc),
                ] {
                    if !ptr.is_null() {
                        launches.push((kernel, vec![ptr.into(), TensorView5::from_descriptor(desc)?.into()]));
                    }
                }
                launches.push((
                    route,
                    vec![
                        p.condition.into(),
                        p.output_grad.into(),
                        p.input_grad.into(),
                        p.other_grad.into(),
                        TensorView5::broadcast_from(&p.condition_desc, shape)?.into(),
                        TensorView5::from_descriptor(&p.output_grad_desc)?.into(),
                        TensorView5::broadcast_from(&p.input_grad_desc, shape)?.into(),
                        TensorView5::broadcast_from(&p.other_grad_desc, shape)?.into(),
                    ],
                ));
                run_sequence(handle, &launches)
            }),
        })
    }
}
