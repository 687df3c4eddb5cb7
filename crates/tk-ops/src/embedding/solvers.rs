use tk_runtime::{BuildParams, KernelInfo};
use tk_tensor::{TensorDescriptor, TensorView5};

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::reduce::LOCAL_SIZE_FWD;
use crate::solver::{
    plan_kernels, run_sequence, type_build_params, InvokerFactory, KernelPlan, Solution, Solver,
    SolverChain,
};

use super::problem::{BwdInvokeParams, BwdProblemDescription, FwdInvokeParams, FwdProblemDescription};

const KERNEL_FILE: &str = "Embedding.cl";
const FILL_KERNEL_FILE: &str = "Fill.cl";

pub struct EmbeddingForward;

/// Zero the weight gradient, then accumulate one output-grad row per index.
pub struct EmbeddingBackward;

pub static FORWARD: SolverChain<FwdProblemDescription> =
    SolverChain::new("EmbeddingForward", &[&EmbeddingForward]);

pub static BACKWARD: SolverChain<BwdProblemDescription> =
    SolverChain::new("EmbeddingBackward", &[&EmbeddingBackward]);

fn indexed_build_params(data: &TensorDescriptor, indices: &TensorDescriptor) -> BuildParams {
    type_build_params(data.dtype()).define("INDEX_TYPE", indices.dtype().kernel_type_name())
}

impl Solver<FwdProblemDescription> for EmbeddingForward {
    fn name(&self) -> &'static str {
        "EmbeddingForward"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, problem: &FwdProblemDescription) -> bool {
        problem.is_all_contiguous()
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &FwdProblemDescription,
    ) -> Result<Solution<FwdInvokeParams>> {
        let count = problem.input().element_count();
        let num_embeddings = problem.num_embeddings() as i64;
        let dim = problem.embedding_dim() as i64;
        let plan = KernelPlan::new().with(KernelInfo::linear(
            KERNEL_FILE,
            "EmbeddingForward",
            indexed_build_params(problem.weight(), problem.input()),
            count * problem.embedding_dim(),
            LOCAL_SIZE_FWD,
        ));
        let count = count as i64;
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
                        num_embeddings.into(),
                        dim.into(),
                        count.into(),
                    ],
                )?;
                Ok(())
            }),
        })
    }
}

impl Solver<BwdProblemDescription> for EmbeddingBackward {
    fn name(&self) -> &'static str {
        "EmbeddingBackward"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, problem: &BwdProblemDescription) -> bool {
        problem.is_all_contiguous()
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &BwdProblemDescription,
    ) -> Result<Solution<BwdInvokeParams>> {
        let weight_grad = problem.weight_grad();
        let count = problem.input().element_count();
        let plan = KernelPlan::new()
            .with(KernelInfo::linear(
                FILL_KERNEL_FILE,
                "FillZero",
                type_build_params(weight_grad.dtype()),
                weight_grad.element_count(),
                LOCAL_SIZE_FWD,
            ))
            .with(KernelInfo::linear(
                KERNEL_FILE,
                "EmbeddingBackward",
                indexed_build_params(weight_grad, problem.input()),
                count * problem.embedding_dim(),
                LOCAL_SIZE_FWD,
            ));
        let num_embeddings = problem.num_embeddings() as i64;
        let dim = problem.embedding_dim() as i64;
        let count = count as i64;
        let padding_idx = problem.padding_idx().map_or(-1, |idx| idx as i64);
        Ok(Solution {
            plan,
            workspace_size: 0,
            invoker_factory: InvokerFactory::new(move |handle, kernels, p: &BwdInvokeParams| {
                let [fill, accumulate] = plan_kernels::<2>(kernels)?;
                run_sequence(
                    handle,
                    &[
                        (
                            fill,
                            vec![
                                p.weight_grad.into(),
                                TensorView5::from_descriptor(&p.weight_grad_desc)?.into(),
                            ],
                        ),
                        (
                            accumulate,
                            vec![
                                p.input.into(),
                                p.output_grad.into(),
                                p.weight_grad.into(),
                                p.indices_freq.into(),
                                num_embeddings.into(),
                                dim.into(),
                                count.into(),
                                padding_idx.into(),
                            ],
                        ),
                    ],
                )
            }),
        })
    }
}
