use tk_runtime::KernelInfo;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::kernels::embedding::{BAG_MAX, BAG_MEAN, BAG_SUM};
use crate::reduce::LOCAL_SIZE_FWD;
use crate::solver::{plan_kernels, type_build_params, InvokerFactory, KernelPlan, Solution, Solver, SolverChain};

use super::problem::{EmbeddingBagMode, FwdInvokeParams, FwdProblemDescription};

const KERNEL_FILE: &str = "EmbeddingBag.cl";

/// One work item per output element, walking its bag's indices.
pub struct EmbeddingBagForward;

pub static FORWARD: SolverChain<FwdProblemDescription> =
    SolverChain::new("EmbeddingBagForward", &[&EmbeddingBagForward]);

fn mode_code(mode: EmbeddingBagMode) -> i64 {
    match mode {
        EmbeddingBagMode::Sum => BAG_SUM,
        EmbeddingBagMode::Mean => BAG_MEAN,
        EmbeddingBagMode::Max => BAG_MAX,
    }
}

impl Solver<FwdProblemDescription> for EmbeddingBagForward {
    fn name(&self) -> &'static str {
        "EmbeddingBagForward"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext<'_>, problem: &FwdProblemDescription) -> bool {
        problem.is_all_contiguous()
    }

    fn solution(
        &self,
        _ctx: &ExecutionContext<'_>,
        problem: &FwdProblemDescription,
    ) -> Result<Solution<FwdInvokeParams>> {
        let build = type_build_params(problem.weight().dtype())
            .define("INDEX_TYPE", problem.input().dtype().kernel_type_name())
            .define("MODE", problem.mode());
        let plan = KernelPlan::new().with(KernelInfo::linear(
            KERNEL_FILE,
            "EmbeddingBagForward",
            build,
            problem.bags() * problem.embedding_dim(),
            LOCAL_SIZE_FWD,
        ));
        let num_embeddings = problem.num_embeddings() as i64;
        let dim = problem.embedding_dim() as i64;
        let bags = problem.bags() as i64;
        let bag_size = problem.bag_size() as i64;
        let mode = mode_code(problem.mode());
        Ok(Solution {
            plan,
            workspace_size: 0,
            invoker_factory: InvokerFactory::new(move |handle, kernels, p: &FwdInvokeParams| {
                let [kernel] = plan_kernels::<1>(kernels)?;
                handle.run(
                    kernel,
                    &[
                        p.input.into(),
                        p.offsets.into(),
                        p.weight.into(),
                        p.per_sample_weights.into(),
                        p.output.into(),
                        num_embeddings.into(),
                        dim.into(),
                        bags.into(),
                        bag_size.into(),
                        mode.into(),
                    ],
                )?;
                Ok(())
            }),
        })
    }
}
