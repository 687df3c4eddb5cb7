use tk_runtime::{KernelContext, Result};
use tk_tensor::Element;

/// Each work-group sums one block of `local_size(0)` consecutive inputs.
///
/// Args: input, output, input size.
pub(crate) fn reduce_sum<T: Element>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let size = ctx.uint(2)? as i64;
    let block = ctx.local_size(0) as i64;
    for group in 0..ctx.num_groups(0) as i64 {
        let start = group * block;
        if start >= size {
            break;
        }
        let end = (start + block).min(size);
        let mut sum = 0.0f64;
        for i in start..end {
            sum += ctx.load::<T>(0, i)?.to_f64();
        }
        ctx.store(1, group, T::from_f64(sum))?;
    }
    Ok(())
}

/// Args: output, output view.
pub(crate) fn fill_zero<T: Element>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let view = ctx.view(1)?;
    let n = view.element_count();
    for gid in 0..(ctx.global_size(0) as i64).min(n) {
        ctx.store(0, view.offset_at(gid), T::default())?;
    }
    Ok(())
}
