use tk_runtime::{KernelContext, Result};
use tk_tensor::Element;

/// Copy between two views that enumerate the same number of elements.
///
/// Args: source, destination, source view, destination view, source base
/// offset, destination base offset.
pub(crate) fn strided_copy<T: Element>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let sv = ctx.view(2)?;
    let dv = ctx.view(3)?;
    let src_base = ctx.int(4)?;
    let dst_base = ctx.int(5)?;
    let n = dv.element_count().min(sv.element_count());
    for gid in 0..(ctx.global_size(0) as i64).min(n) {
        let value = ctx.load::<T>(0, src_base + sv.offset_at(gid))?;
        ctx.store(1, dst_base + dv.offset_at(gid), value)?;
    }
    Ok(())
}
