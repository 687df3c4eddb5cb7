use tk_runtime::{KernelContext, Result};
use tk_tensor::Element;

use super::sigmoid;

/// One work item per output element; the gate half sits `half` positions
/// further along `dim`.
///
/// Args: input, output, input view, output view, dim.
pub(crate) fn forward<T: Element>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let iv = ctx.view(2)?;
    let ov = ctx.view(3)?;
    let dim = ctx.uint(4)? as usize;
    let half = ov.size[dim];

    let n = ov.element_count();
    for gid in 0..(ctx.global_size(0) as i64).min(n) {
        let c = ov.coordinates_of(gid);
        let mut gate = c;
        gate[dim] += half;
        let a = ctx.load::<T>(0, iv.offset_of(&c))?.to_f64();
        let b = ctx.load::<T>(0, iv.offset_of(&gate))?.to_f64();
        ctx.store(1, ov.offset_of(&c), T::from_f64(a * sigmoid(b)))?;
    }
    Ok(())
}

/// Args: input, output grad, input grad, input view, output grad view,
/// input grad view, dim.
pub(crate) fn backward<T: Element>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let iv = ctx.view(3)?;
    let dov = ctx.view(4)?;
    let div = ctx.view(5)?;
    let dim = ctx.uint(6)? as usize;
    let half = dov.size[dim];

    let n = dov.element_count();
    for gid in 0..(ctx.global_size(0) as i64).min(n) {
        let c = dov.coordinates_of(gid);
        let mut gate = c;
        gate[dim] += half;
        let a = ctx.load::<T>(0, iv.offset_of(&c))?.to_f64();
        let b = ctx.load::<T>(0, iv.offset_of(&gate))?.to_f64();
        let g = ctx.load::<T>(1, dov.offset_of(&c))?.to_f64();
        let s = sigmoid(b);
        ctx.store(2, div.offset_of(&c), T::from_f64(g * s))?;
        ctx.store(2, div.offset_of(&gate), T::from_f64(g * a * s * (1.0 - s)))?;
    }
    Ok(())
}
