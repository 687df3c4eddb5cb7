use tk_runtime::{KernelContext, Result};
use tk_tensor::Element;

/// Args: condition (u8), input, other, output, condition view, input view,
/// other view, output view. All views are broadcast to the output shape.
pub(crate) fn forward<T: Element>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let cv = ctx.view(4)?;
    let iv = ctx.view(5)?;
    let ov = ctx.view(6)?;
    let outv = ctx.view(7)?;
    let n = outv.element_count();
    for gid in 0..(ctx.global_size(0) as i64).min(n) {
        let c = outv.coordinates_of(gid);
        let value = if ctx.load::<u8>(0, cv.offset_of(&c))? != 0 {
            ctx.load::<T>(1, iv.offset_of(&c))?
        } else {
            ctx.load::<T>(2, ov.offset_of(&c))?
        };
        ctx.store(3, outv.offset_of(&c), value)?;
    }
    Ok(())
}

/// Route each output-grad element to the input grad or the other grad.
/// Gradient views broadcast with stride 0, so repeated cells accumulate.
///
/// Args: condition, output grad, input grad, other grad, condition view,
/// output grad view, input grad view, other grad view.
pub(crate) fn backward<T: Element>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let cv = ctx.view(4)?;
    let dov = ctx.view(5)?;
    let div = ctx.view(6)?;
    let dotv = ctx.view(7)?;
    let write_input = !ctx.is_null(2)?;
    let write_other = !ctx.is_null(3)?;

    let n = dov.element_count();
    for gid in 0..(ctx.global_size(0) as i64).min(n) {
        let c = dov.coordinates_of(gid);
        let take_input = ctx.load::<u8>(0, cv.offset_of(&c))? != 0;
        let (arg, offset) = match (take_input, write_input, write_other) {
            (true, true, _) => (2, div.offset_of(&c)),
            (false, _, true) => (3, dotv.offset_of(&c)),
            _ => continue,
        };
        let g = ctx.load::<T>(1, dov.offset_of(&c))?.to_f64();
        let acc = ctx.load::<T>(arg, offset)?.to_f64() + g;
        ctx.store(arg, offset, T::from_f64(acc))?;
    }
    Ok(())
}
