use tk_runtime::{KernelContext, Result};
use tk_tensor::Element;

/// Channel of a logical element; a single shared weight is always slot 0.
fn weight_slot(coords: &[i64; 5], shared: bool) -> i64 {
    if shared {
        0
    } else {
        coords[1]
    }
}

/// `y = x` for positive `x`, `w * x` otherwise.
///
/// Args: input, weight, output, input view, weight view, output view,
/// shared-weight flag.
pub(crate) fn forward<T: Element>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let iv = ctx.view(3)?;
    let wv = ctx.view(4)?;
    let ov = ctx.view(5)?;
    let shared = ctx.flag(6)?;

    let n = iv.element_count();
    for gid in 0..(ctx.global_size(0) as i64).min(n) {
        let c = iv.coordinates_of(gid);
        let x = ctx.load::<T>(0, iv.offset_of(&c))?.to_f64();
        let y = if x > 0.0 {
            x
        } else {
            let w = ctx.load::<T>(1, wv.offset_at(weight_slot(&c, shared)))?.to_f64();
            w * x
        };
        ctx.store(2, ov.offset_of(&c), T::from_f64(y))?;
    }
    Ok(())
}

/// Input gradient, plus the per-element weight-gradient terms `x * dO`
/// (zero for positive `x`) written densely into `partials`.
///
/// Args: input, weight, output grad, input grad (may be null), partials
/// (may be null), input view, weight view, output grad view, input grad
/// view, shared-weight flag.
pub(crate) fn backward<T: Element>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let iv = ctx.view(5)?;
    let wv = ctx.view(6)?;
    let dov = ctx.view(7)?;
    let div = ctx.view(8)?;
    let shared = ctx.flag(9)?;
    let want_input_grad = !ctx.is_null(3)?;
    let want_partials = !ctx.is_null(4)?;

    let n = iv.element_count();
    for gid in 0..(ctx.global_size(0) as i64).min(n) {
        let c = iv.coordinates_of(gid);
        let x = ctx.load::<T>(0, iv.offset_of(&c))?.to_f64();
        let g = ctx.load::<T>(2, dov.offset_of(&c))?.to_f64();
        if want_input_grad {
            let dx = if x > 0.0 {
                g
            } else {
                g * ctx.load::<T>(1, wv.offset_at(weight_slot(&c, shared)))?.to_f64()
            };
            ctx.store(3, div.offset_of(&c), T::from_f64(dx))?;
        }
        if want_partials {
            let term = if x > 0.0 { 0.0 } else { x * g };
            ctx.store(4, gid, T::from_f64(term))?;
        }
    }
    Ok(())
}

/// One work item per channel, summing `x * dO` over the non-positive
/// inputs of that channel.
///
/// Args: input, output grad, weight grad, input view, output grad view,
/// weight grad view.
pub(crate) fn weight_grad<T: Element>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let iv = ctx.view(3)?;
    let dov = ctx.view(4)?;
    let dwv = ctx.view(5)?;
    let [batch, channels, d2, d3, d4] = iv.size;
    let inner = d2 * d3 * d4;

    for channel in 0..(ctx.global_size(0) as i64).min(channels) {
        let mut sum = 0.0f64;
        for k in 0..batch * inner {
            let r = k % inner;
            let coords = [k / inner, channel, r / (d3 * d4), r / d4 % d3, r % d4];
            let x = ctx.load::<T>(0, iv.offset_of(&coords))?.to_f64();
            if x <= 0.0 {
                sum += x * ctx.load::<T>(1, dov.offset_of(&coords))?.to_f64();
            }
        }
        ctx.store(2, dwv.offset_at(channel), T::from_f64(sum))?;
    }
    Ok(())
}
