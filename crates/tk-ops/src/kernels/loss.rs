//! Absolute-difference loss kernels. `beta > 0` selects the smooth
//! (Huber-style) variant; `beta == 0` is plain L1.

use tk_runtime::{KernelContext, Result};
use tk_tensor::Element;

#[inline]
fn sign(d: f64) -> f64 {
    if d > 0.0 {
        1.0
    } else if d < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[inline]
pub(crate) fn loss(d: f64, beta: f64) -> f64 {
    if beta > 0.0 {
        if d.abs() < beta {
            0.5 * d * d / beta
        } else {
            d.abs() - 0.5 * beta
        }
    } else {
        d.abs()
    }
}

#[inline]
pub(crate) fn grad(d: f64, beta: f64) -> f64 {
    if beta > 0.0 && d.abs() < beta {
        d / beta
    } else {
        sign(d)
    }
}

/// Per-element loss divided by `divisor`, written densely to the workspace.
///
/// Args: input, target, workspace, divisor, beta, input view, target view.
pub(crate) fn reduced_forward<T: Element>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let divisor = ctx.float(3)?;
    let beta = ctx.float(4)?;
    let iv = ctx.view(5)?;
    let tv = ctx.view(6)?;
    let n = iv.element_count();
    for gid in 0..(ctx.global_size(0) as i64).min(n) {
        let c = iv.coordinates_of(gid);
        let x = ctx.load::<T>(0, iv.offset_of(&c))?.to_f64();
        let t = ctx.load::<T>(1, tv.offset_of(&c))?.to_f64();
        ctx.store(2, gid, T::from_f64(loss(x - t, beta) / divisor))?;
    }
    Ok(())
}

/// Args: input, target, output, beta, input view, target view, output view.
pub(crate) fn unreduced_forward<T: Element>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let beta = ctx.float(3)?;
    let iv = ctx.view(4)?;
    let tv = ctx.view(5)?;
    let ov = ctx.view(6)?;
    let n = iv.element_count();
    for gid in 0..(ctx.global_size(0) as i64).min(n) {
        let c = iv.coordinates_of(gid);
        let x = ctx.load::<T>(0, iv.offset_of(&c))?.to_f64();
        let t = ctx.load::<T>(1, tv.offset_of(&c))?.to_f64();
        ctx.store(2, ov.offset_of(&c), T::from_f64(loss(x - t, beta)))?;
    }
    Ok(())
}

/// Args: input, target, output grad (one element), input grad, target grad,
/// divisor, beta, input view, target view, input grad view, target grad
/// view. Null gradient pointers are skipped.
pub(crate) fn reduced_backward<T: Element>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let divisor = ctx.float(5)?;
    let beta = ctx.float(6)?;
    let iv = ctx.view(7)?;
    let tv = ctx.view(8)?;
    let div = ctx.view(9)?;
    let dtv = ctx.view(10)?;
    let write_di = !ctx.is_null(3)?;
    let write_dt = !ctx.is_null(4)?;
    let scale = ctx.load::<T>(2, 0)?.to_f64() / divisor;

    let n = iv.element_count();
    for gid in 0..(ctx.global_size(0) as i64).min(n) {
        let c = iv.coordinates_of(gid);
        let x = ctx.load::<T>(0, iv.offset_of(&c))?.to_f64();
        let t = ctx.load::<T>(1, tv.offset_of(&c))?.to_f64();
        let g = grad(x - t, beta) * scale;
        if write_di {
            ctx.store(3, div.offset_of(&c), T::from_f64(g))?;
        }
        if write_dt {
            ctx.store(4, dtv.offset_of(&c), T::from_f64(-g))?;
        }
    }
    Ok(())
}

/// Args: input, target, output grad, input grad, target grad, beta, input
/// view, target view, output grad view, input grad view, target grad view.
pub(crate) fn unreduced_backward<T: Element>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let beta = ctx.float(5)?;
    let iv = ctx.view(6)?;
    let tv = ctx.view(7)?;
    let dov = ctx.view(8)?;
    let div = ctx.view(9)?;
    let dtv = ctx.view(10)?;
    let write_di = !ctx.is_null(3)?;
    let write_dt = !ctx.is_null(4)?;

    let n = iv.element_count();
    for gid in 0..(ctx.global_size(0) as i64).min(n) {
        let c = iv.coordinates_of(gid);
        let x = ctx.load::<T>(0, iv.offset_of(&c))?.to_f64();
        let t = ctx.load::<T>(1, tv.offset_of(&c))?.to_f64();
        let dout = ctx.load::<T>(2, dov.offset_of(&c))?.to_f64();
        let g = grad(x - t, beta) * dout;
        if write_di {
            ctx.store(3, div.offset_of(&c), T::from_f64(g))?;
        }
        if write_dt {
            ctx.store(4, dtv.offset_of(&c), T::from_f64(-g))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_l1() {
        assert_eq!(loss(-2.5, 0.0), 2.5);
        assert_eq!(grad(-2.5, 0.0), -1.0);
        assert_eq!(grad(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_smooth_l1() {
        assert_eq!(loss(0.5, 1.0), 0.125);
        assert_eq!(loss(3.0, 1.0), 2.5);
        assert_eq!(grad(0.5, 1.0), 0.5);
        assert_eq!(grad(-3.0, 1.0), -1.0);
    }
}
