//! Gather along one axis over the canonical `[batch, outer, gather, inner]`
//! layout of a contiguous param tensor. The output is laid out as
//! `[batch, outer, indices, inner]`, where `indices` is the number of index
//! entries per batch. Indices outside `0..gather` read zero in the forward
//! pass and are dropped in the backward pass.

use tk_runtime::{KernelContext, Result};
use tk_tensor::Element;

use super::IndexElement;

#[derive(Debug, Clone, Copy)]
struct Geometry {
    batch: i64,
    outer: i64,
    gather: i64,
    indices: i64,
    inner: i64,
}

impl Geometry {
    fn out_size(&self) -> i64 {
        self.batch * self.outer * self.indices * self.inner
    }

    /// Index-tensor position and param position read by output element
    /// `gid`, before the index value is known.
    #[inline]
    fn split(&self, gid: i64) -> (i64, i64, i64) {
        let inner_i = gid % self.inner;
        let rest = gid / self.inner;
        let idx_i = rest % self.indices;
        let rest = rest / self.indices;
        let outer_i = rest % self.outer;
        let batch_i = rest / self.outer;
        (
            batch_i * self.indices + idx_i,
            (batch_i * self.outer + outer_i) * self.gather,
            inner_i,
        )
    }
}

fn scatter_add<T: Element, I: IndexElement>(
    ctx: &mut KernelContext<'_>,
    geom: Geometry,
) -> Result<()> {
    let n = geom.out_size();
    for gid in 0..(ctx.global_size(0) as i64).min(n) {
        let (idx_pos, row_base, inner_i) = geom.split(gid);
        let g = ctx.load::<I>(1, idx_pos)?.to_index();
        if g < 0 || g >= geom.gather {
            continue;
        }
        let param_i = (row_base + g) * geom.inner + inner_i;
        let acc = ctx.load::<T>(2, param_i)?.to_f64() + ctx.load::<T>(0, gid)?.to_f64();
        ctx.store(2, param_i, T::from_f64(acc))?;
    }
    Ok(())
}

/// Args: param, indices, output, batch, outer, gather, indices, inner.
pub(crate) fn forward<T: Element, I: IndexElement>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let geom = Geometry {
        batch: ctx.int(3)?,
        outer: ctx.int(4)?,
        gather: ctx.int(5)?,
        indices: ctx.int(6)?,
        inner: ctx.int(7)?,
    };
    let n = geom.out_size();
    for gid in 0..(ctx.global_size(0) as i64).min(n) {
        let (idx_pos, row_base, inner_i) = geom.split(gid);
        let g = ctx.load::<I>(1, idx_pos)?.to_index();
        let value = if g < 0 || g >= geom.gather {
            T::default()
        } else {
            ctx.load::<T>(0, (row_base + g) * geom.inner + inner_i)?
        };
        ctx.store(2, gid, value)?;
    }
    Ok(())
}

/// Args: output grad, indices, param grad, outer, gather, indices, inner.
pub(crate) fn backward<T: Element, I: IndexElement>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let geom = Geometry {
        batch: 1,
        outer: ctx.int(3)?,
        gather: ctx.int(4)?,
        indices: ctx.int(5)?,
        inner: ctx.int(6)?,
    };
    scatter_add::<T, I>(ctx, geom)
}

/// Args: output grad, indices, param grad, batch, outer, gather, indices,
/// inner.
pub(crate) fn batched_backward<T: Element, I: IndexElement>(
    ctx: &mut KernelContext<'_>,
) -> Result<()> {
    let geom = Geometry {
        batch: ctx.int(3)?,
        outer: ctx.int(4)?,
        gather: ctx.int(5)?,
        indices: ctx.int(6)?,
        inner: ctx.int(7)?,
    };
    scatter_add::<T, I>(ctx, geom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split() {
        let geom = Geometry {
            batch: 2,
            outer: 3,
            gather: 5,
            indices: 4,
            inner: 6,
        };
        assert_eq!(geom.out_size(), 144);
        // gid = ((1 * 3 + 2) * 4 + 3) * 6 + 5
        let gid = ((3 + 2) * 4 + 3) * 6 + 5;
        assert_eq!(geom.split(gid), (4 + 3, (3 + 2) * 5, 5));
    }
}
