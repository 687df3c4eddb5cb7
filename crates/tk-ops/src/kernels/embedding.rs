use tk_runtime::{KernelContext, Result};
use tk_tensor::Element;

use super::IndexElement;

/// One work item per output element. Out-of-range indices produce a zero
/// row.
///
/// Args: indices, weight, output, num embeddings, embedding dim, index count.
pub(crate) fn forward<T: Element, I: IndexElement>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let num_embeddings = ctx.int(3)?;
    let dim = ctx.int(4)?;
    let count = ctx.int(5)?;
    for gid in 0..(ctx.global_size(0) as i64).min(count * dim) {
        let row = ctx.load::<I>(0, gid / dim)?.to_index();
        let value = if (0..num_embeddings).contains(&row) {
            ctx.load::<T>(1, row * dim + gid % dim)?
        } else {
            T::default()
        };
        ctx.store(2, gid, value)?;
    }
    Ok(())
}

/// Accumulate output-grad rows into weight-grad rows.
///
/// Args: indices, output grad, weight grad, frequencies (may be null),
/// num embeddings, embedding dim, index count, padding index (negative for
/// none).
pub(crate) fn backward<T: Element, I: IndexElement>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let num_embeddings = ctx.int(4)?;
    let dim = ctx.int(5)?;
    let count = ctx.int(6)?;
    let padding_idx = ctx.int(7)?;
    let scale_by_freq = !ctx.is_null(3)?;

    for gid in 0..(ctx.global_size(0) as i64).min(count * dim) {
        let row = ctx.load::<I>(0, gid / dim)?.to_index();
        if !(0..num_embeddings).contains(&row) || row == padding_idx {
            continue;
        }
        let mut g = ctx.load::<T>(1, gid)?.to_f64();
        if scale_by_freq {
            let freq = ctx.load::<I>(3, row)?.to_index();
            if freq > 0 {
                g /= freq as f64;
            }
        }
        let w = row * dim + gid % dim;
        let acc = ctx.load::<T>(2, w)?.to_f64() + g;
        ctx.store(2, w, T::from_f64(acc))?;
    }
    Ok(())
}

/// Bag reduction codes passed as the last kernel argument.
pub(crate) const BAG_SUM: i64 = 0;
pub(crate) const BAG_MEAN: i64 = 1;
pub(crate) const BAG_MAX: i64 = 2;

/// One work item per output element `(bag, d)`.
///
/// Without offsets bag `b` covers indices `[b * bag_size, (b + 1) * bag_size)`.
/// With offsets it covers `[offsets[b], offsets[b + 1])`, the last bag
/// running to `bag_size`, which is then the total index count. Indices out
/// of range are skipped and do not count towards the mean; a bag with no
/// valid index yields zero.
///
/// Args: indices, offsets (may be null), weight, per-sample weights (may be
/// null), output, num embeddings, embedding dim, bag count, bag size, mode.
pub(crate) fn bag_forward<T: Element, I: IndexElement>(ctx: &mut KernelContext<'_>) -> Result<()> {
    let has_offsets = !ctx.is_null(1)?;
    let weighted = !ctx.is_null(3)?;
    let num_embeddings = ctx.int(5)?;
    let dim = ctx.int(6)?;
    let bags = ctx.int(7)?;
    let bag_size = ctx.int(8)?;
    let mode = ctx.int(9)?;

    for gid in 0..(ctx.global_size(0) as i64).min(bags * dim) {
        let (bag, d) = (gid / dim, gid % dim);
        let (start, end) = if has_offsets {
            let start = ctx.load::<I>(1, bag)?.to_index().clamp(0, bag_size);
            let end = if bag + 1 < bags {
                ctx.load::<I>(1, bag + 1)?.to_index()
            } else {
                bag_size
            };
            (start, end.clamp(start, bag_size))
        } else {
            (bag * bag_size, (bag + 1) * bag_size)
        };

        let mut acc = if mode == BAG_MAX { f64::NEG_INFINITY } else { 0.0 };
        let mut count = 0i64;
        for i in start..end {
            let row = ctx.load::<I>(0, i)?.to_index();
            if !(0..num_embeddings).contains(&row) {
                continue;
            }
            let mut v = ctx.load::<T>(2, row * dim + d)?.to_f64();
            if weighted {
                v *= ctx.load::<T>(3, i)?.to_f64();
            }
            acc = if mode == BAG_MAX { acc.max(v) } else { acc + v };
            count += 1;
        }
        let value = match (count, mode) {
            (0, _) => 0.0,
            (_, BAG_MEAN) => acc / count as f64,
            _ => acc,
        };
        ctx.store(4, gid, T::from_f64(value))?;
    }
    Ok(())
}
