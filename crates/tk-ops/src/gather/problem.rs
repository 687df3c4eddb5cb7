use tk_runtime::DevicePtr;
use tk_tensor::{TensorDescriptor, MAX_RANK};

use crate::error::{bad_param, Result};
use crate::problem::{
    check_float, check_index, check_lengths, check_rank, check_same_dtype, check_tensor,
    resolve_axis, CacheKey, ProblemDescription,
};

/// Gather axis and the number of leading dimensions shared by param and
/// indices. Negative values count from the end (`axis` against the param
/// rank, `batch_dims` against the indices rank).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatherParams {
    pub axis: i64,
    pub batch_dims: i64,
}

impl GatherParams {
    pub fn new(axis: i64, batch_dims: i64) -> Self {
        GatherParams { axis, batch_dims }
    }
}

/// `[batch, outer, gather, inner]` extents of a contiguous gather, plus the
/// number of index entries per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatherGeometry {
    pub batch: usize,
    pub outer: usize,
    pub gather: usize,
    pub indices: usize,
    pub inner: usize,
}

impl GatherGeometry {
    pub fn output_count(&self) -> usize {
        self.batch * self.outer * self.indices * self.inner
    }
}

/// Axes resolved against concrete ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResolvedAxes {
    axis: usize,
    batch_dims: usize,
}

fn resolve(params: GatherParams, param: &TensorDescriptor, indices: &TensorDescriptor) -> Result<ResolvedAxes> {
    let axis = resolve_axis(params.axis, param.rank(), "axis")?;
    let batch_dims = if params.batch_dims < 0 {
        params.batch_dims + indices.rank() as i64
    } else {
        params.batch_dims
    };
    if batch_dims < 0 || batch_dims as usize > axis {
        return Err(bad_param(format!(
            "batch_dims {} must lie in 0..={axis}",
            params.batch_dims
        )));
    }
    let batch_dims = batch_dims as usize;
    if batch_dims > indices.rank() {
        return Err(bad_param(format!(
            "batch_dims {batch_dims} exceeds indices rank {}",
            indices.rank()
        )));
    }
    if param.lengths()[..batch_dims] != indices.lengths()[..batch_dims] {
        return Err(bad_param(format!(
            "leading {batch_dims} dims of param {:?} and indices {:?} differ",
            param.lengths(),
            indices.lengths()
        )));
    }
    Ok(ResolvedAxes { axis, batch_dims })
}

/// `param[..axis] ++ indices[batch_dims..] ++ param[axis + 1..]`.
pub fn gather_output_lengths(
    param: &TensorDescriptor,
    indices: &TensorDescriptor,
    params: GatherParams,
) -> Result<Vec<usize>> {
    let axes = resolve(params, param, indices)?;
    let mut lengths = param.lengths()[..axes.axis].to_vec();
    lengths.extend_from_slice(&indices.lengths()[axes.batch_dims..]);
    lengths.extend_from_slice(&param.lengths()[axes.axis + 1..]);
    Ok(lengths)
}

fn geometry(param: &TensorDescriptor, indices: &TensorDescriptor, axes: ResolvedAxes) -> GatherGeometry {
    let p = param.lengths();
    GatherGeometry {
        batch: p[..axes.batch_dims].iter().product(),
        outer: p[axes.batch_dims..axes.axis].iter().product(),
        gather: p[axes.axis],
        indices: indices.lengths()[axes.batch_dims..].iter().product(),
        inner: p[axes.axis + 1..].iter().product(),
    }
}

/// Shared shape of a forward or backward gather: the data tensor on the
/// param side, the index tensor and the data tensor on the output side.
#[derive(Debug, Clone)]
struct GatherShape {
    param: TensorDescriptor,
    indices: TensorDescriptor,
    output: TensorDescriptor,
    axes: ResolvedAxes,
}

impl GatherShape {
    fn new(
        param: &TensorDescriptor,
        param_name: &str,
        indices: &TensorDescriptor,
        output: &TensorDescriptor,
        output_name: &str,
        params: GatherParams,
    ) -> Result<Self> {
        check_tensor(param, param_name)?;
        check_tensor(output, output_name)?;
        check_rank(indices, "indices", MAX_RANK)?;
        if indices.element_count() == 0 {
            return Err(bad_param("indices is empty"));
        }
        check_float(param, param_name)?;
        check_index(indices, "indices")?;
        check_same_dtype(param, param_name, output, output_name)?;
        let axes = resolve(params, param, indices)?;
        check_lengths(output, output_name, &gather_output_lengths(param, indices, params)?)?;
        Ok(GatherShape {
            param: param.clone(),
            indices: indices.clone(),
            output: output.clone(),
            axes,
        })
    }

    fn is_all_contiguous(&self) -> bool {
        self.param.is_contiguous() && self.indices.is_contiguous() && self.output.is_contiguous()
    }

    fn geometry(&self) -> GatherGeometry {
        geometry(&self.param, &self.indices, self.axes)
    }

    fn key(&self, family: &str, param_name: &str, output_name: &str) -> CacheKey {
        CacheKey::new(family)
            .tensor(param_name, &self.param)
            .tensor("indices", &self.indices)
            .tensor(output_name, &self.output)
            .field("axis", self.axes.axis)
            .field("batch_dims", self.axes.batch_dims)
    }
}

#[derive(Debug, Clone)]
pub struct FwdProblemDescription {
    shape: GatherShape,
}

impl FwdProblemDescription {
    pub fn new(
        param: &TensorDescriptor,
        indices: &TensorDescriptor,
        output: &TensorDescriptor,
        params: GatherParams,
    ) -> Result<Self> {
        Ok(FwdProblemDescription {
            shape: GatherShape::new(param, "param", indices, output, "output", params)?,
        })
    }

    pub fn param(&self) -> &TensorDescriptor {
        &self.shape.param
    }

    pub fn indices(&self) -> &TensorDescriptor {
        &self.shape.indices
    }

    pub fn is_all_contiguous(&self) -> bool {
        self.shape.is_all_contiguous()
    }

    pub fn geometry(&self) -> GatherGeometry {
        self.shape.geometry()
    }
}

impl ProblemDescription for FwdProblemDescription {
    type InvokeParams = FwdInvokeParams;

    fn cache_key(&self) -> CacheKey {
        self.shape.key("gatherv2_fwd", "param", "output")
    }
}

#[derive(Debug, Clone)]
pub struct FwdInvokeParams {
    pub param: DevicePtr,
    pub indices: DevicePtr,
    pub output: DevicePtr,
}

#[derive(Debug, Clone)]
pub struct BwdProblemDescription {
    shape: GatherShape,
}

impl BwdProblemDescription {
    pub fn new(
        param_grad: &TensorDescriptor,
        indices: &TensorDescriptor,
        output_grad: &TensorDescriptor,
        params: GatherParams,
    ) -> Result<Self> {
        Ok(BwdProblemDescription {
            shape: GatherShape::new(param_grad, "param_grad", indices, output_grad, "output_grad", params)?,
        })
    }

    pub fn param_grad(&self) -> &TensorDescriptor {
        &self.shape.param
    }

    pub fn indices(&self) -> &TensorDescriptor {
        &self.shape.indices
    }

    pub fn batch_dims(&self) -> usize {
        self.shape.axes.batch_dims
    }

    pub fn is_all_contiguous(&self) -> bool {
        self.shape.is_all_contiguous()
    }

    pub fn geometry(&self) -> GatherGeometry {
        self.shape.geometry()
    }
}

impl ProblemDescription for BwdProblemDescription {
    type InvokeParams = BwdInvokeParams;

    fn cache_key(&self) -> CacheKey {
        self.shape.key("gatherv2_bwd", "param_grad", "output_grad")
    }
}

#[derive(Debug, Clone)]
pub struct BwdInvokeParams {
    pub param_grad_desc: TensorDescriptor,
    pub output_grad: DevicePtr,
    pub indices: DevicePtr,
    pub param_grad: DevicePtr,
}
