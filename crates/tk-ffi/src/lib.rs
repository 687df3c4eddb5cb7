//! C-ABI surface over `tk-ops`.
//!
//! Every function returns a [`TkStatus`]; on failure the message is kept in
//! a thread-local slot and can be fetched once with [`tk_last_error`].
//! Handles and descriptors are opaque heap objects owned by the caller
//! between their create and destroy calls.

mod context;
mod error;
mod types;

pub use context::*;
pub use types::*;

use error::{report, report_panic, report_size};

use std::ffi::{c_void, CString};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};

use tk_ops::{Error, GatherParams, L1LossParams, TensorRef};
use tk_runtime::Handle;
use tk_tensor::TensorDescriptor;

/// Execute a closure returning a `TkStatus`, converting a panic into
/// `TkStatus::InternalError`.
fn catch_panic<F: FnOnce() -> TkStatus>(f: F) -> TkStatus {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| report_panic())
}

fn call<F: FnOnce() -> tk_ops::Result<()>>(f: F) -> TkStatus {
    catch_panic(|| report(f()))
}

fn null_argument(name: &str) -> Error {
    Error::BadParam(format!("{name} is null"))
}

unsafe fn handle_mut<'a>(handle: *mut TkHandle) -> tk_ops::Result<&'a mut Handle> {
    unsafe { handle.as_mut() }
        .map(|h| &mut h.handle)
        .ok_or_else(|| null_argument("handle"))
}

unsafe fn descriptor<'a>(
    desc: *const TkTensorDescriptor,
    name: &str,
) -> tk_ops::Result<&'a TensorDescriptor> {
    let desc = unsafe { desc.as_ref() }.ok_or_else(|| null_argument(name))?;
    desc.desc
        .as_ref()
        .ok_or_else(|| Error::BadParam(format!("{name} descriptor has not been set")))
}

unsafe fn tensor<'a>(
    desc: *const TkTensorDescriptor,
    ptr: TkDevicePtr,
    name: &str,
) -> tk_ops::Result<TensorRef<'a>> {
    let desc = unsafe { descriptor(desc, name) }?;
    Ok(TensorRef::new(desc, ptr.into()))
}

/// An operand that may be left out: a null descriptor means absent.
unsafe fn optional_tensor<'a>(
    desc: *const TkTensorDescriptor,
    ptr: TkDevicePtr,
    name: &str,
) -> tk_ops::Result<Option<TensorRef<'a>>> {
    if desc.is_null() {
        return Ok(None);
    }
    unsafe { tensor(desc, ptr, name) }.map(Some)
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Create a handle backed by the host kernels.
///
/// Profiling and workspace alignment are read from `TK_ENABLE_PROFILING`
/// and `TK_WORKSPACE_ALIGNMENT`. Free with `tk_destroy_handle`.
#[no_mangle]
pub unsafe extern "C" fn tk_create_handle(handle_out: *mut *mut TkHandle) -> TkStatus {
    call(|| {
        if handle_out.is_null() {
            return Err(null_argument("handle_out"));
        }
        let handle = Box::new(TkHandle::new());
        unsafe {
            *handle_out = Box::into_raw(handle);
        }
        Ok(())
    })
}

/// Destroy a handle and every device allocation it owns.
///
/// Passing a null pointer is a no-op.
#[no_mangle]
pub unsafe extern "C" fn tk_destroy_handle(handle: *mut TkHandle) -> TkStatus {
    if handle.is_null() {
        return TkStatus::Success;
    }
    drop(Box::from_raw(handle));
    TkStatus::Success
}

#[no_mangle]
pub unsafe extern "C" fn tk_enable_profiling(handle: *mut TkHandle, enable: bool) -> TkStatus {
    call(|| {
        unsafe { handle_mut(handle) }?.enable_profiling(enable);
        Ok(())
    })
}

/// Milliseconds spent in the kernels of the last operator call while
/// profiling was enabled.
#[no_mangle]
pub unsafe extern "C" fn tk_get_kernel_time(handle: *mut TkHandle, ms_out: *mut f32) -> TkStatus {
    call(|| {
        let handle = unsafe { handle_mut(handle) }?;
        if ms_out.is_null() {
            return Err(null_argument("ms_out"));
        }
        unsafe {
            *ms_out = handle.kernel_time();
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Tensor descriptors
// ---------------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn tk_create_tensor_descriptor(
    desc_out: *mut *mut TkTensorDescriptor,
) -> TkStatus {
    call(|| {
        if desc_out.is_null() {
            return Err(null_argument("desc_out"));
        }
        unsafe {
            *desc_out = Box::into_raw(Box::default());
        }
        Ok(())
    })
}

/// Passing a null pointer is a no-op.
#[no_mangle]
pub unsafe extern "C" fn tk_destroy_tensor_descriptor(desc: *mut TkTensorDescriptor) -> TkStatus {
    if desc.is_null() {
        return TkStatus::Success;
    }
    drop(Box::from_raw(desc));
    TkStatus::Success
}

/// Set dtype, lengths and strides (in elements) of a descriptor.
///
/// `strides` may be null for a packed row-major layout; otherwise it must
/// hold `rank` entries like `lengths`.
#[no_mangle]
pub unsafe extern "C" fn tk_set_tensor_descriptor(
    desc: *mut TkTensorDescriptor,
    dtype: TkDataType,
    rank: usize,
    lengths: *const usize,
    strides: *const usize,
) -> TkStatus {
    call(|| {
        let desc = unsafe { desc.as_mut() }.ok_or_else(|| null_argument("desc"))?;
        if lengths.is_null() {
            return Err(null_argument("lengths"));
        }
        let lengths = unsafe { std::slice::from_raw_parts(lengths, rank) };
        let built = if strides.is_null() {
            let packed = TensorDescriptor::contiguous(dtype.into(), lengths);
            packed.check_addressable()?;
            packed
        } else {
            let strides = unsafe { std::slice::from_raw_parts(strides, rank) };
            TensorDescriptor::new(dtype.into(), lengths, strides)?
        };
        desc.desc = Some(built);
        Ok(())
    })
}

/// Bytes of storage spanned by a descriptor, including stride gaps.
#[no_mangle]
pub unsafe extern "C" fn tk_get_tensor_descriptor_bytes(
    desc: *const TkTensorDescriptor,
    bytes_out: *mut usize,
) -> TkStatus {
    call(|| {
        let desc = unsafe { descriptor(desc, "desc") }?;
        if bytes_out.is_null() {
            return Err(null_argument("bytes_out"));
        }
        unsafe {
            *bytes_out = desc.byte_space();
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Device memory
// ---------------------------------------------------------------------------

/// Allocate `bytes` of zeroed device memory.
#[no_mangle]
pub unsafe extern "C" fn tk_malloc(
    handle: *mut TkHandle,
    bytes: usize,
    ptr_out: *mut TkDevicePtr,
) -> TkStatus {
    call(|| {
        let handle = unsafe { handle_mut(handle) }?;
        if ptr_out.is_null() {
            return Err(null_argument("ptr_out"));
        }
        let ptr = handle.alloc(bytes);
        unsafe {
            *ptr_out = ptr.into();
        }
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn tk_free(handle: *mut TkHandle, ptr: TkDevicePtr) -> TkStatus {
    call(|| {
        unsafe { handle_mut(handle) }?.free(ptr.into())?;
        Ok(())
    })
}

/// Copy `bytes` from host memory at `src` into device memory at `dst`.
#[no_mangle]
pub unsafe extern "C" fn tk_memcpy_host_to_device(
    handle: *mut TkHandle,
    dst: TkDevicePtr,
    src: *const c_void,
    bytes: usize,
) -> TkStatus {
    call(|| {
        let handle = unsafe { handle_mut(handle) }?;
        if src.is_null() {
            return Err(null_argument("src"));
        }
        let data = unsafe { std::slice::from_raw_parts(src as *const u8, bytes) };
        handle.write::<u8>(dst.into(), data)?;
        Ok(())
    })
}

/// Copy `bytes` from device memory at `src` into host memory at `dst`.
#[no_mangle]
pub unsafe extern "C" fn tk_memcpy_device_to_host(
    handle: *mut TkHandle,
    dst: *mut c_void,
    src: TkDevicePtr,
    bytes: usize,
) -> TkStatus {
    call(|| {
        let handle = unsafe { handle_mut(handle) }?;
        if dst.is_null() {
            return Err(null_argument("dst"));
        }
        let data = handle.read::<u8>(src.into(), bytes)?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst as *mut u8, bytes);
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// L1 loss
// ---------------------------------------------------------------------------

unsafe fn workspace_query(
    handle: *mut TkHandle,
    params: L1LossParams,
    input_desc: *const TkTensorDescriptor,
    target_desc: *const TkTensorDescriptor,
    output_desc: *const TkTensorDescriptor,
) -> usize {
    let query = || -> tk_ops::Result<usize> {
        let handle = unsafe { handle_mut(handle) }?;
        let input = unsafe { descriptor(input_desc, "input") }?;
        let target = unsafe { descriptor(target_desc, "target") }?;
        let output = unsafe { descriptor(output_desc, "output") }?;
        Ok(if params.beta == 0.0 {
            tk_ops::l1loss_forward_workspace_size(handle, params.reduction, input, target, output)
        } else {
            tk_ops::smooth_l1loss_forward_workspace_size(
                handle,
                params.reduction,
                params.beta,
                input,
                target,
                output,
            )
        })
    };
    report_size(panic::catch_unwind(AssertUnwindSafe(query)))
}

/// Workspace bytes needed by `tk_l1loss_forward`; `SIZE_MAX` if the
/// problem is rejected.
#[no_mangle]
pub unsafe extern "C" fn tk_l1loss_forward_workspace_size(
    handle: *mut TkHandle,
    reduction: TkReduction,
    input_desc: *const TkTensorDescriptor,
    target_desc: *const TkTensorDescriptor,
    output_desc: *const TkTensorDescriptor,
) -> usize {
    workspace_query(
        handle,
        L1LossParams::l1(reduction.into()),
        input_desc,
        target_desc,
        output_desc,
    )
}

#[no_mangle]
pub unsafe extern "C" fn tk_smooth_l1loss_forward_workspace_size(
    handle: *mut TkHandle,
    reduction: TkReduction,
    beta: f32,
    input_desc: *const TkTensorDescriptor,
    target_desc: *const TkTensorDescriptor,
    output_desc: *const TkTensorDescriptor,
) -> usize {
    workspace_query(
        handle,
        L1LossParams::smooth(reduction.into(), beta),
        input_desc,
        target_desc,
        output_desc,
    )
}

#[no_mangle]
pub unsafe extern "C" fn tk_l1loss_forward(
    handle: *mut TkHandle,
    reduction: TkReduction,
    workspace: TkDevicePtr,
    workspace_size: usize,
    input_desc: *const TkTensorDescriptor,
    input: TkDevicePtr,
    target_desc: *const TkTensorDescriptor,
    target: TkDevicePtr,
    output_desc: *const TkTensorDescriptor,
    output: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::l1loss_forward(
            handle_mut(handle)?,
            reduction.into(),
            workspace.into(),
            workspace_size,
            tensor(input_desc, input, "input")?,
            tensor(target_desc, target, "target")?,
            tensor(output_desc, output, "output")?,
        )
    })
}

#[no_mangle]
pub unsafe extern "C" fn tk_smooth_l1loss_forward(
    handle: *mut TkHandle,
    reduction: TkReduction,
    beta: f32,
    workspace: TkDevicePtr,
    workspace_size: usize,
    input_desc: *const TkTensorDescriptor,
    input: TkDevicePtr,
    target_desc: *const TkTensorDescriptor,
    target: TkDevicePtr,
    output_desc: *const TkTensorDescriptor,
    output: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::smooth_l1loss_forward(
            handle_mut(handle)?,
            L1LossParams::smooth(reduction.into(), beta),
            workspace.into(),
            workspace_size,
            tensor(input_desc, input, "input")?,
            tensor(target_desc, target, "target")?,
            tensor(output_desc, output, "output")?,
        )
    })
}

/// Either gradient pointer may be null; its descriptor is still required.
#[no_mangle]
pub unsafe extern "C" fn tk_l1loss_backward(
    handle: *mut TkHandle,
    reduction: TkReduction,
    input_desc: *const TkTensorDescriptor,
    input: TkDevicePtr,
    target_desc: *const TkTensorDescriptor,
    target: TkDevicePtr,
    output_grad_desc: *const TkTensorDescriptor,
    output_grad: TkDevicePtr,
    input_grad_desc: *const TkTensorDescriptor,
    input_grad: TkDevicePtr,
    target_grad_desc: *const TkTensorDescriptor,
    target_grad: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::l1loss_backward(
            handle_mut(handle)?,
            reduction.into(),
            tensor(input_desc, input, "input")?,
            tensor(target_desc, target, "target")?,
            tensor(output_grad_desc, output_grad, "output_grad")?,
            tensor(input_grad_desc, input_grad, "input_grad")?,
            tensor(target_grad_desc, target_grad, "target_grad")?,
        )
    })
}

#[no_mangle]
pub unsafe extern "C" fn tk_smooth_l1loss_backward(
    handle: *mut TkHandle,
    reduction: TkReduction,
    beta: f32,
    input_desc: *const TkTensorDescriptor,
    input: TkDevicePtr,
    target_desc: *const TkTensorDescriptor,
    target: TkDevicePtr,
    output_grad_desc: *const TkTensorDescriptor,
    output_grad: TkDevicePtr,
    input_grad_desc: *const TkTensorDescriptor,
    input_grad: TkDevicePtr,
    target_grad_desc: *const TkTensorDescriptor,
    target_grad: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::smooth_l1loss_backward(
            handle_mut(handle)?,
            L1LossParams::smooth(reduction.into(), beta),
            tensor(input_desc, input, "input")?,
            tensor(target_desc, target, "target")?,
            tensor(output_grad_desc, output_grad, "output_grad")?,
            tensor(input_grad_desc, input_grad, "input_grad")?,
            tensor(target_grad_desc, target_grad, "target_grad")?,
        )
    })
}

// ---------------------------------------------------------------------------
// GLU
// ---------------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn tk_glu_forward(
    handle: *mut TkHandle,
    dim: i64,
    input_desc: *const TkTensorDescriptor,
    input: TkDevicePtr,
    output_desc: *const TkTensorDescriptor,
    output: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::glu_forward(
            handle_mut(handle)?,
            dim,
            tensor(input_desc, input, "input")?,
            tensor(output_desc, output, "output")?,
        )
    })
}

#[no_mangle]
pub unsafe extern "C" fn tk_glu_backward(
    handle: *mut TkHandle,
    dim: i64,
    input_desc: *const TkTensorDescriptor,
    input: TkDevicePtr,
    output_grad_desc: *const TkTensorDescriptor,
    output_grad: TkDevicePtr,
    input_grad_desc: *const TkTensorDescriptor,
    input_grad: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::glu_backward(
            handle_mut(handle)?,
            dim,
            tensor(input_desc, input, "input")?,
            tensor(output_grad_desc, output_grad, "output_grad")?,
            tensor(input_grad_desc, input_grad, "input_grad")?,
        )
    })
}

// ---------------------------------------------------------------------------
// GatherV2
// ---------------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn tk_gatherv2_forward(
    handle: *mut TkHandle,
    axis: i64,
    batch_dims: i64,
    param_desc: *const TkTensorDescriptor,
    param: TkDevicePtr,
    indices_desc: *const TkTensorDescriptor,
    indices: TkDevicePtr,
    output_desc: *const TkTensorDescriptor,
    output: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::gatherv2_forward(
            handle_mut(handle)?,
            GatherParams::new(axis, batch_dims),
            tensor(param_desc, param, "param")?,
            tensor(indices_desc, indices, "indices")?,
            tensor(output_desc, output, "output")?,
        )
    })
}

/// Overwrites `param_grad`.
#[no_mangle]
pub unsafe extern "C" fn tk_gatherv2_backward(
    handle: *mut TkHandle,
    axis: i64,
    batch_dims: i64,
    output_grad_desc: *const TkTensorDescriptor,
    output_grad: TkDevicePtr,
    indices_desc: *const TkTensorDescriptor,
    indices: TkDevicePtr,
    param_grad_desc: *const TkTensorDescriptor,
    param_grad: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::gatherv2_backward(
            handle_mut(handle)?,
            GatherParams::new(axis, batch_dims),
            tensor(output_grad_desc, output_grad, "output_grad")?,
            tensor(indices_desc, indices, "indices")?,
            tensor(param_grad_desc, param_grad, "param_grad")?,
        )
    })
}

// ---------------------------------------------------------------------------
// Diagonal family
// ---------------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn tk_diag_forward(
    handle: *mut TkHandle,
    offset: i64,
    input_desc: *const TkTensorDescriptor,
    input: TkDevicePtr,
    output_desc: *const TkTensorDescriptor,
    output: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::diag_forward(
            handle_mut(handle)?,
            offset,
            tensor(input_desc, input, "input")?,
            tensor(output_desc, output, "output")?,
        )
    })
}

#[no_mangle]
pub unsafe extern "C" fn tk_diagflat_forward(
    handle: *mut TkHandle,
    offset: i64,
    input_desc: *const TkTensorDescriptor,
    input: TkDevicePtr,
    output_desc: *const TkTensorDescriptor,
    output: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::diagflat_forward(
            handle_mut(handle)?,
            offset,
            tensor(input_desc, input, "input")?,
            tensor(output_desc, output, "output")?,
        )
    })
}

#[no_mangle]
pub unsafe extern "C" fn tk_diag_embed_forward(
    handle: *mut TkHandle,
    offset: i64,
    dim1: i64,
    dim2: i64,
    input_desc: *const TkTensorDescriptor,
    input: TkDevicePtr,
    output_desc: *const TkTensorDescriptor,
    output: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::diag_embed_forward(
            handle_mut(handle)?,
            offset,
            dim1,
            dim2,
            tensor(input_desc, input, "input")?,
            tensor(output_desc, output, "output")?,
        )
    })
}

// ---------------------------------------------------------------------------
// Embedding
// ---------------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn tk_embedding_forward(
    handle: *mut TkHandle,
    input_desc: *const TkTensorDescriptor,
    input: TkDevicePtr,
    weight_desc: *const TkTensorDescriptor,
    weight: TkDevicePtr,
    output_desc: *const TkTensorDescriptor,
    output: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::embedding_forward(
            handle_mut(handle)?,
            tensor(input_desc, input, "input")?,
            tensor(weight_desc, weight, "weight")?,
            tensor(output_desc, output, "output")?,
        )
    })
}

/// `padding_idx` is only read when `has_padding_idx` is set. A null
/// `indices_freq` disables frequency scaling.
#[no_mangle]
pub unsafe extern "C" fn tk_embedding_backward(
    handle: *mut TkHandle,
    input_desc: *const TkTensorDescriptor,
    input: TkDevicePtr,
    output_grad_desc: *const TkTensorDescriptor,
    output_grad: TkDevicePtr,
    weight_grad_desc: *const TkTensorDescriptor,
    weight_grad: TkDevicePtr,
    indices_freq: TkDevicePtr,
    has_padding_idx: bool,
    padding_idx: i64,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::embedding_backward(
            handle_mut(handle)?,
            tensor(input_desc, input, "input")?,
            tensor(output_grad_desc, output_grad, "output_grad")?,
            tensor(weight_grad_desc, weight_grad, "weight_grad")?,
            indices_freq.into(),
            has_padding_idx.then_some(padding_idx),
        )
    })
}

/// `offsets_desc` and `per_sample_weights_desc` may be null to leave the
/// operand out.
#[no_mangle]
pub unsafe extern "C" fn tk_embedding_bag_forward(
    handle: *mut TkHandle,
    mode: TkEmbeddingBagMode,
    input_desc: *const TkTensorDescriptor,
    input: TkDevicePtr,
    offsets_desc: *const TkTensorDescriptor,
    offsets: TkDevicePtr,
    weight_desc: *const TkTensorDescriptor,
    weight: TkDevicePtr,
    per_sample_weights_desc: *const TkTensorDescriptor,
    per_sample_weights: TkDevicePtr,
    output_desc: *const TkTensorDescriptor,
    output: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::embedding_bag_forward(
            handle_mut(handle)?,
            mode.into(),
            tensor(input_desc, input, "input")?,
            optional_tensor(offsets_desc, offsets, "offsets")?,
            tensor(weight_desc, weight, "weight")?,
            optional_tensor(per_sample_weights_desc, per_sample_weights, "per_sample_weights")?,
            tensor(output_desc, output, "output")?,
        )
    })
}

// ---------------------------------------------------------------------------
// PReLU
// ---------------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn tk_prelu_forward(
    handle: *mut TkHandle,
    input_desc: *const TkTensorDescriptor,
    input: TkDevicePtr,
    weight_desc: *const TkTensorDescriptor,
    weight: TkDevicePtr,
    output_desc: *const TkTensorDescriptor,
    output: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::prelu_forward(
            handle_mut(handle)?,
            tensor(input_desc, input, "input")?,
            tensor(weight_desc, weight, "weight")?,
            tensor(output_desc, output, "output")?,
        )
    })
}

/// Workspace bytes needed by `tk_prelu_backward`; `SIZE_MAX` if the
/// problem is rejected.
#[no_mangle]
pub unsafe extern "C" fn tk_prelu_backward_workspace_size(
    handle: *mut TkHandle,
    input_desc: *const TkTensorDescriptor,
    weight_desc: *const TkTensorDescriptor,
    output_grad_desc: *const TkTensorDescriptor,
    input_grad_desc: *const TkTensorDescriptor,
    weight_grad_desc: *const TkTensorDescriptor,
) -> usize {
    let query = || -> tk_ops::Result<usize> {
        let handle = unsafe { handle_mut(handle) }?;
        Ok(tk_ops::prelu_backward_workspace_size(
            handle,
            unsafe { descriptor(input_desc, "input") }?,
            unsafe { descriptor(weight_desc, "weight") }?,
            unsafe { descriptor(output_grad_desc, "output_grad") }?,
            unsafe { descriptor(input_grad_desc, "input_grad") }?,
            unsafe { descriptor(weight_grad_desc, "weight_grad") }?,
        ))
    };
    report_size(panic::catch_unwind(AssertUnwindSafe(query)))
}

/// Either gradient pointer may be null; its descriptor is still required.
#[no_mangle]
pub unsafe extern "C" fn tk_prelu_backward(
    handle: *mut TkHandle,
    workspace: TkDevicePtr,
    workspace_size: usize,
    input_desc: *const TkTensorDescriptor,
    input: TkDevicePtr,
    weight_desc: *const TkTensorDescriptor,
    weight: TkDevicePtr,
    output_grad_desc: *const TkTensorDescriptor,
    output_grad: TkDevicePtr,
    input_grad_desc: *const TkTensorDescriptor,
    input_grad: TkDevicePtr,
    weight_grad_desc: *const TkTensorDescriptor,
    weight_grad: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::prelu_backward(
            handle_mut(handle)?,
            workspace.into(),
            workspace_size,
            tensor(input_desc, input, "input")?,
            tensor(weight_desc, weight, "weight")?,
            tensor(output_grad_desc, output_grad, "output_grad")?,
            tensor(input_grad_desc, input_grad, "input_grad")?,
            tensor(weight_grad_desc, weight_grad, "weight_grad")?,
        )
    })
}

// ---------------------------------------------------------------------------
// Where
// ---------------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn tk_where_forward(
    handle: *mut TkHandle,
    condition_desc: *const TkTensorDescriptor,
    condition: TkDevicePtr,
    input_desc: *const TkTensorDescriptor,
    input: TkDevicePtr,
    other_desc: *const TkTensorDescriptor,
    other: TkDevicePtr,
    output_desc: *const TkTensorDescriptor,
    output: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::where_forward(
            handle_mut(handle)?,
            tensor(condition_desc, condition, "condition")?,
            tensor(input_desc, input, "input")?,
            tensor(other_desc, other, "other")?,
            tensor(output_desc, output, "output")?,
        )
    })
}

/// Either gradient pointer may be null; its descriptor is still required.
#[no_mangle]
pub unsafe extern "C" fn tk_where_backward(
    handle: *mut TkHandle,
    condition_desc: *const TkTensorDescriptor,
    condition: TkDevicePtr,
    output_grad_desc: *const TkTensorDescriptor,
    output_grad: TkDevicePtr,
    input_grad_desc: *const TkTensorDescriptor,
    input_grad: TkDevicePtr,
    other_grad_desc: *const TkTensorDescriptor,
    other_grad: TkDevicePtr,
) -> TkStatus {
    call(|| unsafe {
        tk_ops::where_backward(
            handle_mut(handle)?,
            tensor(condition_desc, condition, "condition")?,
            tensor(output_grad_desc, output_grad, "output_grad")?,
            tensor(input_grad_desc, input_grad, "input_grad")?,
            tensor(other_grad_desc, other_grad, "other_grad")?,
        )
    })
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Take the message of the last failed call on this thread, or null.
///
/// The returned string must be released with `tk_free_string`.
#[no_mangle]
pub extern "C" fn tk_last_error() -> *const c_char {
    match error::take_message() {
        Some(e) => e.into_raw(),
        None => std::ptr::null(),
    }
}

/// Free a string previously returned by `tk_last_error`.
#[no_mangle]
pub unsafe extern "C" fn tk_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::ptr;

    struct Fixture {
        handle: *mut TkHandle,
        descs: Vec<*mut TkTensorDescriptor>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut handle = ptr::null_mut();
            assert_eq!(unsafe { tk_create_handle(&mut handle) }, TkStatus::Success);
            Fixture {
                handle,
                descs: Vec::new(),
            }
        }

        fn desc(&mut self, dtype: TkDataType, lengths: &[usize]) -> *mut TkTensorDescriptor {
            let mut desc = ptr::null_mut();
            unsafe {
                assert_eq!(tk_create_tensor_descriptor(&mut desc), TkStatus::Success);
                assert_eq!(
                    tk_set_tensor_descriptor(desc, dtype, lengths.len(), lengths.as_ptr(), ptr::null()),
                    TkStatus::Success
                );
            }
            self.descs.push(desc);
            desc
        }

        fn upload_f32(&mut self, data: &[f32]) -> TkDevicePtr {
            let bytes = std::mem::size_of_val(data);
            let mut dptr = TkDevicePtr::NULL;
            unsafe {
                assert_eq!(tk_malloc(self.handle, bytes, &mut dptr), TkStatus::Success);
                assert_eq!(
                    tk_memcpy_host_to_device(self.handle, dptr, data.as_ptr() as *const c_void, bytes),
                    TkStatus::Success
                );
            }
            dptr
        }

        fn download_f32(&self, src: TkDevicePtr, len: usize) -> Vec<f32> {
            let mut out = vec![0f32; len];
            let status = unsafe {
                tk_memcpy_device_to_host(
                    self.handle,
                    out.as_mut_ptr() as *mut c_void,
                    src,
                    len * std::mem::size_of::<f32>(),
                )
            };
            assert_eq!(status, TkStatus::Success);
            out
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            unsafe {
                for &desc in &self.descs {
                    tk_destroy_tensor_descriptor(desc);
                }
                tk_destroy_handle(self.handle);
            }
        }
    }

    fn last_error() -> Option<String> {
        let msg = tk_last_error();
        if msg.is_null() {
            return None;
        }
        let text = unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned();
        unsafe { tk_free_string(msg as *mut c_char) };
        Some(text)
    }

    #[test]
    fn test_null_handle_sets_last_error() {
        let mut dptr = TkDevicePtr::NULL;
        let status = unsafe { tk_malloc(ptr::null_mut(), 16, &mut dptr) };
        assert_eq!(status, TkStatus::BadParam);
        assert_eq!(last_error().as_deref(), Some("bad parameter: handle is null"));
        // the slot is consumed by the first read
        assert!(last_error().is_none());
    }

    #[test]
    fn test_destroy_null_is_noop() {
        unsafe {
            assert_eq!(tk_destroy_handle(ptr::null_mut()), TkStatus::Success);
            assert_eq!(tk_destroy_tensor_descriptor(ptr::null_mut()), TkStatus::Success);
        }
    }

    #[test]
    fn test_unset_descriptor_rejected() {
        let mut fx = Fixture::new();
        let mut unset = ptr::null_mut();
        unsafe { tk_create_tensor_descriptor(&mut unset) };
        fx.descs.push(unset);
        let x = fx.desc(TkDataType::Float, &[4]);
        let status = unsafe {
            tk_glu_forward(fx.handle, 0, x, TkDevicePtr::NULL, unset, TkDevicePtr::NULL)
        };
        assert_eq!(status, TkStatus::BadParam);
        assert!(last_error().is_some_and(|m| m.contains("has not been set")));
    }

    #[test]
    fn test_glu_forward_roundtrip() {
        let mut fx = Fixture::new();
        let x_desc = fx.desc(TkDataType::Float, &[2, 2]);
        let y_desc = fx.desc(TkDataType::Float, &[1, 2]);
        let x = fx.upload_f32(&[1.0, -2.0, 0.0, 100.0]);
        let y = fx.upload_f32(&[0.0, 0.0]);
        let status = unsafe { tk_glu_forward(fx.handle, 0, x_desc, x, y_desc, y) };
        assert_eq!(status, TkStatus::Success);
        let out = fx.download_f32(y, 2);
        approx::assert_relative_eq!(out[0], 0.5, epsilon = 1e-6);
        approx::assert_relative_eq!(out[1], -2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_l1loss_through_workspace_query() {
        let mut fx = Fixture::new();
        let x_desc = fx.desc(TkDataType::Float, &[3]);
        let o_desc = fx.desc(TkDataType::Float, &[1]);
        let x = fx.upload_f32(&[1.0, 2.0, 3.0]);
        let t = fx.upload_f32(&[0.0, 4.0, 3.5]);
        let o = fx.upload_f32(&[0.0]);
        unsafe {
            let ws_size =
                tk_l1loss_forward_workspace_size(fx.handle, TkReduction::Mean, x_desc, x_desc, o_desc);
            assert!(ws_size > 0 && ws_size != usize::MAX);
            let mut ws = TkDevicePtr::NULL;
            assert_eq!(tk_malloc(fx.handle, ws_size, &mut ws), TkStatus::Success);
            let status = tk_l1loss_forward(
                fx.handle,
                TkReduction::Mean,
                ws,
                ws_size,
                x_desc,
                x,
                x_desc,
                t,
                o_desc,
                o,
            );
            assert_eq!(status, TkStatus::Success);
        }
        approx::assert_relative_eq!(fx.download_f32(o, 1)[0], 3.5 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_workspace_query_sentinel() {
        let mut fx = Fixture::new();
        let x_desc = fx.desc(TkDataType::Float, &[3]);
        let bad_out = fx.desc(TkDataType::Float, &[2]);
        let size = unsafe {
            tk_smooth_l1loss_forward_workspace_size(
                fx.handle,
                TkReduction::Sum,
                1.0,
                x_desc,
                x_desc,
                bad_out,
            )
        };
        assert_eq!(size, usize::MAX);
    }

    #[test]
    fn test_profiling_reports_kernel_time() {
        let mut fx = Fixture::new();
        let d = fx.desc(TkDataType::Float, &[4]);
        let x = fx.upload_f32(&[1.0, 2.0, 3.0, 4.0]);
        let o = fx.upload_f32(&[0.0; 16]);
        let o_desc = fx.desc(TkDataType::Float, &[4, 4]);
        let mut ms = -1.0f32;
        unsafe {
            assert_eq!(tk_enable_profiling(fx.handle, true), TkStatus::Success);
            assert_eq!(tk_diag_forward(fx.handle, 0, d, x, o_desc, o), TkStatus::Success);
            assert_eq!(tk_get_kernel_time(fx.handle, &mut ms), TkStatus::Success);
        }
        assert!(ms >= 0.0);
        let out = fx.download_f32(o, 16);
        for r in 0..4 {
            for c in 0..4 {
                let expected = if r == c { (r + 1) as f32 } else { 0.0 };
                assert_eq!(out[r * 4 + c], expected);
            }
        }
    }

    #[test]
    fn test_strided_descriptor_and_bytes() {
        let mut fx = Fixture::new();
        let mut desc = ptr::null_mut();
        let lengths = [2usize, 3];
        let strides = [1usize, 4];
        let mut bytes = 0usize;
        unsafe {
            tk_create_tensor_descriptor(&mut desc);
            fx.descs.push(desc);
            assert_eq!(
                tk_set_tensor_descriptor(desc, TkDataType::Half, 2, lengths.as_ptr(), strides.as_ptr()),
                TkStatus::Success
            );
            assert_eq!(tk_get_tensor_descriptor_bytes(desc, &mut bytes), TkStatus::Success);
        }
        // last element sits at 1 * 1 + 2 * 4 = 9
        assert_eq!(bytes, 10 * 2);
    }

    #[test]
    fn test_oversized_descriptor_rejected() {
        let mut fx = Fixture::new();
        let mut desc = ptr::null_mut();
        let lengths = [usize::MAX / 2, 4];
        let mut bytes = 0usize;
        unsafe {
            tk_create_tensor_descriptor(&mut desc);
            fx.descs.push(desc);
            let status = tk_set_tensor_descriptor(desc, TkDataType::Float, 2, lengths.as_ptr(), ptr::null());
            assert_eq!(status, TkStatus::BadParam);
            assert!(last_error().is_some_and(|m| m.contains("too large")));
            // the descriptor stays unset
            assert_eq!(tk_get_tensor_descriptor_bytes(desc, &mut bytes), TkStatus::BadParam);
        }
    }

    #[test]
    fn test_embedding_bag_with_offsets() {
        let mut fx = Fixture::new();
        let idx_desc = fx.desc(TkDataType::Int64, &[4]);
        let off_desc = fx.desc(TkDataType::Int64, &[2]);
        let w_desc = fx.desc(TkDataType::Float, &[3, 2]);
        let out_desc = fx.desc(TkDataType::Float, &[2, 2]);
        let idx: [i64; 4] = [0, 2, 1, 1];
        let offsets: [i64; 2] = [0, 1];
        let mut idx_ptr = TkDevicePtr::NULL;
        let mut off_ptr = TkDevicePtr::NULL;
        unsafe {
            assert_eq!(tk_malloc(fx.handle, 32, &mut idx_ptr), TkStatus::Success);
            assert_eq!(tk_malloc(fx.handle, 16, &mut off_ptr), TkStatus::Success);
            tk_memcpy_host_to_device(fx.handle, idx_ptr, idx.as_ptr() as *const c_void, 32);
            tk_memcpy_host_to_device(fx.handle, off_ptr, offsets.as_ptr() as *const c_void, 16);
        }
        let w = fx.upload_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let out = fx.upload_f32(&[0.0; 4]);
        let status = unsafe {
            tk_embedding_bag_forward(
                fx.handle,
                TkEmbeddingBagMode::Max,
                idx_desc,
                idx_ptr,
                off_desc,
                off_ptr,
                w_desc,
                w,
                ptr::null(),
                TkDevicePtr::NULL,
                out_desc,
                out,
            )
        };
        assert_eq!(status, TkStatus::Success);
        assert_eq!(fx.download_f32(out, 4), vec![1.0, 2.0, 5.0, 6.0]);
    }

    #[test]
    fn test_prelu_backward_shared_weight() {
        let mut fx = Fixture::new();
        let x_desc = fx.desc(TkDataType::Float, &[2, 2]);
        let w_desc = fx.desc(TkDataType::Float, &[1]);
        let x = fx.upload_f32(&[1.0, -2.0, -1.0, 3.0]);
        let w = fx.upload_f32(&[0.5]);
        let g = fx.upload_f32(&[1.0, 1.0, 2.0, 1.0]);
        let dx = fx.upload_f32(&[0.0; 4]);
        let dw = fx.upload_f32(&[0.0]);
        unsafe {
            let ws_size =
                tk_prelu_backward_workspace_size(fx.handle, x_desc, w_desc, x_desc, x_desc, w_desc);
            assert!(ws_size > 0 && ws_size != usize::MAX);
            let mut ws = TkDevicePtr::NULL;
            assert_eq!(tk_malloc(fx.handle, ws_size, &mut ws), TkStatus::Success);
            let status = tk_prelu_backward(
                fx.handle, ws, ws_size, x_desc, x, w_desc, w, x_desc, g, x_desc, dx, w_desc, dw,
            );
            assert_eq!(status, TkStatus::Success);
        }
        assert_eq!(fx.download_f32(dx, 4), vec![1.0, 0.5, 1.0, 1.0]);
        // -2 * 1 + -1 * 2
        assert_eq!(fx.download_f32(dw, 1), vec![-4.0]);
    }

    #[test]
    fn test_prelu_forward_rejects_bad_weight() {
        let mut fx = Fixture::new();
        let x_desc = fx.desc(TkDataType::Float, &[2, 3]);
        let w_desc = fx.desc(TkDataType::Float, &[2]);
        let x = fx.upload_f32(&[0.0; 6]);
        let w = fx.upload_f32(&[0.0; 2]);
        let status = unsafe { tk_prelu_forward(fx.handle, x_desc, x, w_desc, w, x_desc, x) };
        assert_eq!(status, TkStatus::BadParam);
        assert!(last_error().is_some_and(|m| m.contains("slopes")));
    }

    #[test]
    fn test_freed_pointer_is_internal_error() {
        let mut fx = Fixture::new();
        let x = fx.upload_f32(&[1.0]);
        unsafe {
            assert_eq!(tk_free(fx.handle, x), TkStatus::Success);
            assert_eq!(tk_free(fx.handle, x), TkStatus::InternalError);
        }
    }
}
