use tk_runtime::Handle;
use tk_tensor::TensorDescriptor;

/// Opaque handle owning device memory, the stream and the invoker cache.
pub struct TkHandle {
    pub handle: Handle,
}

impl Default for TkHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TkHandle {
    pub fn new() -> Self {
        Self {
            handle: tk_ops::create_handle(),
        }
    }
}

/// Opaque tensor descriptor. Unusable until `tk_set_tensor_descriptor`
/// has been called on it.
#[derive(Default)]
pub struct TkTensorDescriptor {
    pub desc: Option<TensorDescriptor>,
}
