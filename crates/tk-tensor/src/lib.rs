//! `tk-tensor` - Tensor data model shared by every tensor-kernels operator.
//!
//! This crate provides:
//! - Data type tags (`DType`) and the `Element` scalar trait (F32, F16, BF16, ...)
//! - Shape utilities and broadcasting
//! - `TensorDescriptor`: lengths, strides, and dtype of a (possibly strided) tensor
//! - `TensorView<N>`: rank-bounded index/offset mapping used by kernel bodies

pub mod descriptor;
pub mod dtype;
pub mod element;
pub mod error;
pub mod shape;
pub mod view;

// Re-export primary types at the crate root for convenience.
pub use descriptor::{TensorDescriptor, MAX_RANK};
pub use dtype::DType;
pub use element::Element;
pub use error::{Result, TensorError};
pub use shape::Shape;
pub use view::{TensorView, TensorView5};
