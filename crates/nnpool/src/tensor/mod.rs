//! Host tensors consumed and produced by pooling operators.

mod dtype;
mod element;
mod host_tensor;
mod shape;

pub use dtype::DType;
pub use element::{FloatElement, PoolElement};
pub use host_tensor::{Tensor, TensorData};
pub use shape::Shape;
