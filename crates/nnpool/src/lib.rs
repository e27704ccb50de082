//! Pooling operators (max, average, Lp) over N-dimensional `[N, C, spatial...]` tensors.
//!
//! The crate owns everything except the arithmetic: attribute resolution, output-size
//! computation, the versioned operator schema table, and the registry that picks a concrete
//! [`ops::PoolKernel`] for each call. Backends such as `nnpool-backend-ref-cpu` register the
//! kernels that do the actual window reductions.

pub mod config;
mod env;
pub mod error;
pub mod ops;
pub mod profiling;
pub mod tensor;

pub use config::{ParallelConfig, RuntimeConfig};
pub use error::{PoolError, PoolResult};
pub use ops::{
    AutoPad, KernelRegistry, NodeAttributes, PoolAttributes, PoolGeometry, PoolKind, PoolOpType,
    PoolOperator, PoolOutputs,
};
pub use tensor::{DType, Shape, Tensor};
