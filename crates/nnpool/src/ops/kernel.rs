//! The seam between operator dispatch and backend kernels.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{PoolError, PoolResult};
use crate::tensor::{DType, Shape, Tensor};

use super::geometry::PoolGeometry;
use super::schema::{PoolKind, PoolOpType};

/// Values (and, for max pooling, optional argmax indices) produced by one pooling call.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolOutputs {
    pub values: Tensor,
    /// `i64` flat input offsets, present only when indices were requested.
    pub indices: Option<Tensor>,
}

impl PoolOutputs {
    /// Zero-element outputs for calls whose output shape contains a zero extent.
    pub fn empty(geometry: &PoolGeometry, dtype: DType, want_indices: bool) -> PoolResult<Self> {
        let shape = Shape::try_new(geometry.output_dims())?;
        Ok(PoolOutputs {
            values: Tensor::zeros(shape.clone(), dtype),
            indices: want_indices.then(|| Tensor::zeros(shape, DType::I64)),
        })
    }
}

/// Everything a kernel needs to run one pooling call.
#[derive(Debug, Clone, Copy)]
pub struct PoolContext<'a> {
    pub op_type: PoolOpType,
    pub kind: PoolKind,
    pub input: &'a Tensor,
    pub geometry: &'a PoolGeometry,
    pub want_indices: bool,
}

impl PoolContext<'_> {
    pub fn dtype(&self) -> DType {
        self.input.dtype()
    }

    /// Validates that the input tensor matches the geometry it was resolved against.
    pub fn check_input(&self) -> PoolResult<()> {
        let dims = self.input.dims();
        let expected_len = self.geometry.total_channels() * self.geometry.x_step();
        if dims.len() != self.geometry.spatial_rank() + 2 || self.input.len() != expected_len {
            return Err(PoolError::shape(format!(
                "input shape {dims:?} does not match resolved pooling geometry"
            )));
        }
        Ok(())
    }

    /// Stable hash of everything that can change which kernel is fastest.
    pub fn cache_key(&self) -> PoolCacheKey {
        let mut hasher = DefaultHasher::new();
        self.op_type.hash(&mut hasher);
        self.kind.hash(&mut hasher);
        self.dtype().tag().hash(&mut hasher);
        self.input.dims().hash(&mut hasher);
        self.geometry.hash(&mut hasher);
        self.want_indices.hash(&mut hasher);
        PoolCacheKey(hasher.finish())
    }
}

/// Key used by benchmark mode to memoize the fastest kernel for a call signature.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PoolCacheKey(u64);

/// A concrete pooling implementation provided by a backend.
pub trait PoolKernel: Send + Sync + 'static {
    /// Human-readable name, used in logs, profiling scopes and `force=` overrides.
    fn name(&self) -> &'static str;

    /// Reports whether the kernel can run the provided call.
    fn supports(&self, ctx: &PoolContext<'_>) -> bool;

    fn compute(&self, ctx: &PoolContext<'_>) -> PoolResult<PoolOutputs>;
}
