//! Lightweight wrapper for tensor shapes and dimension bookkeeping.

use crate::error::{PoolError, PoolResult};

/// Stores the logical dimensions of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Constructs a new shape from the provided dimensions.
    ///
    /// Panics if `dims` is empty; use [`Shape::try_new`] for untrusted input.
    pub fn new<D: Into<Vec<usize>>>(dims: D) -> Self {
        let dims = dims.into();
        assert!(!dims.is_empty(), "shape must have at least one dimension");
        Shape { dims }
    }

    pub fn try_new<D: Into<Vec<usize>>>(dims: D) -> PoolResult<Self> {
        let dims = dims.into();
        if dims.is_empty() {
            return Err(PoolError::shape("shape must have at least one dimension"));
        }
        Ok(Shape { dims })
    }

    /// Borrow the raw dimension slice for downstream calculations.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the rank (number of axes) of the shape.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Computes the total number of elements implied by the shape.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims.to_vec())
    }
}
