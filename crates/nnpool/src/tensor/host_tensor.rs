//! Host-backed tensor used as operator input and output.

use super::{dtype::DType, element::PoolElement, shape::Shape};
use crate::error::{PoolError, PoolResult};

/// Typed payload of a [`Tensor`], one variant per supported dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    U8(Vec<u8>),
    I64(Vec<i64>),
}

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
            TensorData::F64(_) => DType::F64,
            TensorData::I8(_) => DType::I8,
            TensorData::U8(_) => DType::U8,
            TensorData::I64(_) => DType::I64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(values) => values.len(),
            TensorData::F64(values) => values.len(),
            TensorData::I8(values) => values.len(),
            TensorData::U8(values) => values.len(),
            TensorData::I64(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a zero-filled payload of `len` elements.
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F32 => TensorData::F32(vec![0.0; len]),
            DType::F64 => TensorData::F64(vec![0.0; len]),
            DType::I8 => TensorData::I8(vec![0; len]),
            DType::U8 => TensorData::U8(vec![0; len]),
            DType::I64 => TensorData::I64(vec![0; len]),
        }
    }
}

/// Simple host tensor: a shape plus a typed, row-major payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    data: TensorData,
}

impl Tensor {
    /// Wraps an existing payload, validating its length against the shape.
    pub fn new(shape: Shape, data: TensorData) -> PoolResult<Self> {
        if data.len() != shape.num_elements() {
            return Err(PoolError::shape(format!(
                "tensor data length ({}) does not match shape {:?}",
                data.len(),
                shape.dims()
            )));
        }
        Ok(Tensor { shape, data })
    }

    pub fn from_vec<T: PoolElement>(shape: Shape, data: Vec<T>) -> PoolResult<Self> {
        Tensor::new(shape, T::wrap(data))
    }

    pub fn from_f32(shape: Shape, data: Vec<f32>) -> PoolResult<Self> {
        Tensor::from_vec(shape, data)
    }

    pub fn from_f64(shape: Shape, data: Vec<f64>) -> PoolResult<Self> {
        Tensor::from_vec(shape, data)
    }

    pub fn from_i8(shape: Shape, data: Vec<i8>) -> PoolResult<Self> {
        Tensor::from_vec(shape, data)
    }

    pub fn from_u8(shape: Shape, data: Vec<u8>) -> PoolResult<Self> {
        Tensor::from_vec(shape, data)
    }

    pub fn from_i64(shape: Shape, data: Vec<i64>) -> PoolResult<Self> {
        Tensor::from_vec(shape, data)
    }

    /// Returns a zero-initialized tensor of the requested shape and dtype.
    pub fn zeros(shape: Shape, dtype: DType) -> Self {
        let len = shape.num_elements();
        Tensor {
            shape,
            data: TensorData::zeros(dtype, len),
        }
    }

    /// Returns the total number of elements stored in the tensor.
    pub fn len(&self) -> usize {
        self.shape.num_elements()
    }

    /// Reports whether the tensor contains zero elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    /// Borrows the payload as `T`, failing when the dtype differs.
    pub fn as_slice<T: PoolElement>(&self) -> PoolResult<&[T]> {
        T::slice(&self.data).ok_or(PoolError::UnsupportedType {
            op: "Tensor::as_slice",
            dtype: self.dtype(),
        })
    }

    /// Convenience accessor for `f32` payloads.
    pub fn to_f32_vec(&self) -> PoolResult<Vec<f32>> {
        Ok(self.as_slice::<f32>()?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_rejects_length_mismatch() {
        let err = Tensor::from_f32(Shape::new([1, 1, 3]), vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, PoolError::ShapeMismatch(_)), "{err}");
    }

    #[test]
    fn as_slice_checks_dtype() {
        let tensor = Tensor::from_u8(Shape::new([1, 1, 2]), vec![3, 4]).unwrap();
        assert_eq!(tensor.as_slice::<u8>().unwrap(), &[3, 4]);
        assert!(matches!(
            tensor.as_slice::<f32>(),
            Err(PoolError::UnsupportedType { dtype: DType::U8, .. })
        ));
    }
}
