//! Element traits the generic pooling kernels are written against.

use super::{DType, TensorData};

/// Scalar types a max-pool kernel can reduce.
pub trait PoolElement: Copy + Send + Sync + PartialOrd + std::fmt::Debug + 'static {
    const DTYPE: DType;

    /// Smallest representable value; the identity for max reduction.
    fn lowest() -> Self;
    fn zero() -> Self;
    fn slice(data: &TensorData) -> Option<&[Self]>;
    fn wrap(values: Vec<Self>) -> TensorData;
}

/// Floating point elements, needed by averaging and Lp-norm reductions.
pub trait FloatElement: PoolElement {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_pool_element {
    ($ty:ty, $dtype:ident, $variant:ident, $lowest:expr, $zero:expr) => {
        impl PoolElement for $ty {
            const DTYPE: DType = DType::$dtype;

            #[inline]
            fn lowest() -> Self {
                $lowest
            }

            #[inline]
            fn zero() -> Self {
                $zero
            }

            fn slice(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(values) => Some(values.as_slice()),
                    _ => None,
                }
            }

            fn wrap(values: Vec<Self>) -> TensorData {
                TensorData::$variant(values)
            }
        }
    };
}

impl_pool_element!(f32, F32, F32, f32::MIN, 0.0);
impl_pool_element!(f64, F64, F64, f64::MIN, 0.0);
impl_pool_element!(i8, I8, I8, i8::MIN, 0);
impl_pool_element!(u8, U8, U8, u8::MIN, 0);
impl_pool_element!(i64, I64, I64, i64::MIN, 0);

impl FloatElement for f32 {
    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl FloatElement for f64 {
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}
