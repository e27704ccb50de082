//! Enumerates the scalar element types pooling kernels accept.

use serde::{Deserialize, Serialize};

/// Logical dtype identifier shared between host tensors and kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 64-bit floating point.
    F64,
    /// 8-bit signed integer, used by quantized max pooling.
    I8,
    /// 8-bit unsigned integer, used by quantized max pooling.
    U8,
    /// 64-bit signed integer, the element type of max-pool index outputs.
    I64,
}

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F64 | DType::I64 => 8,
            DType::I8 | DType::U8 => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I8 => "i8",
            DType::U8 => "u8",
            DType::I64 => "i64",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    /// Produces a stable tag used when hashing cache keys.
    pub fn tag(self) -> u32 {
        match self {
            DType::F32 => 0,
            DType::F64 => 1,
            DType::I8 => 2,
            DType::U8 => 3,
            DType::I64 => 4,
        }
    }

    /// Parses the lowercase names produced by [`DType::name`].
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "f32" | "float" | "float32" => Some(DType::F32),
            "f64" | "double" | "float64" => Some(DType::F64),
            "i8" | "int8" => Some(DType::I8),
            "u8" | "uint8" => Some(DType::U8),
            "i64" | "int64" => Some(DType::I64),
            _ => None,
        }
    }
}
