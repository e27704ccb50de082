//! Operator identities and the versioned schema table used for kernel dispatch.
//!
//! Each [`OpSchema`] row covers a contiguous version range over which the operator's semantics
//! (accepted element types, optional index output, supported attributes) stay fixed. Rows are
//! only split where pooling behaviour actually changes.

use std::fmt;

use crate::error::{PoolError, PoolResult};
use crate::tensor::DType;

use super::registry::KernelKey;

/// ONNX pooling operator names handled by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolOpType {
    MaxPool,
    AveragePool,
    LpPool,
    GlobalMaxPool,
    GlobalAveragePool,
    GlobalLpPool,
}

impl PoolOpType {
    pub const ALL: [PoolOpType; 6] = [
        PoolOpType::MaxPool,
        PoolOpType::AveragePool,
        PoolOpType::LpPool,
        PoolOpType::GlobalMaxPool,
        PoolOpType::GlobalAveragePool,
        PoolOpType::GlobalLpPool,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        PoolOpType::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn name(self) -> &'static str {
        match self {
            PoolOpType::MaxPool => "MaxPool",
            PoolOpType::AveragePool => "AveragePool",
            PoolOpType::LpPool => "LpPool",
            PoolOpType::GlobalMaxPool => "GlobalMaxPool",
            PoolOpType::GlobalAveragePool => "GlobalAveragePool",
            PoolOpType::GlobalLpPool => "GlobalLpPool",
        }
    }

    pub fn is_global(self) -> bool {
        matches!(
            self,
            PoolOpType::GlobalMaxPool | PoolOpType::GlobalAveragePool | PoolOpType::GlobalLpPool
        )
    }

    /// Registry key shared by the windowed and global variant of a reduction.
    pub fn kernel_key(self) -> KernelKey {
        match self {
            PoolOpType::MaxPool | PoolOpType::GlobalMaxPool => KernelKey::MAX_POOL,
            PoolOpType::AveragePool | PoolOpType::GlobalAveragePool => KernelKey::AVERAGE_POOL,
            PoolOpType::LpPool | PoolOpType::GlobalLpPool => KernelKey::LP_POOL,
        }
    }
}

impl fmt::Display for PoolOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Memory order used when flattening the argmax position of a max-pool window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageOrder {
    #[default]
    RowMajor,
    ColumnMajor,
}

/// Reduction applied to each window, carrying its kind-specific parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Max { storage_order: StorageOrder },
    Average { count_include_pad: bool },
    Lp { p: u32 },
}

impl PoolKind {
    pub fn label(self) -> &'static str {
        match self {
            PoolKind::Max { .. } => "max",
            PoolKind::Average {
                count_include_pad: true,
            } => "average_include_pad",
            PoolKind::Average {
                count_include_pad: false,
            } => "average_exclude_pad",
            PoolKind::Lp { .. } => "lp",
        }
    }
}

/// Fixed semantics of one operator over a version range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSchema {
    pub op_type: PoolOpType,
    pub since_version: u32,
    /// Inclusive upper bound; `None` means the row is still current.
    pub end_version: Option<u32>,
    pub dtypes: &'static [DType],
    /// 2 when the optional argmax output may be requested.
    pub max_outputs: usize,
    pub dilations: bool,
    pub ceil_mode: bool,
    pub storage_order: bool,
}

impl OpSchema {
    pub fn covers(&self, version: u32) -> bool {
        version >= self.since_version && self.end_version.is_none_or(|end| version <= end)
    }

    pub fn supports_dtype(&self, dtype: DType) -> bool {
        self.dtypes.contains(&dtype)
    }

    pub fn emits_indices(&self) -> bool {
        self.max_outputs > 1
    }
}

const F32_ONLY: &[DType] = &[DType::F32];
const MAX_POOL_8: &[DType] = &[DType::F32, DType::F64];
const MAX_POOL_12: &[DType] = &[DType::F32, DType::F64, DType::I8, DType::U8];

#[allow(clippy::too_many_arguments)]
const fn row(
    op_type: PoolOpType,
    since_version: u32,
    end_version: Option<u32>,
    dtypes: &'static [DType],
    max_outputs: usize,
    dilations: bool,
    ceil_mode: bool,
    storage_order: bool,
) -> OpSchema {
    OpSchema {
        op_type,
        since_version,
        end_version,
        dtypes,
        max_outputs,
        dilations,
        ceil_mode,
        storage_order,
    }
}

use PoolOpType::*;

static SCHEMAS: &[OpSchema] = &[
    row(MaxPool, 1, Some(7), F32_ONLY, 1, false, false, false),
    row(MaxPool, 8, Some(9), MAX_POOL_8, 2, false, false, true),
    row(MaxPool, 10, Some(11), MAX_POOL_8, 2, true, true, true),
    row(MaxPool, 12, None, MAX_POOL_12, 2, true, true, true),
    row(AveragePool, 7, Some(9), F32_ONLY, 1, false, false, false),
    row(AveragePool, 10, Some(18), F32_ONLY, 1, false, true, false),
    row(AveragePool, 19, None, F32_ONLY, 1, true, true, false),
    row(LpPool, 2, Some(17), F32_ONLY, 1, false, false, false),
    row(LpPool, 18, None, F32_ONLY, 1, true, true, false),
    row(GlobalMaxPool, 1, None, F32_ONLY, 1, false, false, false),
    row(GlobalAveragePool, 1, None, F32_ONLY, 1, false, false, false),
    row(GlobalLpPool, 2, None, F32_ONLY, 1, false, false, false),
];

/// Every registered schema row, in table order.
pub fn schemas() -> &'static [OpSchema] {
    SCHEMAS
}

/// Finds the row covering `version` for `op_type`.
pub fn lookup_schema(op_type: PoolOpType, version: u32) -> PoolResult<&'static OpSchema> {
    SCHEMAS
        .iter()
        .find(|schema| schema.op_type == op_type && schema.covers(version))
        .ok_or_else(|| PoolError::NoSchema {
            op: op_type.name().to_string(),
            version,
        })
}

/// First version of `op_type` whose schema enables the feature selected by `feature`.
pub(crate) fn first_version_with(
    op_type: PoolOpType,
    feature: impl Fn(&OpSchema) -> bool,
) -> Option<u32> {
    SCHEMAS
        .iter()
        .filter(|schema| schema.op_type == op_type && feature(schema))
        .map(|schema| schema.since_version)
        .min()
}
