//! Pooling operators: attribute resolution, geometry, versioned schemas and kernel dispatch.
//!
//! The flow for one call is
//! `NodeAttributes -> PoolAttributes (per schema version) -> PoolGeometry (per input shape)
//! -> PoolContext -> KernelRegistry -> PoolKernel`. Only the last step touches tensor data.

pub mod attrs;
pub mod geometry;
pub mod kernel;
pub mod operator;
pub mod registry;
pub mod schema;

pub use attrs::{AttributeValue, AutoPad, NodeAttributes, PoolAttributes};
pub use geometry::{PoolGeometry, SpatialDims, MAX_SPATIAL_RANK};
pub use kernel::{PoolCacheKey, PoolContext, PoolKernel, PoolOutputs};
pub use operator::PoolOperator;
pub use registry::{
    build_registry, KernelKey, KernelOverrides, KernelPolicy, KernelPolicySetting,
    KernelRegistry, KernelRegistryHandle,
};
pub use schema::{lookup_schema, schemas, OpSchema, PoolKind, PoolOpType, StorageOrder};
