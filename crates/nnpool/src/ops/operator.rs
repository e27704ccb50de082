//! Versioned pooling operator instances.

use crate::error::{PoolError, PoolResult};
use crate::tensor::Tensor;

use super::attrs::{NodeAttributes, PoolAttributes};
use super::geometry::PoolGeometry;
use super::kernel::{PoolContext, PoolOutputs};
use super::registry::KernelRegistry;
use super::schema::{lookup_schema, OpSchema, PoolKind, PoolOpType};

/// A pooling node bound to a schema version and validated attributes.
///
/// Construction does all attribute checking; [`PoolOperator::compute`] only validates the
/// input tensor and dispatches to a registered kernel.
#[derive(Debug, Clone)]
pub struct PoolOperator {
    op_type: PoolOpType,
    version: u32,
    schema: &'static OpSchema,
    attrs: PoolAttributes,
    kind: PoolKind,
}

impl PoolOperator {
    pub fn new(op_name: &str, version: u32, attrs: &NodeAttributes) -> PoolResult<Self> {
        let op_type = PoolOpType::parse(op_name).ok_or_else(|| PoolError::NoSchema {
            op: op_name.to_string(),
            version,
        })?;
        Self::from_op_type(op_type, version, attrs)
    }

    pub fn from_op_type(
        op_type: PoolOpType,
        version: u32,
        attrs: &NodeAttributes,
    ) -> PoolResult<Self> {
        let schema = lookup_schema(op_type, version)?;
        let attrs = PoolAttributes::from_node(schema, attrs)?;
        let kind = attrs.kind(op_type);
        Ok(PoolOperator {
            op_type,
            version,
            schema,
            attrs,
            kind,
        })
    }

    pub fn op_type(&self) -> PoolOpType {
        self.op_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn schema(&self) -> &'static OpSchema {
        self.schema
    }

    pub fn attributes(&self) -> &PoolAttributes {
        &self.attrs
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Output dims for an input of shape `input_dims`, without running anything.
    pub fn output_dims(&self, input_dims: &[usize]) -> PoolResult<Vec<usize>> {
        Ok(PoolGeometry::resolve(&self.attrs, input_dims)?.output_dims())
    }

    /// Runs the operator. `want_indices` requests the optional max-pool argmax output.
    pub fn compute(
        &self,
        registry: &KernelRegistry,
        input: &Tensor,
        want_indices: bool,
    ) -> PoolResult<PoolOutputs> {
        self.compute_with_kernel(registry, input, want_indices)
            .map(|(outputs, _)| outputs)
    }

    /// Like [`compute`](Self::compute) but also reports which kernel ran.
    pub fn compute_with_kernel(
        &self,
        registry: &KernelRegistry,
        input: &Tensor,
        want_indices: bool,
    ) -> PoolResult<(PoolOutputs, &'static str)> {
        let dtype = input.dtype();
        if !self.schema.supports_dtype(dtype) {
            return Err(PoolError::UnsupportedType {
                op: self.op_type.name(),
                dtype,
            });
        }
        if want_indices && !self.schema.emits_indices() {
            return Err(PoolError::invalid_argument(format!(
                "{} version {} has no indices output",
                self.op_type, self.version
            )));
        }

        let geometry = PoolGeometry::resolve(&self.attrs, input.dims())?;
        if geometry.output_len() == 0 {
            return Ok((
                PoolOutputs::empty(&geometry, dtype, want_indices)?,
                "empty",
            ));
        }

        let ctx = PoolContext {
            op_type: self.op_type,
            kind: self.kind,
            input,
            geometry: &geometry,
            want_indices,
        };
        ctx.check_input()?;
        registry.call(&ctx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::ops::kernel::PoolKernel;
    use crate::ops::registry::{KernelKey, KernelOverrides};
    use crate::tensor::{DType, Shape};

    /// Fills the output with a constant so tests can tell kernels apart.
    struct ConstantKernel {
        name: &'static str,
        value: f32,
        f32_only: bool,
        calls: AtomicUsize,
    }

    impl ConstantKernel {
        fn new(name: &'static str, value: f32, f32_only: bool) -> Arc<Self> {
            Arc::new(ConstantKernel {
                name,
                value,
                f32_only,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl PoolKernel for ConstantKernel {
        fn name(&self) -> &'static str {
            self.name
        }

        fn supports(&self, ctx: &PoolContext<'_>) -> bool {
            !self.f32_only || (ctx.dtype() == DType::F32 && !ctx.want_indices)
        }

        fn compute(&self, ctx: &PoolContext<'_>) -> PoolResult<PoolOutputs> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let shape = Shape::new(ctx.geometry.output_dims());
            let len = shape.num_elements();
            Ok(PoolOutputs {
                values: Tensor::from_f32(shape.clone(), vec![self.value; len])?,
                indices: ctx
                    .want_indices
                    .then(|| Tensor::from_i64(shape, vec![0; len]))
                    .transpose()?,
            })
        }
    }

    fn max_pool(version: u32) -> PoolOperator {
        PoolOperator::new(
            "MaxPool",
            version,
            &NodeAttributes::new().with_ints("kernel_shape", &[2, 2]),
        )
        .unwrap()
    }

    fn input() -> Tensor {
        Tensor::from_f32(Shape::new([1, 1, 3, 3]), vec![0.0; 9]).unwrap()
    }

    #[test]
    fn default_policy_prefers_first_supporting_kernel() {
        let registry = KernelRegistry::default();
        let fast = ConstantKernel::new("fast", 1.0, true);
        let slow = ConstantKernel::new("slow", 2.0, false);
        registry.register(KernelKey::MAX_POOL, fast.clone());
        registry.register(KernelKey::MAX_POOL, slow.clone());

        let op = max_pool(12);
        let (out, name) = op.compute_with_kernel(&registry, &input(), false).unwrap();
        assert_eq!(name, "fast");
        assert_eq!(out.values.dims(), &[1, 1, 2, 2]);
        assert!(out.indices.is_none());

        let (out, name) = op.compute_with_kernel(&registry, &input(), true).unwrap();
        assert_eq!(name, "slow", "indices should fall back to the general kernel");
        assert_eq!(out.indices.unwrap().dtype(), DType::I64);
        assert_eq!(fast.calls.load(Ordering::SeqCst), 1);
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn force_policy_uses_named_kernel_when_supported() {
        let mut overrides = KernelOverrides::default();
        overrides.set(KernelKey::MAX_POOL, "force=slow").unwrap();
        let registry = KernelRegistry::new(overrides);
        registry.register(KernelKey::MAX_POOL, ConstantKernel::new("fast", 1.0, true));
        registry.register(KernelKey::MAX_POOL, ConstantKernel::new("slow", 2.0, false));

        let (out, name) = max_pool(12)
            .compute_with_kernel(&registry, &input(), false)
            .unwrap();
        assert_eq!(name, "slow");
        assert_eq!(out.values.to_f32_vec().unwrap(), vec![2.0; 4]);
    }

    #[test]
    fn unknown_forced_kernel_falls_back_to_default() {
        let mut overrides = KernelOverrides::default();
        overrides.set(KernelKey::MAX_POOL, "force=missing").unwrap();
        let registry = KernelRegistry::new(overrides);
        registry.register(KernelKey::MAX_POOL, ConstantKernel::new("fast", 1.0, true));

        let (_, name) = max_pool(12)
            .compute_with_kernel(&registry, &input(), false)
            .unwrap();
        assert_eq!(name, "fast");
    }

    #[test]
    fn benchmark_policy_caches_the_winner() {
        let mut overrides = KernelOverrides::default();
        overrides.set(KernelKey::MAX_POOL, "benchmark(cache=2)").unwrap();
        let registry = KernelRegistry::new(overrides);
        let a = ConstantKernel::new("a", 1.0, false);
        let b = ConstantKernel::new("b", 2.0, false);
        registry.register(KernelKey::MAX_POOL, a.clone());
        registry.register(KernelKey::MAX_POOL, b.clone());

        let op = max_pool(12);
        let (_, first) = op.compute_with_kernel(&registry, &input(), false).unwrap();
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.benchmark_cache_len(KernelKey::MAX_POOL), 1);

        let (_, second) = op.compute_with_kernel(&registry, &input(), false).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            a.calls.load(Ordering::SeqCst) + b.calls.load(Ordering::SeqCst),
            3,
            "cached call should run exactly one kernel"
        );
    }

    #[test]
    fn no_supporting_kernel_is_an_error() {
        let registry = KernelRegistry::default();
        registry.register(KernelKey::MAX_POOL, ConstantKernel::new("fast", 1.0, true));
        let err = max_pool(12)
            .compute(&registry, &input(), true)
            .unwrap_err();
        assert!(matches!(err, PoolError::NoKernel { key: "max_pool" }));
    }

    #[test]
    fn schema_gates_dtype_and_indices() {
        let registry = KernelRegistry::default();
        registry.register(KernelKey::MAX_POOL, ConstantKernel::new("any", 0.0, false));
        let bytes = Tensor::from_u8(Shape::new([1, 1, 3, 3]), vec![0; 9]).unwrap();

        let err = max_pool(11).compute(&registry, &bytes, false).unwrap_err();
        assert!(matches!(
            err,
            PoolError::UnsupportedType {
                dtype: DType::U8,
                ..
            }
        ));
        let err = max_pool(7).compute(&registry, &input(), true).unwrap_err();
        assert!(err.to_string().contains("no indices output"), "{err}");
    }

    #[test]
    fn zero_sized_outputs_skip_the_kernels() {
        let registry = KernelRegistry::default();
        let op = max_pool(12);
        let empty = Tensor::from_f32(Shape::new([0, 3, 4, 4]), Vec::new()).unwrap();
        let (out, name) = op.compute_with_kernel(&registry, &empty, true).unwrap();
        assert_eq!(name, "empty");
        assert_eq!(out.values.dims(), &[0, 3, 3, 3]);
        assert_eq!(out.indices.unwrap().len(), 0);
    }

    #[test]
    fn unknown_op_names_are_rejected() {
        let err = PoolOperator::new("Conv", 11, &NodeAttributes::new()).unwrap_err();
        assert!(matches!(err, PoolError::NoSchema { .. }));
    }
}
