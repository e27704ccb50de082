use nnpool::{KernelRegistry, NodeAttributes, PoolOperator, PoolOutputs, Shape, Tensor};
use rand::{rngs::StdRng, Rng, SeedableRng};

pub const ATOL: f64 = 1e-5;
pub const RTOL: f64 = 1e-5;

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn random_vec(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect()
}

pub fn f32_tensor(dims: &[usize], data: Vec<f32>) -> Tensor {
    Tensor::from_f32(Shape::new(dims), data).expect("input tensor")
}

/// Runs `op_name` at `version` and reports which kernel produced the result.
pub fn run_with_kernel(
    registry: &KernelRegistry,
    op_name: &str,
    version: u32,
    attrs: &NodeAttributes,
    input: &Tensor,
    want_indices: bool,
) -> (PoolOutputs, &'static str) {
    let op = PoolOperator::new(op_name, version, attrs)
        .unwrap_or_else(|err| panic!("{op_name} v{version}: {err}"));
    op.compute_with_kernel(registry, input, want_indices)
        .unwrap_or_else(|err| panic!("{op_name} v{version} on {:?}: {err}", input.dims()))
}

pub fn run(
    registry: &KernelRegistry,
    op_name: &str,
    version: u32,
    attrs: &NodeAttributes,
    input: &Tensor,
    want_indices: bool,
) -> PoolOutputs {
    run_with_kernel(registry, op_name, version, attrs, input, want_indices).0
}

pub fn values_f32(outputs: &PoolOutputs) -> Vec<f32> {
    outputs.values.to_f32_vec().expect("f32 output")
}

pub fn indices(outputs: &PoolOutputs) -> Vec<i64> {
    outputs
        .indices
        .as_ref()
        .expect("indices requested")
        .as_slice::<i64>()
        .expect("i64 indices")
        .to_vec()
}

#[track_caller]
pub fn assert_close(actual: &[f32], expected: &[f64], context: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{context}: length mismatch ({} vs {})",
        actual.len(),
        expected.len()
    );
    for (i, (&a, &e)) in actual.iter().zip(expected).enumerate() {
        let diff = (a as f64 - e).abs();
        let tol = ATOL + RTOL * e.abs();
        assert!(
            diff <= tol,
            "{context}: element {i} differs: got {a}, expected {e} (diff {diff:.3e} > tol {tol:.3e})"
        );
    }
}
