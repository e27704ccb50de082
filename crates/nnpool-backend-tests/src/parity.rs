//! Seeded random cases checked against the brute-force oracle, once per registered kernel.

use nnpool::ops::{KernelKey, KernelOverrides, KernelRegistryHandle};
use nnpool::{NodeAttributes, PoolGeometry, PoolOpType, PoolOperator, Tensor};
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::json;

use crate::harness::{
    assert_close, f32_tensor, random_vec, run_with_kernel, seeded_rng, values_f32,
};
use crate::naive;

/// One randomly drawn pooling configuration.
#[derive(Debug, Clone)]
struct Case {
    op: PoolOpType,
    version: u32,
    attrs: NodeAttributes,
    dims: Vec<usize>,
    want_indices: bool,
}

fn draw_case(rng: &mut StdRng, op: PoolOpType) -> Case {
    let version = match op {
        PoolOpType::MaxPool => 12,
        PoolOpType::AveragePool => 19,
        PoolOpType::LpPool => 18,
        PoolOpType::GlobalMaxPool | PoolOpType::GlobalAveragePool => 1,
        PoolOpType::GlobalLpPool => 2,
    };
    let rank = rng.gen_range(1..=3);
    let batch = rng.gen_range(1..=2);
    let channels = rng.gen_range(1..=3);
    let mut attrs = NodeAttributes::new();
    let mut dims = vec![batch, channels];

    if op.is_global() {
        dims.extend((0..rank).map(|_| rng.gen_range(1..=5)));
    } else {
        let kernel: Vec<i64> = (0..rank).map(|_| rng.gen_range(1..=3)).collect();
        let strides: Vec<i64> = (0..rank).map(|_| rng.gen_range(1..=2)).collect();
        let dilations: Vec<i64> = if rng.gen_bool(0.3) {
            (0..rank).map(|_| rng.gen_range(1..=2)).collect()
        } else {
            vec![1; rank]
        };
        for d in 0..rank {
            let effective = (dilations[d] * (kernel[d] - 1) + 1) as usize;
            dims.push(effective + rng.gen_range(0..=4));
        }
        match rng.gen_range(0..4) {
            0 => attrs.set("auto_pad", "SAME_UPPER".into()),
            1 => attrs.set("auto_pad", "SAME_LOWER".into()),
            _ => {
                let pads: Vec<i64> = (0..2 * rank)
                    .map(|i| rng.gen_range(0..kernel[i % rank]))
                    .collect();
                attrs.set("pads", pads.into());
            }
        }
        attrs.set("kernel_shape", kernel.into());
        attrs.set("strides", strides.into());
        attrs.set("dilations", dilations.into());
        if rng.gen_bool(0.4) {
            attrs.set("ceil_mode", 1i64.into());
        }
        if op == PoolOpType::AveragePool && rng.gen_bool(0.5) {
            attrs.set("count_include_pad", 1i64.into());
        }
    }

    if op == PoolOpType::MaxPool && rng.gen_bool(0.5) {
        attrs.set("storage_order", rng.gen_range(0..=1i64).into());
    }
    if matches!(op, PoolOpType::LpPool | PoolOpType::GlobalLpPool) {
        attrs.set("p", rng.gen_range(1..=3i64).into());
    }

    Case {
        op,
        version,
        attrs,
        want_indices: op == PoolOpType::MaxPool && rng.gen_bool(0.5),
        dims,
    }
}

fn check_case<F>(factory: &F, case: &Case, input: &Tensor, x: &[f64])
where
    F: Fn(KernelOverrides) -> KernelRegistryHandle,
{
    let op = PoolOperator::from_op_type(case.op, case.version, &case.attrs)
        .unwrap_or_else(|err| panic!("{case:?}: {err}"));
    let geometry = PoolGeometry::resolve(op.attributes(), &case.dims)
        .unwrap_or_else(|err| panic!("{case:?}: {err}"));
    let expected = naive::pool(op.kind(), &geometry, x, f32::MIN as f64);

    let key = case.op.kernel_key();
    let names = factory(KernelOverrides::default()).kernel_names(key);
    assert!(!names.is_empty(), "no kernels registered for {key}");
    for name in names {
        let overrides: KernelOverrides =
            serde_json::from_value(json!({ key.as_str(): format!("force={name}") }))
                .expect("overrides");
        let registry = factory(overrides);
        let (out, ran) = run_with_kernel(
            &registry,
            case.op.name(),
            case.version,
            &case.attrs,
            input,
            case.want_indices,
        );
        let context = format!("{ran} (forced {name}) on {case:?}");
        assert_eq!(out.values.dims(), geometry.output_dims().as_slice(), "{context}");
        assert_close(&values_f32(&out), &expected.values, &context);
        if case.want_indices {
            let indices = out.indices.as_ref().expect("indices requested");
            assert_eq!(
                indices.as_slice::<i64>().unwrap(),
                expected.indices.as_slice(),
                "{context}"
            );
        }
    }
}

fn random_cases<F>(factory: &F, op: PoolOpType, seed: u64, cases: usize)
where
    F: Fn(KernelOverrides) -> KernelRegistryHandle,
{
    let mut rng = seeded_rng(seed);
    for _ in 0..cases {
        let case = draw_case(&mut rng, op);
        let len = case.dims.iter().product();
        let data = random_vec(&mut rng, len);
        let x: Vec<f64> = data.iter().map(|&v| v as f64).collect();
        let input = f32_tensor(&case.dims, data);
        check_case(factory, &case, &input, &x);
    }
}

pub fn max_pool_matches_oracle<F>(factory: &F)
where
    F: Fn(KernelOverrides) -> KernelRegistryHandle,
{
    random_cases(factory, PoolOpType::MaxPool, 7, 48);
}

pub fn average_pool_matches_oracle<F>(factory: &F)
where
    F: Fn(KernelOverrides) -> KernelRegistryHandle,
{
    random_cases(factory, PoolOpType::AveragePool, 11, 48);
}

pub fn lp_pool_matches_oracle<F>(factory: &F)
where
    F: Fn(KernelOverrides) -> KernelRegistryHandle,
{
    random_cases(factory, PoolOpType::LpPool, 13, 32);
}

pub fn global_pools_match_oracle<F>(factory: &F)
where
    F: Fn(KernelOverrides) -> KernelRegistryHandle,
{
    for (i, op) in [
        PoolOpType::GlobalMaxPool,
        PoolOpType::GlobalAveragePool,
        PoolOpType::GlobalLpPool,
    ]
    .into_iter()
    .enumerate()
    {
        random_cases(factory, op, 17 + i as u64, 12);
    }
}

/// Enough planes and work to cross any parallel threshold; results must not depend on it.
pub fn large_inputs_match_oracle<F>(factory: &F)
where
    F: Fn(KernelOverrides) -> KernelRegistryHandle,
{
    let mut rng = seeded_rng(23);
    let dims = vec![4, 16, 33, 31];
    let len = dims.iter().product();
    let data = random_vec(&mut rng, len);
    let x: Vec<f64> = data.iter().map(|&v| v as f64).collect();
    let input = f32_tensor(&dims, data);
    for (op, version, attrs, want_indices) in [
        (
            PoolOpType::MaxPool,
            12,
            NodeAttributes::new()
                .with_ints("kernel_shape", &[3, 3])
                .with_ints("strides", &[2, 2])
                .with_ints("pads", &[1, 1, 1, 1]),
            true,
        ),
        (
            PoolOpType::AveragePool,
            11,
            NodeAttributes::new()
                .with_ints("kernel_shape", &[3, 3])
                .with_ints("strides", &[2, 2])
                .with_ints("pads", &[1, 1, 1, 1])
                .with_int("count_include_pad", 1),
            false,
        ),
    ] {
        let case = Case {
            op,
            version,
            attrs,
            dims: dims.clone(),
            want_indices,
        };
        check_case(factory, &case, &input, &x);
    }
}

/// The default policy must pick a kernel for every family the backend registers.
pub fn every_family_has_a_default_kernel<F>(factory: &F)
where
    F: Fn(KernelOverrides) -> KernelRegistryHandle,
{
    let registry = factory(KernelOverrides::default());
    for key in KernelKey::ALL {
        assert!(
            !registry.kernel_names(key).is_empty(),
            "backend registers nothing for {key}"
        );
    }
}
