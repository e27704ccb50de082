use std::sync::Arc;

use anyhow::Result;
use nnpool::ops::{KernelKey, KernelPolicy};
use nnpool::{profiling, NodeAttributes, ParallelConfig, PoolOperator, RuntimeConfig, Shape, Tensor};
use nnpool_backend_ref_cpu::{cpu_registry, CpuPoolBackend};
use nnpool_backend_tests::harness::{random_vec, seeded_rng};
use serde_json::json;

fn input(dims: &[usize], seed: u64) -> Result<Tensor> {
    let mut rng = seeded_rng(seed);
    let len = dims.iter().product();
    Ok(Tensor::from_f32(Shape::new(dims), random_vec(&mut rng, len))?)
}

fn max_pool() -> Result<PoolOperator> {
    Ok(PoolOperator::new(
        "MaxPool",
        12,
        &NodeAttributes::new()
            .with_ints("kernel_shape", &[3, 3])
            .with_ints("strides", &[2, 2]),
    )?)
}

#[test]
fn default_policy_prefers_fast_path_when_it_applies() -> Result<()> {
    let registry = cpu_registry(&RuntimeConfig::default())?;
    let x = input(&[1, 3, 9, 9], 1)?;
    let op = max_pool()?;

    let (_, name) = op.compute_with_kernel(&registry, &x, false)?;
    assert_eq!(name, "fast_f32");
    let (_, name) = op.compute_with_kernel(&registry, &x, true)?;
    assert_eq!(name, "reference");

    let lp = PoolOperator::new(
        "LpPool",
        18,
        &NodeAttributes::new().with_ints("kernel_shape", &[2, 2]),
    )?;
    let (_, name) = lp.compute_with_kernel(&registry, &x, false)?;
    assert_eq!(name, "reference");

    let dilated = PoolOperator::new(
        "AveragePool",
        19,
        &NodeAttributes::new()
            .with_ints("kernel_shape", &[2, 2])
            .with_ints("dilations", &[2, 2]),
    )?;
    let (_, name) = dilated.compute_with_kernel(&registry, &x, false)?;
    assert_eq!(name, "reference");
    Ok(())
}

#[test]
fn json_config_forces_reference_kernel() -> Result<()> {
    let config = RuntimeConfig::from_json_str(
        &json!({
            "overrides": { "max_pool": "force=reference" },
            "parallel": { "min_parallel_cost": 0 }
        })
        .to_string(),
    )?;
    let registry = cpu_registry(&config)?;
    assert_eq!(
        registry.policy(KernelKey::MAX_POOL),
        KernelPolicy::Force {
            implementation: "reference".into()
        }
    );

    let x = input(&[2, 4, 8, 8], 2)?;
    let op = max_pool()?;
    let (forced, name) = op.compute_with_kernel(&registry, &x, false)?;
    assert_eq!(name, "reference");

    let default = cpu_registry(&RuntimeConfig::default())?;
    let (fast, name) = op.compute_with_kernel(&default, &x, false)?;
    assert_eq!(name, "fast_f32");
    assert_eq!(forced.values, fast.values);
    Ok(())
}

#[test]
fn benchmark_policy_memoizes_per_signature() -> Result<()> {
    let config = RuntimeConfig::from_json_str(
        &json!({ "overrides": { "average_pool": "benchmark(cache=4)" } }).to_string(),
    )?;
    let registry = cpu_registry(&config)?;
    let op = PoolOperator::new(
        "AveragePool",
        11,
        &NodeAttributes::new()
            .with_ints("kernel_shape", &[2, 2])
            .with_ints("pads", &[1, 1, 1, 1]),
    )?;

    let small = input(&[1, 2, 6, 6], 3)?;
    let large = input(&[1, 2, 10, 10], 4)?;
    let (first, first_name) = op.compute_with_kernel(&registry, &small, false)?;
    let (again, again_name) = op.compute_with_kernel(&registry, &small, false)?;
    assert_eq!(first_name, again_name);
    assert_eq!(first.values, again.values);
    assert_eq!(registry.benchmark_cache_len(KernelKey::AVERAGE_POOL), 1);

    op.compute(&registry, &large, false)?;
    assert_eq!(registry.benchmark_cache_len(KernelKey::AVERAGE_POOL), 2);
    Ok(())
}

#[test]
fn dedicated_thread_pool_matches_serial_results() -> Result<()> {
    let x = input(&[3, 8, 17, 19], 5)?;
    let op = max_pool()?;

    let serial = Arc::new(nnpool::KernelRegistry::default());
    CpuPoolBackend::serial().register(&serial);
    let pooled = Arc::new(nnpool::KernelRegistry::default());
    let backend = CpuPoolBackend::new(ParallelConfig {
        num_threads: Some(3),
        min_parallel_cost: 0,
    })?;
    assert_eq!(backend.parallel_config().num_threads, Some(3));
    backend.register(&pooled);

    for want_indices in [false, true] {
        let a = op.compute(&serial, &x, want_indices)?;
        let b = op.compute(&pooled, &x, want_indices)?;
        assert_eq!(a, b);
    }
    Ok(())
}

#[test]
fn profiling_records_kernel_and_fanout_scopes() -> Result<()> {
    let registry = cpu_registry(&RuntimeConfig {
        parallel: ParallelConfig {
            num_threads: None,
            min_parallel_cost: 0,
        },
        ..RuntimeConfig::default()
    })?;
    let x = input(&[2, 4, 8, 8], 6)?;
    let op = max_pool()?;

    profiling::set_enabled(true);
    profiling::reset();
    op.compute(&registry, &x, false)?;
    let report = profiling::take_report();
    profiling::set_enabled(false);

    assert!(
        report
            .functionals
            .iter()
            .any(|row| row.name == "max_pool (fast_f32)" && row.calls >= 1),
        "{}",
        report.format_table()
    );
    assert!(report.backend.iter().any(|row| row.name == "cpu.plane_fanout"));
    Ok(())
}
