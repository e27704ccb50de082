use nnpool::ops::{KernelOverrides, KernelRegistryHandle};
use nnpool::{ParallelConfig, RuntimeConfig};
use nnpool_backend_ref_cpu::cpu_registry;

fn registry_with(overrides: KernelOverrides, parallel: ParallelConfig) -> KernelRegistryHandle {
    cpu_registry(&RuntimeConfig {
        overrides,
        parallel,
    })
    .expect("cpu registry")
}

fn serial_registry(overrides: KernelOverrides) -> KernelRegistryHandle {
    registry_with(overrides, ParallelConfig::serial())
}

/// Global rayon pool with the cost threshold disabled, so every multi-plane call fans out.
fn parallel_registry(overrides: KernelOverrides) -> KernelRegistryHandle {
    registry_with(
        overrides,
        ParallelConfig {
            num_threads: None,
            min_parallel_cost: 0,
        },
    )
}

nnpool_backend_tests::define_backend_tests!(cpu_serial, super::serial_registry);
nnpool_backend_tests::define_backend_tests!(cpu_parallel, super::parallel_registry);
