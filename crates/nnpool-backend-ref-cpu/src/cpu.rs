use std::sync::Arc;

use nnpool::ops::{KernelKey, KernelRegistryHandle, PoolKernel};
use nnpool::{KernelRegistry, ParallelConfig, PoolResult, RuntimeConfig};

use crate::fast::{FastF32Kernel, FAST_F32_KERNEL_NAME};
use crate::parallel::PlaneRunner;
use crate::reference::{ReferenceKernel, REFERENCE_KERNEL_NAME};

/// The CPU backend: both kernels share one plane runner (and thread pool).
#[derive(Clone)]
pub struct CpuPoolBackend {
    fast: Arc<FastF32Kernel>,
    reference: Arc<ReferenceKernel>,
    parallel: ParallelConfig,
}

impl CpuPoolBackend {
    pub fn new(parallel: ParallelConfig) -> PoolResult<Self> {
        Ok(Self::with_runner(PlaneRunner::new(parallel)?))
    }

    /// Backend that never leaves the calling thread.
    pub fn serial() -> Self {
        Self::with_runner(PlaneRunner::serial())
    }

    fn with_runner(runner: PlaneRunner) -> Self {
        CpuPoolBackend {
            parallel: runner.config(),
            fast: Arc::new(FastF32Kernel::with_runner(runner.clone())),
            reference: Arc::new(ReferenceKernel::with_runner(runner)),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        "cpu"
    }

    pub fn parallel_config(&self) -> ParallelConfig {
        self.parallel
    }

    /// Registers `fast_f32` ahead of `reference` so the default policy prefers it.
    ///
    /// Kernels already registered under the same name are left in place.
    pub fn register(&self, registry: &KernelRegistry) {
        for key in [KernelKey::MAX_POOL, KernelKey::AVERAGE_POOL] {
            registry.register_default(key, FAST_F32_KERNEL_NAME, || {
                self.fast.clone() as Arc<dyn PoolKernel>
            });
        }
        for key in KernelKey::ALL {
            registry.register_default(key, REFERENCE_KERNEL_NAME, || {
                self.reference.clone() as Arc<dyn PoolKernel>
            });
        }
        log::debug!(
            "registered {} pooling kernels (threads: {:?}, min parallel cost: {})",
            self.backend_name(),
            self.parallel.num_threads,
            self.parallel.min_parallel_cost
        );
    }
}

/// Registry carrying `config`'s overrides with the CPU kernels registered.
pub fn cpu_registry(config: &RuntimeConfig) -> PoolResult<KernelRegistryHandle> {
    let registry = config.registry();
    CpuPoolBackend::new(config.parallel)?.register(&registry);
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_order_prefers_the_fast_path() {
        let registry = KernelRegistry::default();
        let backend = CpuPoolBackend::serial();
        backend.register(&registry);
        backend.register(&registry);

        assert_eq!(
            registry.kernel_names(KernelKey::MAX_POOL),
            vec!["fast_f32", "reference"]
        );
        assert_eq!(
            registry.kernel_names(KernelKey::AVERAGE_POOL),
            vec!["fast_f32", "reference"]
        );
        assert_eq!(registry.kernel_names(KernelKey::LP_POOL), vec!["reference"]);
    }
}
