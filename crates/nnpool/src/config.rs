//! Runtime configuration: kernel policies and parallelism knobs.
//!
//! Values are layered as defaults, then `NNPOOL_*` environment variables, then an optional JSON
//! file passed explicitly by the caller.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::env;
use crate::error::{PoolError, PoolResult};
use crate::ops::registry::{build_registry, KernelOverrides, KernelRegistryHandle};

/// Work (output elements times window volume) below which kernels stay on the calling thread.
pub const DEFAULT_MIN_PARALLEL_COST: u64 = 1 << 15;

/// Parallel fan-out settings consumed by CPU backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Size of a dedicated worker pool; `None` uses the global rayon pool.
    pub num_threads: Option<usize>,
    pub min_parallel_cost: u64,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        ParallelConfig {
            num_threads: None,
            min_parallel_cost: DEFAULT_MIN_PARALLEL_COST,
        }
    }
}

impl ParallelConfig {
    /// Always run on the calling thread.
    pub fn serial() -> Self {
        ParallelConfig {
            num_threads: Some(1),
            min_parallel_cost: u64::MAX,
        }
    }
}

/// Parallel settings as written in a config file. Keys left out keep the value from the
/// environment or the defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelOverrides {
    pub num_threads: Option<usize>,
    pub min_parallel_cost: Option<u64>,
}

impl ParallelOverrides {
    fn apply(self, parallel: &mut ParallelConfig) {
        if let Some(threads) = self.num_threads {
            parallel.num_threads = Some(threads);
        }
        if let Some(cost) = self.min_parallel_cost {
            parallel.min_parallel_cost = cost;
        }
    }
}

/// On-disk shape of a runtime config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub overrides: KernelOverrides,
    pub parallel: ParallelOverrides,
}

impl ConfigFile {
    pub fn from_json_str(raw: &str) -> PoolResult<Self> {
        serde_json::from_str(raw)
            .map_err(|err| PoolError::Config(format!("invalid runtime config: {err}")))
    }

    pub fn from_json_file(path: &Path) -> PoolResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| PoolError::Config(format!("reading {}: {err}", path.display())))?;
        Self::from_json_str(&raw)
    }
}

/// `NNPOOL_*` values captured from the process environment.
#[derive(Debug, Clone, Default)]
pub(crate) struct EnvLayer {
    pub(crate) kernel_policy: Option<String>,
    pub(crate) num_threads: Option<usize>,
    pub(crate) min_parallel_cost: Option<u64>,
}

impl EnvLayer {
    fn from_process() -> Self {
        EnvLayer {
            kernel_policy: env::kernel_policy().map(str::to_string),
            num_threads: env::num_threads(),
            min_parallel_cost: env::min_parallel_cost(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeConfig {
    pub overrides: KernelOverrides,
    pub parallel: ParallelConfig,
}

impl RuntimeConfig {
    /// Defaults overlaid with `NNPOOL_KERNEL_POLICY`, `NNPOOL_NUM_THREADS` and
    /// `NNPOOL_MIN_PARALLEL_COST`.
    pub fn from_env() -> PoolResult<Self> {
        Self::layered(&EnvLayer::from_process(), None)
    }

    /// Defaults overlaid with a JSON config, ignoring the environment.
    pub fn from_json_str(raw: &str) -> PoolResult<Self> {
        Self::layered(&EnvLayer::default(), Some(ConfigFile::from_json_str(raw)?))
    }

    pub fn from_json_file(path: &Path) -> PoolResult<Self> {
        Self::layered(&EnvLayer::default(), Some(ConfigFile::from_json_file(path)?))
    }

    /// Defaults, then the environment, then the file at `path` when given. A file only
    /// replaces the keys it sets.
    pub fn load(path: Option<&Path>) -> PoolResult<Self> {
        let file = path.map(ConfigFile::from_json_file).transpose()?;
        Self::layered(&EnvLayer::from_process(), file)
    }

    pub(crate) fn layered(env: &EnvLayer, file: Option<ConfigFile>) -> PoolResult<Self> {
        let mut config = RuntimeConfig::default();
        if let Some(raw) = &env.kernel_policy {
            config.overrides = KernelOverrides::from_json(raw)?;
        }
        ParallelOverrides {
            num_threads: env.num_threads,
            min_parallel_cost: env.min_parallel_cost,
        }
        .apply(&mut config.parallel);

        if let Some(file) = file {
            config.overrides = config.overrides.merged_with(&file.overrides);
            file.parallel.apply(&mut config.parallel);
        }
        Ok(config)
    }

    /// Builds an empty registry carrying this config's overrides; backends register into it.
    pub fn registry(&self) -> KernelRegistryHandle {
        build_registry(&self.overrides)
    }
}
