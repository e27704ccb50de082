//! Runtime registry for selecting and benchmarking pooling kernels.
//!
//! Backends register kernels per reduction family; the registry then picks one per call,
//! optionally forcing a named kernel or benchmarking every candidate and caching the fastest
//! variant so later calls with the same signature skip the timing run.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};

use super::kernel::{PoolCacheKey, PoolContext, PoolKernel, PoolOutputs};

/// Shared pointer to a kernel registry.
pub type KernelRegistryHandle = Arc<KernelRegistry>;

/// Symbolic key naming a reduction family (e.g. `"max_pool"`).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct KernelKey(&'static str);

impl KernelKey {
    pub const MAX_POOL: KernelKey = KernelKey::new("max_pool");
    pub const AVERAGE_POOL: KernelKey = KernelKey::new("average_pool");
    pub const LP_POOL: KernelKey = KernelKey::new("lp_pool");

    pub const ALL: [KernelKey; 3] = [Self::MAX_POOL, Self::AVERAGE_POOL, Self::LP_POOL];

    pub const fn new(name: &'static str) -> Self {
        KernelKey(name)
    }

    /// Family name as written in override maps, log lines and profiling rows.
    pub fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

const DEFAULT_BENCHMARK_CACHE_SIZE: usize = 128;

/// User-configurable overrides that steer how each family picks its kernel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelOverrides {
    #[serde(flatten)]
    overrides: HashMap<String, KernelPolicySetting>,
}

impl KernelOverrides {
    /// Parses a JSON object such as `{"max_pool": "benchmark(cache=16)"}`.
    pub fn from_json(raw: &str) -> PoolResult<Self> {
        serde_json::from_str(raw)
            .map_err(|err| PoolError::Config(format!("invalid kernel overrides: {err}")))
    }

    pub fn set(&mut self, key: KernelKey, raw: &str) -> Result<()> {
        let setting = parse_policy_string(raw)?;
        self.overrides.insert(key.as_str().to_string(), setting);
        Ok(())
    }

    /// Policy for `key`; families without an entry use [`KernelPolicy::Default`].
    pub fn policy(&self, key: KernelKey) -> KernelPolicy {
        self.overrides
            .get(key.as_str())
            .cloned()
            .map(KernelPolicy::from_setting)
            .unwrap_or(KernelPolicy::Default)
    }

    /// Merges `other` on top of `self`; keys present in `other` win.
    pub fn merged_with(mut self, other: &KernelOverrides) -> Self {
        for (key, setting) in &other.overrides {
            self.overrides.insert(key.clone(), setting.clone());
        }
        self
    }
}

/// Effective policy applied to a kernel family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelPolicy {
    Default,
    Force { implementation: String },
    Benchmark { cache_size: usize },
}

impl KernelPolicy {
    fn from_setting(setting: KernelPolicySetting) -> Self {
        match setting {
            KernelPolicySetting::Default => KernelPolicy::Default,
            KernelPolicySetting::Kernel(implementation) => KernelPolicy::Force { implementation },
            KernelPolicySetting::Benchmark { cache_size } => KernelPolicy::Benchmark { cache_size },
        }
    }
}

/// One pooling family's entry in a config file or `NNPOOL_KERNEL_POLICY`.
///
/// Serialized as its policy string: `""`, `force=reference`, `benchmark(cache=64)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelPolicySetting {
    Default,
    /// Kernel name a family is pinned to, e.g. `fast_f32`.
    Kernel(String),
    Benchmark { cache_size: usize },
}

impl fmt::Display for KernelPolicySetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelPolicySetting::Default => Ok(()),
            KernelPolicySetting::Kernel(name) => write!(f, "force={name}"),
            KernelPolicySetting::Benchmark { cache_size: DEFAULT_BENCHMARK_CACHE_SIZE } => {
                f.write_str("benchmark")
            }
            KernelPolicySetting::Benchmark { cache_size } => {
                write!(f, "benchmark(cache={cache_size})")
            }
        }
    }
}

impl<'de> Deserialize<'de> for KernelPolicySetting {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_policy_string(&raw).map_err(serde::de::Error::custom)
    }
}

impl Serialize for KernelPolicySetting {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Accepts `""`, `force=<kernel>`, a bare kernel name, `benchmark` and `benchmark(cache=N)`.
fn parse_policy_string(raw: &str) -> Result<KernelPolicySetting> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(KernelPolicySetting::Default);
    }

    let options = match raw.split_once('(') {
        Some((head, tail)) if head.trim().eq_ignore_ascii_case("benchmark") => Some(
            tail.strip_suffix(')')
                .ok_or_else(|| anyhow!("unclosed benchmark options in `{raw}`"))?,
        ),
        _ if raw.eq_ignore_ascii_case("benchmark") => Some(""),
        _ => None,
    };
    if let Some(options) = options {
        return Ok(KernelPolicySetting::Benchmark {
            cache_size: benchmark_cache_size(options)?,
        });
    }

    match raw.strip_prefix("force=").map(str::trim) {
        Some("") => bail!("`force=` needs a kernel name"),
        Some(kernel) => Ok(KernelPolicySetting::Kernel(kernel.to_string())),
        None => Ok(KernelPolicySetting::Kernel(raw.to_string())),
    }
}

fn benchmark_cache_size(options: &str) -> Result<usize> {
    let mut cache_size = DEFAULT_BENCHMARK_CACHE_SIZE;
    for option in options.split(',').map(str::trim).filter(|o| !o.is_empty()) {
        let (key, value) = option.split_once('=').unwrap_or((option, ""));
        if key.trim() != "cache" {
            bail!("unknown benchmark option `{option}`, expected `cache=N`");
        }
        cache_size = match value.trim().parse::<usize>() {
            Ok(0) => bail!("benchmark cache must hold at least one kernel choice"),
            Ok(size) => size,
            Err(_) => bail!("benchmark cache size `{}` is not a number", value.trim()),
        };
    }
    Ok(cache_size)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct FamilyRegistry {
    key: KernelKey,
    kernels: Mutex<Vec<Arc<dyn PoolKernel>>>,
    policy: KernelPolicy,
    benchmark_cache: Mutex<Option<LruCache<PoolCacheKey, &'static str>>>,
}

impl FamilyRegistry {
    fn new(key: KernelKey, policy: KernelPolicy) -> Self {
        let benchmark_cache = match policy {
            KernelPolicy::Benchmark { cache_size } => {
                NonZeroUsize::new(cache_size.max(1)).map(LruCache::new)
            }
            _ => None,
        };

        Self {
            key,
            kernels: Mutex::new(Vec::new()),
            policy,
            benchmark_cache: Mutex::new(benchmark_cache),
        }
    }

    fn register(&self, kernel: Arc<dyn PoolKernel>) {
        lock(&self.kernels).push(kernel);
    }

    fn kernels(&self) -> Vec<Arc<dyn PoolKernel>> {
        lock(&self.kernels).clone()
    }

    fn select_by_name(&self, name: &str) -> Option<Arc<dyn PoolKernel>> {
        self.kernels()
            .into_iter()
            .find(|candidate| candidate.name() == name)
    }

    fn run(&self, kernel: &dyn PoolKernel, ctx: &PoolContext<'_>) -> PoolResult<PoolOutputs> {
        let _prof_guard = crate::profiling::functional_scope(self.key.as_str(), kernel.name());
        kernel.compute(ctx)
    }

    fn call(&self, ctx: &PoolContext<'_>) -> PoolResult<(PoolOutputs, &'static str)> {
        match &self.policy {
            KernelPolicy::Default => self.call_default(ctx),
            KernelPolicy::Force { implementation } => self.call_force(implementation, ctx),
            KernelPolicy::Benchmark { .. } => self.call_benchmark(ctx),
        }
    }

    fn call_default(&self, ctx: &PoolContext<'_>) -> PoolResult<(PoolOutputs, &'static str)> {
        let kernel = self
            .kernels()
            .into_iter()
            .find(|candidate| candidate.supports(ctx))
            .ok_or(PoolError::NoKernel { key: self.key.as_str() })?;

        let name = kernel.name();
        log::debug!("{}: dispatching {} to kernel {name}", self.key, ctx.op_type);
        let output = self.run(kernel.as_ref(), ctx)?;
        Ok((output, name))
    }

    fn call_force(
        &self,
        forced: &str,
        ctx: &PoolContext<'_>,
    ) -> PoolResult<(PoolOutputs, &'static str)> {
        if let Some(candidate) = self.select_by_name(forced) {
            if candidate.supports(ctx) {
                let name = candidate.name();
                log::debug!("{}: forced kernel {name} for {}", self.key, ctx.op_type);
                let output = self.run(candidate.as_ref(), ctx)?;
                return Ok((output, name));
            }
        }

        log::debug!(
            "{}: forced kernel {forced} cannot run this call, falling back to default",
            self.key
        );
        self.call_default(ctx)
    }

    fn call_benchmark(&self, ctx: &PoolContext<'_>) -> PoolResult<(PoolOutputs, &'static str)> {
        let cache_key = ctx.cache_key();

        if let Some(cached_name) = self.lookup_benchmark_cache(cache_key) {
            if let Some(candidate) = self.select_by_name(cached_name) {
                if candidate.supports(ctx) {
                    let output = self.run(candidate.as_ref(), ctx)?;
                    return Ok((output, cached_name));
                }
            }
            self.remove_benchmark_entry(cache_key);
        }

        let mut best: Option<(PoolOutputs, &'static str, std::time::Duration)> = None;

        for candidate in self.kernels() {
            if !candidate.supports(ctx) {
                continue;
            }

            let name = candidate.name();
            let start = Instant::now();
            let output = self.run(candidate.as_ref(), ctx)?;
            let elapsed = start.elapsed();
            log::debug!("{}: benchmark {name} took {elapsed:?}", self.key);

            if best.as_ref().is_none_or(|(_, _, best_time)| elapsed < *best_time) {
                best = Some((output, name, elapsed));
            }
        }

        let (output, name, _) = best.ok_or(PoolError::NoKernel { key: self.key.as_str() })?;
        self.update_benchmark_cache(cache_key, name);

        Ok((output, name))
    }

    fn lookup_benchmark_cache(&self, key: PoolCacheKey) -> Option<&'static str> {
        let mut guard = lock(&self.benchmark_cache);
        guard.as_mut().and_then(|cache| cache.get(&key).copied())
    }

    fn remove_benchmark_entry(&self, key: PoolCacheKey) {
        if let Some(cache) = lock(&self.benchmark_cache).as_mut() {
            cache.pop(&key);
        }
    }

    fn update_benchmark_cache(&self, key: PoolCacheKey, name: &'static str) {
        if let Some(cache) = lock(&self.benchmark_cache).as_mut() {
            cache.put(key, name);
        }
    }

    fn cached_entries(&self) -> usize {
        lock(&self.benchmark_cache)
            .as_ref()
            .map_or(0, |cache| cache.len())
    }
}

/// Stores the kernels available for each reduction family and selects one per call.
pub struct KernelRegistry {
    overrides: KernelOverrides,
    families: Mutex<HashMap<KernelKey, Arc<FamilyRegistry>>>,
}

impl KernelRegistry {
    pub fn new(overrides: KernelOverrides) -> Self {
        KernelRegistry {
            overrides,
            families: Mutex::new(HashMap::new()),
        }
    }

    /// Appends `kernel` to the family; earlier registrations are preferred by default policy.
    pub fn register(&self, key: KernelKey, kernel: Arc<dyn PoolKernel>) {
        self.ensure_family(key).register(kernel);
    }

    /// Registers a lazily constructed kernel unless one with the same name already exists.
    pub fn register_default<F>(&self, key: KernelKey, name: &'static str, builder: F)
    where
        F: FnOnce() -> Arc<dyn PoolKernel>,
    {
        let family = self.ensure_family(key);
        if family
            .kernels()
            .iter()
            .any(|candidate| candidate.name() == name)
        {
            return;
        }
        family.register(builder());
    }

    /// Names of the kernels registered for `key`, in preference order.
    pub fn kernel_names(&self, key: KernelKey) -> Vec<&'static str> {
        self.ensure_family(key)
            .kernels()
            .iter()
            .map(|kernel| kernel.name())
            .collect()
    }

    pub fn policy(&self, key: KernelKey) -> KernelPolicy {
        self.ensure_family(key).policy.clone()
    }

    /// Number of memoized benchmark decisions for `key`.
    pub fn benchmark_cache_len(&self, key: KernelKey) -> usize {
        self.ensure_family(key).cached_entries()
    }

    /// Runs the call through the kernel selected for its family; returns the kernel name too.
    pub fn call(&self, ctx: &PoolContext<'_>) -> PoolResult<(PoolOutputs, &'static str)> {
        self.ensure_family(ctx.op_type.kernel_key()).call(ctx)
    }

    fn ensure_family(&self, key: KernelKey) -> Arc<FamilyRegistry> {
        let mut guard = lock(&self.families);
        guard
            .entry(key)
            .or_insert_with(|| Arc::new(FamilyRegistry::new(key, self.overrides.policy(key))))
            .clone()
    }
}

impl Default for KernelRegistry {
    fn default() -> Self {
        Self::new(KernelOverrides::default())
    }
}

/// Constructs a shared registry from overrides.
pub fn build_registry(overrides: &KernelOverrides) -> KernelRegistryHandle {
    Arc::new(KernelRegistry::new(overrides.clone()))
}
