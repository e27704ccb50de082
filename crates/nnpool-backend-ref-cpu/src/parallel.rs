//! Fan-out of independent `N * C` planes over rayon.

use std::sync::Arc;

use nnpool::{ParallelConfig, PoolError, PoolGeometry, PoolResult};
use rayon::prelude::*;
use rayon::ThreadPool;

/// Runs a per-plane closure either inline or across a rayon pool.
#[derive(Clone)]
pub(crate) struct PlaneRunner {
    pool: Option<Arc<ThreadPool>>,
    config: ParallelConfig,
}

impl PlaneRunner {
    pub(crate) fn new(config: ParallelConfig) -> PoolResult<Self> {
        let pool = match config.num_threads {
            Some(threads) if threads > 1 => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|index| format!("nnpool-cpu-{index}"))
                    .build()
                    .map_err(|err| PoolError::Config(format!("building thread pool: {err}")))?;
                Some(Arc::new(pool))
            }
            _ => None,
        };
        Ok(PlaneRunner { pool, config })
    }

    pub(crate) fn serial() -> Self {
        PlaneRunner {
            pool: None,
            config: ParallelConfig::serial(),
        }
    }

    pub(crate) fn config(&self) -> ParallelConfig {
        self.config
    }

    fn is_serial(&self, geometry: &PoolGeometry) -> bool {
        self.config.num_threads == Some(1)
            || geometry.total_channels() <= 1
            || geometry.cost() < self.config.min_parallel_cost
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Calls `f(plane, y_plane)` for every output plane.
    pub(crate) fn for_each_plane<T, F>(&self, geometry: &PoolGeometry, y: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Send + Sync,
    {
        let y_step = geometry.y_step();
        if y_step == 0 || y.is_empty() {
            return;
        }
        if self.is_serial(geometry) {
            for (plane, chunk) in y.chunks_mut(y_step).enumerate() {
                f(plane, chunk);
            }
            return;
        }

        let _prof_guard = nnpool::profiling::backend_scope("cpu.plane_fanout");
        self.install(|| {
            y.par_chunks_mut(y_step)
                .enumerate()
                .for_each(|(plane, chunk)| f(plane, chunk));
        });
    }

    /// Like [`for_each_plane`](Self::for_each_plane) with a parallel `i64` index buffer.
    pub(crate) fn for_each_plane_with_indices<T, F>(
        &self,
        geometry: &PoolGeometry,
        y: &mut [T],
        indices: &mut [i64],
        f: F,
    ) where
        T: Send,
        F: Fn(usize, &mut [T], &mut [i64]) + Send + Sync,
    {
        let y_step = geometry.y_step();
        if y_step == 0 || y.is_empty() {
            return;
        }
        if self.is_serial(geometry) {
            for (plane, (chunk, idx)) in y
                .chunks_mut(y_step)
                .zip(indices.chunks_mut(y_step))
                .enumerate()
            {
                f(plane, chunk, idx);
            }
            return;
        }

        let _prof_guard = nnpool::profiling::backend_scope("cpu.plane_fanout");
        self.install(|| {
            y.par_chunks_mut(y_step)
                .zip(indices.par_chunks_mut(y_step))
                .enumerate()
                .for_each(|(plane, (chunk, idx))| f(plane, chunk, idx));
        });
    }
}
