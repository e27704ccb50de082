//! Specialised f32 max/average pooling for undilated windows.
//!
//! Windows are clamped to the input once per output position, so the inner loops run over
//! contiguous row slices with no per-tap bounds checks.

use nnpool::ops::{PoolContext, PoolKernel, StorageOrder};
use nnpool::{
    DType, ParallelConfig, PoolError, PoolGeometry, PoolKind, PoolOutputs, PoolResult, Shape,
    Tensor,
};

use crate::parallel::PlaneRunner;

/// Name under which the fast path is registered for max and average pooling.
pub const FAST_F32_KERNEL_NAME: &str = "fast_f32";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reduce {
    Max,
    Average { count_include_pad: bool },
}

impl Reduce {
    #[inline]
    fn init(self) -> f32 {
        match self {
            Reduce::Max => f32::MIN,
            Reduce::Average { .. } => 0.0,
        }
    }

    #[inline]
    fn accumulate(self, acc: f32, row: &[f32]) -> f32 {
        match self {
            Reduce::Max => row
                .iter()
                .fold(acc, |best, &value| if value > best { value } else { best }),
            Reduce::Average { .. } => row.iter().fold(acc, |sum, &value| sum + value),
        }
    }

    #[inline]
    fn finish(self, acc: f32, valid: usize, padded: usize) -> f32 {
        match self {
            Reduce::Max => acc,
            Reduce::Average { .. } if valid == 0 => 0.0,
            Reduce::Average { count_include_pad } => {
                let divisor = if count_include_pad { padded } else { valid };
                acc / divisor as f32
            }
        }
    }
}

/// Clamped window along one axis for one output position.
#[derive(Debug, Clone, Copy)]
struct Span {
    begin: usize,
    end: usize,
    /// Window length inside the padded extent.
    padded: usize,
}

impl Span {
    #[inline]
    fn len(self) -> usize {
        self.end - self.begin
    }
}

fn spans(geometry: &PoolGeometry, dim: usize) -> Vec<Span> {
    let input = geometry.input_spatial[dim] as isize;
    let kernel = geometry.kernel[dim] as isize;
    let limit = geometry.padded_limit(dim);
    (0..geometry.output_spatial[dim])
        .map(|out| {
            let start = geometry.window_start(dim, out);
            let stop = start + kernel;
            Span {
                begin: start.clamp(0, input) as usize,
                end: stop.clamp(0, input) as usize,
                padded: (stop.min(limit) - start).max(0) as usize,
            }
        })
        .collect()
}

fn pool1d(reduce: Reduce, [sh]: &[Vec<Span>; 1], x: &[f32], y: &mut [f32]) {
    for (out, s) in y.iter_mut().zip(sh) {
        let acc = reduce.accumulate(reduce.init(), &x[s.begin..s.end]);
        *out = reduce.finish(acc, s.len(), s.padded);
    }
}

fn pool2d(reduce: Reduce, [sh, sw]: &[Vec<Span>; 2], width: usize, x: &[f32], y: &mut [f32]) {
    let mut out = y.iter_mut();
    for h in sh {
        for w in sw {
            let mut acc = reduce.init();
            for row in h.begin..h.end {
                let base = row * width;
                acc = reduce.accumulate(acc, &x[base + w.begin..base + w.end]);
            }
            if let Some(slot) = out.next() {
                *slot = reduce.finish(acc, h.len() * w.len(), h.padded * w.padded);
            }
        }
    }
}

fn pool3d(
    reduce: Reduce,
    [sh, sw, sd]: &[Vec<Span>; 3],
    [width, depth]: [usize; 2],
    x: &[f32],
    y: &mut [f32],
) {
    let mut out = y.iter_mut();
    for h in sh {
        for w in sw {
            for d in sd {
                let mut acc = reduce.init();
                for ih in h.begin..h.end {
                    for iw in w.begin..w.end {
                        let base = (ih * width + iw) * depth;
                        acc = reduce.accumulate(acc, &x[base + d.begin..base + d.end]);
                    }
                }
                if let Some(slot) = out.next() {
                    *slot = reduce.finish(
                        acc,
                        h.len() * w.len() * d.len(),
                        h.padded * w.padded * d.padded,
                    );
                }
            }
        }
    }
}

/// f32 max/average pooling without dilation or argmax output.
pub struct FastF32Kernel {
    runner: PlaneRunner,
}

impl FastF32Kernel {
    pub fn new(config: ParallelConfig) -> PoolResult<Self> {
        Ok(Self::with_runner(PlaneRunner::new(config)?))
    }

    pub fn serial() -> Self {
        Self::with_runner(PlaneRunner::serial())
    }

    pub(crate) fn with_runner(runner: PlaneRunner) -> Self {
        FastF32Kernel { runner }
    }
}

impl PoolKernel for FastF32Kernel {
    fn name(&self) -> &'static str {
        FAST_F32_KERNEL_NAME
    }

    fn supports(&self, ctx: &PoolContext<'_>) -> bool {
        let kind_ok = matches!(
            ctx.kind,
            PoolKind::Max {
                storage_order: StorageOrder::RowMajor
            } | PoolKind::Average { .. }
        );
        kind_ok
            && ctx.dtype() == DType::F32
            && !ctx.want_indices
            && !ctx.geometry.has_dilation()
    }

    fn compute(&self, ctx: &PoolContext<'_>) -> PoolResult<PoolOutputs> {
        let reduce = match ctx.kind {
            PoolKind::Max { .. } => Reduce::Max,
            PoolKind::Average { count_include_pad } => Reduce::Average { count_include_pad },
            PoolKind::Lp { .. } => {
                return Err(PoolError::invalid_argument(format!(
                    "{FAST_F32_KERNEL_NAME} cannot run {}",
                    ctx.op_type
                )))
            }
        };
        let geometry = ctx.geometry;
        let x = ctx.input.as_slice::<f32>()?;
        let x_step = geometry.x_step();
        let dims = &geometry.input_spatial;
        let mut y = vec![0.0f32; geometry.output_len()];

        match geometry.spatial_rank() {
            1 => {
                let plan = [spans(geometry, 0)];
                self.runner.for_each_plane(geometry, &mut y, |plane, y_plane| {
                    pool1d(reduce, &plan, &x[plane * x_step..(plane + 1) * x_step], y_plane);
                });
            }
            2 => {
                let plan = [spans(geometry, 0), spans(geometry, 1)];
                self.runner.for_each_plane(geometry, &mut y, |plane, y_plane| {
                    let x_plane = &x[plane * x_step..(plane + 1) * x_step];
                    pool2d(reduce, &plan, dims[1], x_plane, y_plane);
                });
            }
            3 => {
                let plan = [spans(geometry, 0), spans(geometry, 1), spans(geometry, 2)];
                self.runner.for_each_plane(geometry, &mut y, |plane, y_plane| {
                    let x_plane = &x[plane * x_step..(plane + 1) * x_step];
                    pool3d(reduce, &plan, [dims[1], dims[2]], x_plane, y_plane);
                });
            }
            rank => return Err(PoolError::UnsupportedRank { rank }),
        }

        Ok(PoolOutputs {
            values: Tensor::from_f32(Shape::try_new(geometry.output_dims())?, y)?,
            indices: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_divisor_counts_padding_only_inside_the_padded_extent() {
        let include = Reduce::Average {
            count_include_pad: true,
        };
        let exclude = Reduce::Average {
            count_include_pad: false,
        };
        assert_eq!(include.finish(6.0, 2, 3), 2.0);
        assert_eq!(exclude.finish(6.0, 2, 3), 3.0);
        assert_eq!(exclude.finish(0.0, 0, 0), 0.0);
    }

    #[test]
    fn max_ignores_nan_after_a_real_value() {
        let acc = Reduce::Max.accumulate(Reduce::Max.init(), &[1.0, f32::NAN, 0.5]);
        assert_eq!(acc, 1.0);
    }
}
