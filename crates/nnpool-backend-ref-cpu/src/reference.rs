//! General N-d window reducer: every element type, dilation, argmax indices.

use nnpool::ops::{PoolContext, PoolKernel, StorageOrder};
use nnpool::tensor::{FloatElement, PoolElement};
use nnpool::{DType, ParallelConfig, PoolError, PoolKind, PoolOutputs, PoolResult, Shape, Tensor};

use crate::parallel::PlaneRunner;
use crate::window::WindowPlan;

/// Name under which the reducer is registered for every pooling family.
pub const REFERENCE_KERNEL_NAME: &str = "reference";

/// Taps of one output position, one slice per (unit-padded) axis.
type Taps<'a> = [&'a [usize]; 3];

/// Walks output positions of one plane in row-major order, passing the flat output offset,
/// the per-axis output coordinates and the window taps.
#[inline]
fn for_each_window(plan: &WindowPlan, mut f: impl FnMut(usize, [usize; 3], Taps<'_>)) {
    let [oh_count, ow_count, od_count] = plan.output;
    let [axis_h, axis_w, axis_d] = &plan.axes;
    let mut out = 0;
    for oh in 0..oh_count {
        let hs = axis_h.taps(oh);
        for ow in 0..ow_count {
            let ws = axis_w.taps(ow);
            for od in 0..od_count {
                f(out, [oh, ow, od], [hs, ws, axis_d.taps(od)]);
                out += 1;
            }
        }
    }
}

/// Maximum over the valid taps and the coordinates it was found at.
///
/// Only a strictly greater value replaces the accumulator, so NaN inputs never win and
/// ties keep the first position in row-major order.
#[inline]
fn window_max<T: PoolElement>(
    plan: &WindowPlan,
    x: &[T],
    [hs, ws, ds]: Taps<'_>,
) -> (T, Option<[usize; 3]>) {
    let mut best = T::lowest();
    let mut at = None;
    for &h in hs {
        for &w in ws {
            for &d in ds {
                let value = x[plan.row_major(h, w, d)];
                if value > best {
                    best = value;
                    at = Some([h, w, d]);
                }
            }
        }
    }
    (best, at)
}

#[inline]
fn window_fold<T: FloatElement>(
    plan: &WindowPlan,
    x: &[T],
    [hs, ws, ds]: Taps<'_>,
    mut fold: impl FnMut(f64, f64) -> f64,
) -> f64 {
    let mut acc = 0.0;
    for &h in hs {
        for &w in ws {
            for &d in ds {
                acc = fold(acc, x[plan.row_major(h, w, d)].to_f64());
            }
        }
    }
    acc
}

fn valid_taps([hs, ws, ds]: Taps<'_>) -> usize {
    hs.len() * ws.len() * ds.len()
}

fn output_shape(ctx: &PoolContext<'_>) -> PoolResult<Shape> {
    Shape::try_new(ctx.geometry.output_dims())
}

fn unsupported(ctx: &PoolContext<'_>) -> PoolError {
    PoolError::UnsupportedType {
        op: ctx.op_type.name(),
        dtype: ctx.dtype(),
    }
}

/// Reference pooling kernel registered for max, average and Lp pooling.
pub struct ReferenceKernel {
    runner: PlaneRunner,
}

impl ReferenceKernel {
    pub fn new(config: ParallelConfig) -> PoolResult<Self> {
        Ok(Self::with_runner(PlaneRunner::new(config)?))
    }

    pub fn serial() -> Self {
        Self::with_runner(PlaneRunner::serial())
    }

    pub(crate) fn with_runner(runner: PlaneRunner) -> Self {
        ReferenceKernel { runner }
    }

    fn max<T: PoolElement>(
        &self,
        ctx: &PoolContext<'_>,
        order: StorageOrder,
    ) -> PoolResult<PoolOutputs> {
        let geometry = ctx.geometry;
        let x = ctx.input.as_slice::<T>()?;
        let plan = WindowPlan::new(geometry);
        let x_step = geometry.x_step();
        let mut y = vec![T::lowest(); geometry.output_len()];

        let indices = if ctx.want_indices {
            let mut indices = vec![-1i64; y.len()];
            self.runner.for_each_plane_with_indices(
                geometry,
                &mut y,
                &mut indices,
                |plane, y_plane, idx_plane| {
                    let x_plane = &x[plane * x_step..(plane + 1) * x_step];
                    let base = (plane * x_step) as i64;
                    for_each_window(&plan, |out, _, taps| {
                        let (value, at) = window_max(&plan, x_plane, taps);
                        y_plane[out] = value;
                        idx_plane[out] = match at {
                            Some([h, w, d]) => {
                                let offset = match order {
                                    StorageOrder::RowMajor => plan.row_major(h, w, d),
                                    StorageOrder::ColumnMajor => plan.column_major(h, w, d),
                                };
                                base + offset as i64
                            }
                            None => -1,
                        };
                    });
                },
            );
            Some(indices)
        } else {
            self.runner.for_each_plane(geometry, &mut y, |plane, y_plane| {
                let x_plane = &x[plane * x_step..(plane + 1) * x_step];
                for_each_window(&plan, |out, _, taps| {
                    y_plane[out] = window_max(&plan, x_plane, taps).0;
                });
            });
            None
        };

        let shape = output_shape(ctx)?;
        Ok(PoolOutputs {
            indices: indices
                .map(|values| Tensor::from_i64(shape.clone(), values))
                .transpose()?,
            values: Tensor::from_vec(shape, y)?,
        })
    }

    fn average<T: FloatElement>(
        &self,
        ctx: &PoolContext<'_>,
        count_include_pad: bool,
    ) -> PoolResult<PoolOutputs> {
        let geometry = ctx.geometry;
        let x = ctx.input.as_slice::<T>()?;
        let plan = WindowPlan::new(geometry);
        let x_step = geometry.x_step();
        let [axis_h, axis_w, axis_d] = &plan.axes;
        let mut y = vec![T::zero(); geometry.output_len()];

        self.runner.for_each_plane(geometry, &mut y, |plane, y_plane| {
            let x_plane = &x[plane * x_step..(plane + 1) * x_step];
            for_each_window(&plan, |out, [oh, ow, od], taps| {
                let valid = valid_taps(taps);
                if valid == 0 {
                    y_plane[out] = T::zero();
                    return;
                }
                let divisor = if count_include_pad {
                    axis_h.padded_count(oh) * axis_w.padded_count(ow) * axis_d.padded_count(od)
                } else {
                    valid
                };
                let sum = window_fold(&plan, x_plane, taps, |acc, v| acc + v);
                y_plane[out] = T::from_f64(sum / divisor as f64);
            });
        });

        Ok(PoolOutputs {
            values: Tensor::from_vec(output_shape(ctx)?, y)?,
            indices: None,
        })
    }

    fn lp<T: FloatElement>(&self, ctx: &PoolContext<'_>, p: u32) -> PoolResult<PoolOutputs> {
        let geometry = ctx.geometry;
        let x = ctx.input.as_slice::<T>()?;
        let plan = WindowPlan::new(geometry);
        let x_step = geometry.x_step();
        let exponent = p as f64;
        let mut y = vec![T::zero(); geometry.output_len()];

        self.runner.for_each_plane(geometry, &mut y, |plane, y_plane| {
            let x_plane = &x[plane * x_step..(plane + 1) * x_step];
            for_each_window(&plan, |out, _, taps| {
                let norm = match p {
                    1 => window_fold(&plan, x_plane, taps, |acc, v| acc + v.abs()),
                    2 => window_fold(&plan, x_plane, taps, |acc, v| acc + v * v).sqrt(),
                    _ => window_fold(&plan, x_plane, taps, |acc, v| {
                        acc + v.abs().powf(exponent)
                    })
                    .powf(exponent.recip()),
                };
                y_plane[out] = T::from_f64(norm);
            });
        });

        Ok(PoolOutputs {
            values: Tensor::from_vec(output_shape(ctx)?, y)?,
            indices: None,
        })
    }
}

impl PoolKernel for ReferenceKernel {
    fn name(&self) -> &'static str {
        REFERENCE_KERNEL_NAME
    }

    fn supports(&self, ctx: &PoolContext<'_>) -> bool {
        match ctx.kind {
            PoolKind::Max { .. } => matches!(
                ctx.dtype(),
                DType::F32 | DType::F64 | DType::I8 | DType::U8
            ),
            PoolKind::Average { .. } | PoolKind::Lp { .. } => {
                !ctx.want_indices && ctx.dtype().is_float()
            }
        }
    }

    fn compute(&self, ctx: &PoolContext<'_>) -> PoolResult<PoolOutputs> {
        match ctx.kind {
            PoolKind::Max { storage_order } => match ctx.dtype() {
                DType::F32 => self.max::<f32>(ctx, storage_order),
                DType::F64 => self.max::<f64>(ctx, storage_order),
                DType::I8 => self.max::<i8>(ctx, storage_order),
                DType::U8 => self.max::<u8>(ctx, storage_order),
                DType::I64 => Err(unsupported(ctx)),
            },
            PoolKind::Average { count_include_pad } => match ctx.dtype() {
                DType::F32 => self.average::<f32>(ctx, count_include_pad),
                DType::F64 => self.average::<f64>(ctx, count_include_pad),
                _ => Err(unsupported(ctx)),
            },
            PoolKind::Lp { p } => match ctx.dtype() {
                DType::F32 => self.lp::<f32>(ctx, p),
                DType::F64 => self.lp::<f64>(ctx, p),
                _ => Err(unsupported(ctx)),
            },
        }
    }
}
