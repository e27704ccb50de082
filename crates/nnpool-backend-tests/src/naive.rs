//! Brute-force pooling oracle.
//!
//! Walks every kernel tap of every output element with plain N-d index arithmetic, in `f64`.
//! Slow, but shares no window bookkeeping with the backends it checks.

use nnpool::ops::StorageOrder;
use nnpool::{PoolGeometry, PoolKind};

#[derive(Debug, Clone, PartialEq)]
pub struct Expected {
    pub values: Vec<f64>,
    /// Flat argmax offsets for max pooling, `-1` for windows without a valid tap.
    pub indices: Vec<i64>,
}

fn unravel(mut flat: usize, dims: &[usize]) -> Vec<usize> {
    let mut coord = vec![0; dims.len()];
    for axis in (0..dims.len()).rev() {
        coord[axis] = flat % dims[axis];
        flat /= dims[axis];
    }
    coord
}

fn ravel(coord: &[usize], dims: &[usize], order: StorageOrder) -> usize {
    match order {
        StorageOrder::RowMajor => coord
            .iter()
            .zip(dims)
            .fold(0, |acc, (&c, &d)| acc * d + c),
        StorageOrder::ColumnMajor => coord
            .iter()
            .zip(dims)
            .rev()
            .fold(0, |acc, (&c, &d)| acc * d + c),
    }
}

/// Expected outputs of `kind` over `x` laid out as `[N, C, spatial...]`.
///
/// `lowest` seeds the max accumulator; only strictly greater inputs replace it, so a window
/// whose inputs never exceed it reports `lowest` with index `-1`.
pub fn pool(kind: PoolKind, geometry: &PoolGeometry, x: &[f64], lowest: f64) -> Expected {
    let rank = geometry.spatial_rank();
    let input = geometry.input_spatial.as_slice();
    let x_step = geometry.x_step();
    let mut values = Vec::with_capacity(geometry.output_len());
    let mut indices = Vec::with_capacity(geometry.output_len());

    for plane in 0..geometry.total_channels() {
        let x_plane = &x[plane * x_step..(plane + 1) * x_step];
        for out in 0..geometry.y_step() {
            let out_coord = unravel(out, &geometry.output_spatial);
            let mut best = lowest;
            let mut argmax: Option<Vec<usize>> = None;
            let mut sum = 0.0;
            let mut valid = 0usize;
            let mut padded = 0usize;

            for tap in 0..geometry.kernel_volume() {
                let tap_coord = unravel(tap, &geometry.kernel);
                let pos: Vec<isize> = (0..rank)
                    .map(|d| {
                        (out_coord[d] * geometry.strides[d]) as isize
                            - geometry.pads_begin[d] as isize
                            + (tap_coord[d] * geometry.dilations[d]) as isize
                    })
                    .collect();
                let in_padded = (0..rank).all(|d| {
                    pos[d] >= -(geometry.pads_begin[d] as isize)
                        && pos[d] < (input[d] + geometry.pads_end[d]) as isize
                });
                if in_padded {
                    padded += 1;
                }
                if !(0..rank).all(|d| pos[d] >= 0 && pos[d] < input[d] as isize) {
                    continue;
                }
                let coord: Vec<usize> = pos.iter().map(|&p| p as usize).collect();
                let value = x_plane[ravel(&coord, input, StorageOrder::RowMajor)];
                valid += 1;
                match kind {
                    PoolKind::Max { .. } => {
                        if value > best {
                            best = value;
                            argmax = Some(coord);
                        }
                    }
                    PoolKind::Average { .. } => sum += value,
                    PoolKind::Lp { p } => sum += value.abs().powf(p as f64),
                }
            }

            match kind {
                PoolKind::Max { storage_order } => {
                    values.push(best);
                    indices.push(match argmax {
                        Some(coord) => (plane * x_step + ravel(&coord, input, storage_order)) as i64,
                        None => -1,
                    });
                }
                PoolKind::Average { count_include_pad } => {
                    let divisor = if count_include_pad { padded } else { valid };
                    values.push(if valid == 0 { 0.0 } else { sum / divisor as f64 });
                }
                PoolKind::Lp { p } => values.push(sum.powf(1.0 / p as f64)),
            }
        }
    }

    Expected { values, indices }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ravel_orders_match_storage_order() {
        let dims = [2, 3, 4];
        assert_eq!(unravel(23, &dims), vec![1, 2, 3]);
        assert_eq!(ravel(&[1, 2, 3], &dims, StorageOrder::RowMajor), 23);
        assert_eq!(ravel(&[1, 2, 3], &dims, StorageOrder::ColumnMajor), 1 + 2 * 2 + 3 * 6);
    }
}
