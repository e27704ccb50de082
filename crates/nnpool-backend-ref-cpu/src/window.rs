//! Precomputed per-axis window taps for the general reducer.
//!
//! Every geometry is lifted to three spatial axes: missing trailing axes get a single input
//! element, a single output position and one tap at coordinate 0, so the reference kernels only
//! ever walk a `h x w x d` window.

use nnpool::ops::MAX_SPATIAL_RANK;
use nnpool::PoolGeometry;

/// Valid input coordinates for every output position along one axis.
#[derive(Debug, Clone)]
pub(crate) struct AxisTaps {
    coords: Vec<usize>,
    /// `coords[ranges[o].0..ranges[o].1]` are the in-bounds taps of output position `o`.
    ranges: Vec<(usize, usize)>,
    /// Taps of output position `o` lying inside `[-pad_begin, in + pad_end)`.
    padded_counts: Vec<usize>,
}

impl AxisTaps {
    fn unit() -> Self {
        AxisTaps {
            coords: vec![0],
            ranges: vec![(0, 1)],
            padded_counts: vec![1],
        }
    }

    fn build(geometry: &PoolGeometry, dim: usize) -> Self {
        let input = geometry.input_spatial[dim] as isize;
        let padded_begin = -(geometry.pads_begin[dim] as isize);
        let padded_end = geometry.padded_limit(dim);
        let kernel = geometry.kernel[dim];
        let dilation = geometry.dilations[dim] as isize;
        let outputs = geometry.output_spatial[dim];

        let mut coords = Vec::with_capacity(outputs * kernel);
        let mut ranges = Vec::with_capacity(outputs);
        let mut padded_counts = Vec::with_capacity(outputs);
        for out in 0..outputs {
            let start = geometry.window_start(dim, out);
            let first = coords.len();
            let mut padded = 0;
            for tap in 0..kernel as isize {
                let pos = start + tap * dilation;
                if pos >= padded_begin && pos < padded_end {
                    padded += 1;
                }
                if pos < 0 || pos >= input {
                    continue;
                }
                coords.push(pos as usize);
            }
            ranges.push((first, coords.len()));
            padded_counts.push(padded);
        }
        AxisTaps {
            coords,
            ranges,
            padded_counts,
        }
    }

    #[inline]
    pub(crate) fn taps(&self, out: usize) -> &[usize] {
        let (begin, end) = self.ranges[out];
        &self.coords[begin..end]
    }

    #[inline]
    pub(crate) fn padded_count(&self, out: usize) -> usize {
        self.padded_counts[out]
    }
}

/// Window taps for all three (possibly unit) axes of a geometry.
#[derive(Debug, Clone)]
pub(crate) struct WindowPlan {
    pub(crate) axes: [AxisTaps; MAX_SPATIAL_RANK],
    /// Input extents, unit-padded to three axes.
    pub(crate) input: [usize; MAX_SPATIAL_RANK],
    /// Output extents, unit-padded to three axes.
    pub(crate) output: [usize; MAX_SPATIAL_RANK],
}

impl WindowPlan {
    pub(crate) fn new(geometry: &PoolGeometry) -> Self {
        let rank = geometry.spatial_rank();
        let mut input = [1; MAX_SPATIAL_RANK];
        let mut output = [1; MAX_SPATIAL_RANK];
        input[..rank].copy_from_slice(&geometry.input_spatial);
        output[..rank].copy_from_slice(&geometry.output_spatial);
        let axes = std::array::from_fn(|dim| {
            if dim < rank {
                AxisTaps::build(geometry, dim)
            } else {
                AxisTaps::unit()
            }
        });
        WindowPlan {
            axes,
            input,
            output,
        }
    }

    /// Row-major (last axis fastest) offset within one input plane.
    #[inline]
    pub(crate) fn row_major(&self, h: usize, w: usize, d: usize) -> usize {
        (h * self.input[1] + w) * self.input[2] + d
    }

    /// Column-major (first axis fastest) offset within one input plane.
    #[inline]
    pub(crate) fn column_major(&self, h: usize, w: usize, d: usize) -> usize {
        h + (w + d * self.input[1]) * self.input[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nnpool::{AutoPad, PoolAttributes};

    fn geometry(
        kernel: &[usize],
        strides: &[usize],
        pads: &[usize],
        dilations: &[usize],
        ceil_mode: bool,
        input: &[usize],
    ) -> PoolGeometry {
        let attrs = PoolAttributes {
            global_pooling: false,
            kernel_shape: kernel.to_vec(),
            strides: strides.to_vec(),
            pads: pads.to_vec(),
            dilations: dilations.to_vec(),
            auto_pad: AutoPad::NotSet,
            ceil_mode,
            storage_order: Default::default(),
            count_include_pad: false,
            p: 2,
        };
        PoolGeometry::resolve(&attrs, input).unwrap()
    }

    #[test]
    fn taps_skip_padding_but_padded_counts_keep_it() {
        let g = geometry(&[3], &[2], &[1, 1], &[1], false, &[1, 1, 5]);
        let plan = WindowPlan::new(&g);
        assert_eq!(plan.output, [3, 1, 1]);
        assert_eq!(plan.axes[0].taps(0), &[0, 1]);
        assert_eq!(plan.axes[0].taps(1), &[1, 2, 3]);
        assert_eq!(plan.axes[0].taps(2), &[3, 4]);
        assert_eq!(plan.axes[0].padded_count(0), 3);
        assert_eq!(plan.axes[0].padded_count(2), 3);
        assert_eq!(plan.axes[1].taps(0), &[0]);
    }

    #[test]
    fn ceil_mode_windows_stop_counting_past_tail_padding() {
        // in 5, k 2, s 2, ceil: the last window covers [4, 6) and only 4 is inside the extent.
        let g = geometry(&[2], &[2], &[0, 0], &[1], true, &[1, 1, 5]);
        let plan = WindowPlan::new(&g);
        assert_eq!(plan.output[0], 3);
        assert_eq!(plan.axes[0].taps(2), &[4]);
        assert_eq!(plan.axes[0].padded_count(2), 1);
    }

    #[test]
    fn dilated_taps_are_strided() {
        let g = geometry(&[2, 2], &[1, 1], &[0, 0, 0, 0], &[2, 3], false, &[1, 1, 4, 5]);
        let plan = WindowPlan::new(&g);
        assert_eq!(plan.output, [2, 2, 1]);
        assert_eq!(plan.axes[0].taps(1), &[1, 3]);
        assert_eq!(plan.axes[1].taps(1), &[1, 4]);
    }

    #[test]
    fn offsets_follow_storage_order() {
        let g = geometry(&[1, 1, 1], &[1, 1, 1], &[0; 6], &[1, 1, 1], false, &[1, 1, 2, 3, 4]);
        let plan = WindowPlan::new(&g);
        assert_eq!(plan.row_major(1, 2, 3), 12 + 8 + 3);
        assert_eq!(plan.column_major(1, 2, 3), 1 + 2 * 2 + 3 * 6);
    }
}
