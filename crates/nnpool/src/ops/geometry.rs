//! Output-size computation and the resolved window layout shared by every kernel.

use smallvec::SmallVec;

use crate::error::{PoolError, PoolResult};

use super::attrs::{AutoPad, PoolAttributes};

/// Per-spatial-dimension values; pooling is limited to three spatial dims.
pub type SpatialDims = SmallVec<[usize; 3]>;

/// Largest spatial rank the kernels handle (1-D, 2-D and 3-D pooling).
pub const MAX_SPATIAL_RANK: usize = 3;

/// Fully resolved pooling layout for one `[N, C, spatial...]` input.
///
/// All window parameters are explicit here: global pooling and `auto_pad` have already been
/// expanded into kernel/stride/pad values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolGeometry {
    pub batch: usize,
    pub channels: usize,
    pub input_spatial: SpatialDims,
    pub output_spatial: SpatialDims,
    pub kernel: SpatialDims,
    pub strides: SpatialDims,
    pub dilations: SpatialDims,
    pub pads_begin: SpatialDims,
    pub pads_end: SpatialDims,
}

impl PoolGeometry {
    pub fn resolve(attrs: &PoolAttributes, input_dims: &[usize]) -> PoolResult<Self> {
        if input_dims.len() < 3 {
            return Err(PoolError::invalid_argument(format!(
                "Input dimension cannot be less than 3, got shape {input_dims:?}"
            )));
        }
        let spatial_rank = input_dims.len() - 2;
        if spatial_rank > MAX_SPATIAL_RANK {
            return Err(PoolError::UnsupportedRank { rank: spatial_rank });
        }
        let input_spatial: SpatialDims = input_dims[2..].iter().copied().collect();

        if attrs.global_pooling {
            let ones: SpatialDims = SmallVec::from_elem(1, spatial_rank);
            let zeros: SpatialDims = SmallVec::from_elem(0, spatial_rank);
            return Ok(PoolGeometry {
                batch: input_dims[0],
                channels: input_dims[1],
                kernel: input_spatial.clone(),
                input_spatial,
                output_spatial: ones.clone(),
                strides: ones.clone(),
                dilations: ones,
                pads_begin: zeros.clone(),
                pads_end: zeros,
            });
        }

        if attrs.kernel_shape.len() != spatial_rank {
            return Err(PoolError::invalid_argument(format!(
                "kernel_shape num_dims ({}) is not compatible with X num_dims ({})",
                attrs.kernel_shape.len(),
                input_dims.len()
            )));
        }

        let mut output_spatial = SpatialDims::new();
        let mut pads_begin = SpatialDims::new();
        let mut pads_end = SpatialDims::new();
        for dim in 0..spatial_rank {
            let extent = DimExtent {
                input: input_spatial[dim],
                kernel: attrs.kernel_shape[dim],
                stride: attrs.strides[dim],
                dilation: attrs.dilations[dim],
            };
            let (head, tail, out) = extent.resolve(
                attrs.auto_pad,
                attrs.pads[dim],
                attrs.pads[dim + spatial_rank],
                attrs.ceil_mode,
            )?;
            pads_begin.push(head);
            pads_end.push(tail);
            output_spatial.push(out);
        }

        let geometry = PoolGeometry {
            batch: input_dims[0],
            channels: input_dims[1],
            input_spatial,
            output_spatial,
            kernel: attrs.kernel_shape.iter().copied().collect(),
            strides: attrs.strides.iter().copied().collect(),
            dilations: attrs.dilations.iter().copied().collect(),
            pads_begin,
            pads_end,
        };
        log::trace!(
            "pool geometry: input {:?} -> output {:?} (kernel {:?}, strides {:?}, pads {:?}/{:?})",
            input_dims,
            geometry.output_dims(),
            geometry.kernel,
            geometry.strides,
            geometry.pads_begin,
            geometry.pads_end
        );
        Ok(geometry)
    }

    pub fn spatial_rank(&self) -> usize {
        self.input_spatial.len()
    }

    /// `[N, C, out_spatial...]`.
    pub fn output_dims(&self) -> Vec<usize> {
        let mut dims = Vec::with_capacity(2 + self.spatial_rank());
        dims.push(self.batch);
        dims.push(self.channels);
        dims.extend_from_slice(&self.output_spatial);
        dims
    }

    /// Number of independent `N * C` planes.
    pub fn total_channels(&self) -> usize {
        self.batch * self.channels
    }

    /// Elements per input plane.
    pub fn x_step(&self) -> usize {
        self.input_spatial.iter().product()
    }

    /// Elements per output plane.
    pub fn y_step(&self) -> usize {
        self.output_spatial.iter().product()
    }

    pub fn output_len(&self) -> usize {
        self.total_channels() * self.y_step()
    }

    pub fn kernel_volume(&self) -> usize {
        self.kernel.iter().product()
    }

    pub fn has_dilation(&self) -> bool {
        self.dilations.iter().any(|&d| d > 1)
    }

    /// First (possibly negative) input coordinate covered by output index `out` along `dim`.
    #[inline]
    pub fn window_start(&self, dim: usize, out: usize) -> isize {
        (out * self.strides[dim]) as isize - self.pads_begin[dim] as isize
    }

    /// Exclusive end of the padded input extent along `dim`.
    #[inline]
    pub fn padded_limit(&self, dim: usize) -> isize {
        (self.input_spatial[dim] + self.pads_end[dim]) as isize
    }

    /// Rough amount of work, used to decide whether a parallel fan-out is worthwhile.
    pub fn cost(&self) -> u64 {
        (self.output_len() as u64).saturating_mul(self.kernel_volume() as u64)
    }
}

struct DimExtent {
    input: usize,
    kernel: usize,
    stride: usize,
    dilation: usize,
}

impl DimExtent {
    fn effective_kernel(&self) -> i64 {
        (self.dilation * (self.kernel - 1) + 1) as i64
    }

    /// Returns `(pad_head, pad_tail, output_size)`.
    fn resolve(
        &self,
        auto_pad: AutoPad,
        pad_head: usize,
        pad_tail: usize,
        ceil_mode: bool,
    ) -> PoolResult<(usize, usize, usize)> {
        match auto_pad {
            AutoPad::NotSet => {
                let out = self.output_size(pad_head, pad_tail, ceil_mode)?;
                Ok((pad_head, pad_tail, out))
            }
            AutoPad::Valid => {
                let out = self.output_size(0, 0, ceil_mode)?;
                Ok((0, 0, out))
            }
            AutoPad::SameUpper | AutoPad::SameLower => {
                let input = self.input as i64;
                let stride = self.stride as i64;
                let target = (input + stride - 1) / stride;
                let pad_needed = ((target - 1) * stride + self.effective_kernel() - input).max(0);
                let head = if auto_pad == AutoPad::SameLower {
                    (pad_needed + 1) / 2
                } else {
                    pad_needed / 2
                };
                let tail = pad_needed - head;
                let (head, tail) = (head as usize, tail as usize);
                let out = self.output_size(head, tail, ceil_mode)?;
                Ok((head, tail, out))
            }
        }
    }

    fn output_size(&self, pad_head: usize, pad_tail: usize, ceil_mode: bool) -> PoolResult<usize> {
        let span = (self.input + pad_head + pad_tail) as i64 - self.effective_kernel();
        let stride = self.stride as f64;
        let raw = span as f64 / stride + 1.0;
        let mut out = if ceil_mode {
            raw.ceil() as i64
        } else {
            raw.floor() as i64
        };
        // The last window has to start inside the input or its head padding.
        if ceil_mode && out > 0 && (out - 1) * self.stride as i64 >= (self.input + pad_head) as i64
        {
            out -= 1;
        }
        if out < 0 {
            return Err(PoolError::invalid_argument(format!(
                "pooling window (kernel {}, dilation {}) does not fit input extent {} with pads ({pad_head}, {pad_tail})",
                self.kernel, self.dilation, self.input
            )));
        }
        Ok(out as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(kernel: &[usize], strides: &[usize], pads: &[usize]) -> PoolAttributes {
        PoolAttributes {
            global_pooling: false,
            kernel_shape: kernel.to_vec(),
            strides: strides.to_vec(),
            pads: pads.to_vec(),
            dilations: vec![1; kernel.len()],
            auto_pad: AutoPad::NotSet,
            ceil_mode: false,
            storage_order: Default::default(),
            count_include_pad: false,
            p: 2,
        }
    }

    #[test]
    fn explicit_pads_floor_output() {
        let geometry =
            PoolGeometry::resolve(&attrs(&[3, 3], &[2, 2], &[1, 1, 1, 1]), &[2, 3, 7, 8]).unwrap();
        assert_eq!(geometry.output_dims(), vec![2, 3, 4, 4]);
        assert_eq!(geometry.total_channels(), 6);
        assert_eq!(geometry.x_step(), 56);
        assert_eq!(geometry.y_step(), 16);
        assert_eq!(geometry.window_start(0, 0), -1);
        assert_eq!(geometry.window_start(1, 2), 3);
    }

    #[test]
    fn ceil_mode_rounds_up_but_drops_windows_starting_in_tail_padding() {
        let mut a = attrs(&[2], &[2], &[0, 0]);
        a.ceil_mode = true;
        // (5 - 2) / 2 + 1 = 2.5 -> 3; last window starts at 4 < 5.
        let geometry = PoolGeometry::resolve(&a, &[1, 1, 5]).unwrap();
        assert_eq!(geometry.output_spatial.as_slice(), &[3]);

        // (5 + 1 - 3) / 2 + 1 = 2.5 -> 3; the third window starts at 4, still inside the input.
        let mut b = attrs(&[3], &[2], &[0, 1]);
        b.ceil_mode = true;
        let geometry = PoolGeometry::resolve(&b, &[1, 1, 5]).unwrap();
        assert_eq!(geometry.output_spatial.as_slice(), &[3]);

        // (4 - 1) / 2 + 1 = 2.5 -> 3, but the third window would start at 4 == in.
        let mut c = attrs(&[1], &[2], &[0, 0]);
        c.ceil_mode = true;
        let geometry = PoolGeometry::resolve(&c, &[1, 1, 4]).unwrap();
        assert_eq!(geometry.output_spatial.as_slice(), &[2]);
    }

    #[test]
    fn same_upper_and_lower_split_odd_padding_differently() {
        let mut upper = attrs(&[2, 2], &[1, 1], &[0, 0, 0, 0]);
        upper.auto_pad = AutoPad::SameUpper;
        let geometry = PoolGeometry::resolve(&upper, &[1, 1, 3, 3]).unwrap();
        assert_eq!(geometry.output_spatial.as_slice(), &[3, 3]);
        assert_eq!(geometry.pads_begin.as_slice(), &[0, 0]);
        assert_eq!(geometry.pads_end.as_slice(), &[1, 1]);

        let mut lower = upper.clone();
        lower.auto_pad = AutoPad::SameLower;
        let geometry = PoolGeometry::resolve(&lower, &[1, 1, 3, 3]).unwrap();
        assert_eq!(geometry.pads_begin.as_slice(), &[1, 1]);
        assert_eq!(geometry.pads_end.as_slice(), &[0, 0]);
    }

    #[test]
    fn same_padding_with_stride_targets_ceil_division() {
        let mut a = attrs(&[3], &[2], &[0, 0]);
        a.auto_pad = AutoPad::SameUpper;
        let geometry = PoolGeometry::resolve(&a, &[1, 1, 5]).unwrap();
        // ceil(5 / 2) = 3 outputs, pad_needed = (3-1)*2 + 3 - 5 = 2.
        assert_eq!(geometry.output_spatial.as_slice(), &[3]);
        assert_eq!(geometry.pads_begin.as_slice(), &[1]);
        assert_eq!(geometry.pads_end.as_slice(), &[1]);
    }

    #[test]
    fn valid_ignores_explicit_pads() {
        let mut a = attrs(&[2], &[1], &[1, 1]);
        a.auto_pad = AutoPad::Valid;
        let geometry = PoolGeometry::resolve(&a, &[1, 1, 4]).unwrap();
        assert_eq!(geometry.output_spatial.as_slice(), &[3]);
        assert_eq!(geometry.pads_begin.as_slice(), &[0]);
    }

    #[test]
    fn dilation_widens_the_effective_window() {
        let mut a = attrs(&[2, 2], &[1, 1], &[0, 0, 0, 0]);
        a.dilations = vec![2, 2];
        let geometry = PoolGeometry::resolve(&a, &[1, 1, 4, 4]).unwrap();
        assert_eq!(geometry.output_spatial.as_slice(), &[2, 2]);
        assert!(geometry.has_dilation());
    }

    #[test]
    fn global_pooling_collapses_every_spatial_dim() {
        let mut a = attrs(&[], &[], &[]);
        a.global_pooling = true;
        let geometry = PoolGeometry::resolve(&a, &[2, 4, 5, 6, 7]).unwrap();
        assert_eq!(geometry.output_dims(), vec![2, 4, 1, 1, 1]);
        assert_eq!(geometry.kernel.as_slice(), &[5, 6, 7]);
        assert_eq!(geometry.kernel_volume(), 210);
    }

    #[test]
    fn rank_errors_match_input_layout() {
        let a = attrs(&[2], &[1], &[0, 0]);
        assert!(matches!(
            PoolGeometry::resolve(&a, &[1, 1]),
            Err(PoolError::InvalidArgument(_))
        ));
        assert!(matches!(
            PoolGeometry::resolve(&a, &[1, 1, 2, 2, 2, 2]),
            Err(PoolError::UnsupportedRank { rank: 4 })
        ));
        assert!(matches!(
            PoolGeometry::resolve(&a, &[1, 1, 4, 4]),
            Err(PoolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn zero_sized_inputs_produce_empty_outputs() {
        let geometry = PoolGeometry::resolve(&attrs(&[1], &[1], &[0, 0]), &[1, 2, 0]).unwrap();
        assert_eq!(geometry.output_dims(), vec![1, 2, 0]);
        assert_eq!(geometry.output_len(), 0);
    }

    #[test]
    fn oversized_window_is_rejected() {
        let err = PoolGeometry::resolve(&attrs(&[4], &[1], &[0, 0]), &[1, 1, 1]).unwrap_err();
        assert!(matches!(err, PoolError::InvalidArgument(_)), "{err}");

        // Floor, not truncation: (1 - 4) / 2 + 1 = -0.5 rounds down to -1.
        let err = PoolGeometry::resolve(&attrs(&[4], &[2], &[0, 0]), &[1, 1, 1]).unwrap_err();
        assert!(matches!(err, PoolError::InvalidArgument(_)), "{err}");

        // Ceil mode rounds the same span up to an empty extent instead.
        let mut ceil = attrs(&[4], &[2], &[0, 0]);
        ceil.ceil_mode = true;
        let geometry = PoolGeometry::resolve(&ceil, &[1, 1, 1]).unwrap();
        assert_eq!(geometry.output_dims(), vec![1, 1, 0]);
    }
}
