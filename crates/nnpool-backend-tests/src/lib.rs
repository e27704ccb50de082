//! Backend-agnostic pooling conformance suite.
//!
//! A backend instantiates every test with [`define_backend_tests!`], passing a factory that
//! turns [`KernelOverrides`](nnpool::ops::KernelOverrides) into a registry holding its kernels.

pub mod harness;
pub mod naive;
pub mod parity;
pub mod smoke;

#[macro_export]
macro_rules! define_backend_tests {
    ($module:ident, $factory:expr) => {
        #[cfg(test)]
        mod $module {
            use $crate::{parity, smoke};

            fn registry() -> ::nnpool::ops::KernelRegistryHandle {
                ($factory)(::nnpool::ops::KernelOverrides::default())
            }

            macro_rules! smoke_test {
                ($name:ident) => {
                    #[test]
                    fn $name() {
                        smoke::$name(&registry());
                    }
                };
            }

            macro_rules! parity_test {
                ($name:ident) => {
                    #[test]
                    fn $name() {
                        parity::$name(&$factory);
                    }
                };
            }

            smoke_test!(max_pool_2d_with_indices);
            smoke_test!(max_pool_column_major_indices);
            smoke_test!(max_pool_padding_never_contributes);
            smoke_test!(max_pool_nan_never_wins);
            smoke_test!(max_pool_dilation_and_ceil_mode);
            smoke_test!(max_pool_indices_are_offset_by_plane);
            smoke_test!(max_pool_integer_and_double_inputs);
            smoke_test!(windows_without_valid_taps);
            smoke_test!(max_pool_all_lowest_window_has_no_index);
            smoke_test!(average_pool_include_and_exclude_pad);
            smoke_test!(average_pool_ceil_mode_counts_only_the_padded_extent);
            smoke_test!(average_pool_same_upper);
            smoke_test!(average_pool_dilation);
            smoke_test!(lp_pool_norms);
            smoke_test!(lp_pool_dilation_and_ceil_mode);
            smoke_test!(global_pools_reduce_every_spatial_dim);
            smoke_test!(zero_sized_batch_returns_empty_outputs);
            smoke_test!(invalid_calls_are_rejected);

            parity_test!(max_pool_matches_oracle);
            parity_test!(average_pool_matches_oracle);
            parity_test!(lp_pool_matches_oracle);
            parity_test!(global_pools_match_oracle);
            parity_test!(large_inputs_match_oracle);
            parity_test!(every_family_has_a_default_kernel);
        }
    };
}
