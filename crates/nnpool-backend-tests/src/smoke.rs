//! Small hand-computed cases every backend must reproduce exactly.

use nnpool::{KernelRegistry, NodeAttributes, PoolError, PoolOperator, Shape, Tensor};

use crate::harness::{f32_tensor, indices, run, values_f32};

fn iota(len: usize) -> Vec<f32> {
    (0..len).map(|v| v as f32).collect()
}

fn max_2x2() -> NodeAttributes {
    NodeAttributes::new()
        .with_ints("kernel_shape", &[2, 2])
        .with_ints("strides", &[2, 2])
}

pub fn max_pool_2d_with_indices(registry: &KernelRegistry) {
    let x = f32_tensor(&[1, 1, 4, 4], (1..=16).map(|v| v as f32).collect());
    let out = run(registry, "MaxPool", 12, &max_2x2(), &x, true);
    assert_eq!(out.values.dims(), &[1, 1, 2, 2]);
    assert_eq!(values_f32(&out), vec![6.0, 8.0, 14.0, 16.0]);
    assert_eq!(indices(&out), vec![5, 7, 13, 15]);

    let without = run(registry, "MaxPool", 12, &max_2x2(), &x, false);
    assert!(without.indices.is_none());
    assert_eq!(values_f32(&without), values_f32(&out));
}

pub fn max_pool_column_major_indices(registry: &KernelRegistry) {
    let x = f32_tensor(&[1, 1, 4, 4], (1..=16).map(|v| v as f32).collect());
    let attrs = max_2x2().with_int("storage_order", 1);
    let out = run(registry, "MaxPool", 8, &attrs, &x, true);
    assert_eq!(values_f32(&out), vec![6.0, 8.0, 14.0, 16.0]);
    assert_eq!(indices(&out), vec![5, 13, 7, 15]);

    // Argmax at (h, w, d) = (1, 0, 0) of a 2x2x2 volume.
    let x = f32_tensor(&[1, 1, 2, 2, 2], vec![0.0, 1.0, 2.0, 3.0, 9.0, 5.0, 6.0, 7.0]);
    let cube = NodeAttributes::new().with_ints("kernel_shape", &[2, 2, 2]);
    let row = run(registry, "MaxPool", 12, &cube, &x, true);
    let col = run(
        registry,
        "MaxPool",
        12,
        &cube.clone().with_int("storage_order", 1),
        &x,
        true,
    );
    assert_eq!(values_f32(&row), vec![9.0]);
    assert_eq!(indices(&row), vec![4]);
    assert_eq!(indices(&col), vec![1]);
}

pub fn max_pool_padding_never_contributes(registry: &KernelRegistry) {
    let x = f32_tensor(&[1, 1, 3], vec![-3.0, -1.0, -2.0]);
    let attrs = NodeAttributes::new()
        .with_ints("kernel_shape", &[2])
        .with_ints("pads", &[1, 1]);
    let out = run(registry, "MaxPool", 12, &attrs, &x, true);
    assert_eq!(values_f32(&out), vec![-3.0, -1.0, -1.0, -2.0]);
    assert_eq!(indices(&out), vec![0, 1, 1, 2]);
}

pub fn max_pool_nan_never_wins(registry: &KernelRegistry) {
    let x = f32_tensor(&[1, 1, 4], vec![f32::NAN, 1.0, 2.0, f32::NAN]);
    let attrs = NodeAttributes::new()
        .with_ints("kernel_shape", &[2])
        .with_ints("strides", &[2]);
    let out = run(registry, "MaxPool", 12, &attrs, &x, true);
    assert_eq!(values_f32(&out), vec![1.0, 2.0]);
    assert_eq!(indices(&out), vec![1, 2]);
    let out = run(registry, "MaxPool", 12, &attrs, &x, false);
    assert_eq!(values_f32(&out), vec![1.0, 2.0]);
}

pub fn max_pool_dilation_and_ceil_mode(registry: &KernelRegistry) {
    let x = f32_tensor(&[1, 1, 5], vec![1.0, 5.0, 2.0, 4.0, 3.0]);
    let dilated = NodeAttributes::new()
        .with_ints("kernel_shape", &[2])
        .with_ints("dilations", &[2]);
    let out = run(registry, "MaxPool", 10, &dilated, &x, true);
    assert_eq!(values_f32(&out), vec![2.0, 5.0, 3.0]);
    assert_eq!(indices(&out), vec![2, 1, 4]);

    let x = f32_tensor(&[1, 1, 5], vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    let ceil = NodeAttributes::new()
        .with_ints("kernel_shape", &[2])
        .with_ints("strides", &[2])
        .with_int("ceil_mode", 1);
    let out = run(registry, "MaxPool", 12, &ceil, &x, true);
    assert_eq!(values_f32(&out), vec![2.0, 4.0, 5.0]);
    assert_eq!(indices(&out), vec![1, 3, 4]);
}

pub fn max_pool_indices_are_offset_by_plane(registry: &KernelRegistry) {
    let x = f32_tensor(&[2, 2, 2], vec![1.0, 2.0, 4.0, 3.0, 5.0, 6.0, 8.0, 7.0]);
    let attrs = NodeAttributes::new().with_ints("kernel_shape", &[2]);
    let out = run(registry, "MaxPool", 12, &attrs, &x, true);
    assert_eq!(out.values.dims(), &[2, 2, 1]);
    assert_eq!(values_f32(&out), vec![2.0, 4.0, 6.0, 8.0]);
    assert_eq!(indices(&out), vec![1, 2, 5, 6]);
}

pub fn max_pool_integer_and_double_inputs(registry: &KernelRegistry) {
    let attrs = NodeAttributes::new().with_ints("kernel_shape", &[2]);

    let x = Tensor::from_i8(Shape::new([1, 1, 4]), vec![-128, -5, 3, -7]).unwrap();
    let out = run(registry, "MaxPool", 12, &attrs, &x, false);
    assert_eq!(out.values.as_slice::<i8>().unwrap(), &[-5, 3, 3]);

    let x = Tensor::from_u8(Shape::new([1, 1, 4]), vec![10, 200, 3, 255]).unwrap();
    let out = run(registry, "MaxPool", 12, &attrs, &x, true);
    assert_eq!(out.values.as_slice::<u8>().unwrap(), &[200, 200, 255]);
    assert_eq!(indices(&out), vec![1, 1, 3]);

    let x = Tensor::from_f64(Shape::new([1, 1, 4]), vec![0.5, -1.0, 2.5, 2.0]).unwrap();
    let strided = attrs.with_ints("strides", &[2]);
    let out = run(registry, "MaxPool", 8, &strided, &x, true);
    assert_eq!(out.values.as_slice::<f64>().unwrap(), &[0.5, 2.5]);
    assert_eq!(indices(&out), vec![0, 2]);
}

/// SAME_UPPER pads a single element by 5 on each side, so both dilated taps land in padding.
pub fn windows_without_valid_taps(registry: &KernelRegistry) {
    let x = f32_tensor(&[1, 1, 1], vec![3.0]);
    let attrs = NodeAttributes::new()
        .with_ints("kernel_shape", &[2])
        .with_ints("dilations", &[10])
        .with_string("auto_pad", "SAME_UPPER");

    let out = run(registry, "MaxPool", 12, &attrs, &x, true);
    assert_eq!(out.values.dims(), &[1, 1, 1]);
    assert_eq!(values_f32(&out), vec![f32::MIN]);
    assert_eq!(indices(&out), vec![-1]);

    let include = attrs.clone().with_int("count_include_pad", 1);
    for average in [&attrs, &include] {
        let out = run(registry, "AveragePool", 19, average, &x, false);
        assert_eq!(values_f32(&out), vec![0.0]);
    }

    let out = run(registry, "LpPool", 18, &attrs.clone().with_int("p", 2), &x, false);
    assert_eq!(values_f32(&out), vec![0.0]);
}

/// No tap beats `lowest()`, so there is no argmax to report.
pub fn max_pool_all_lowest_window_has_no_index(registry: &KernelRegistry) {
    let attrs = NodeAttributes::new().with_ints("kernel_shape", &[2]);

    let x = Tensor::from_u8(Shape::new([1, 1, 2]), vec![0, 0]).unwrap();
    let out = run(registry, "MaxPool", 12, &attrs, &x, true);
    assert_eq!(out.values.as_slice::<u8>().unwrap(), &[0]);
    assert_eq!(indices(&out), vec![-1]);

    let x = Tensor::from_i8(Shape::new([1, 1, 3]), vec![-128, -128, 4]).unwrap();
    let out = run(registry, "MaxPool", 12, &attrs, &x, true);
    assert_eq!(out.values.as_slice::<i8>().unwrap(), &[-128, 4]);
    assert_eq!(indices(&out), vec![-1, 2]);
}

pub fn average_pool_include_and_exclude_pad(registry: &KernelRegistry) {
    let x = f32_tensor(&[1, 1, 5], vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    let attrs = NodeAttributes::new()
        .with_ints("kernel_shape", &[3])
        .with_ints("strides", &[2])
        .with_ints("pads", &[1, 1]);
    let exclude = run(registry, "AveragePool", 11, &attrs, &x, false);
    assert_eq!(values_f32(&exclude), vec![1.5, 3.0, 4.5]);

    let include = attrs.with_int("count_include_pad", 1);
    let out = run(registry, "AveragePool", 11, &include, &x, false);
    assert_eq!(values_f32(&out), vec![1.0, 3.0, 3.0]);
}

pub fn average_pool_ceil_mode_counts_only_the_padded_extent(registry: &KernelRegistry) {
    let x = f32_tensor(&[1, 1, 5], vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    let attrs = NodeAttributes::new()
        .with_ints("kernel_shape", &[2])
        .with_ints("strides", &[2])
        .with_int("ceil_mode", 1)
        .with_int("count_include_pad", 1);
    let out = run(registry, "AveragePool", 10, &attrs, &x, false);
    assert_eq!(values_f32(&out), vec![1.5, 3.5, 5.0]);
}

pub fn average_pool_same_upper(registry: &KernelRegistry) {
    let x = f32_tensor(&[1, 1, 3, 3], (1..=9).map(|v| v as f32).collect());
    let attrs = NodeAttributes::new()
        .with_ints("kernel_shape", &[2, 2])
        .with_string("auto_pad", "SAME_UPPER");
    let out = run(registry, "AveragePool", 11, &attrs, &x, false);
    assert_eq!(out.values.dims(), &[1, 1, 3, 3]);
    assert_eq!(
        values_f32(&out),
        vec![3.0, 4.0, 4.5, 6.0, 7.0, 7.5, 7.5, 8.5, 9.0]
    );

    let include = attrs.with_int("count_include_pad", 1);
    let out = run(registry, "AveragePool", 11, &include, &x, false);
    assert_eq!(values_f32(&out)[8], 2.25);
}

pub fn average_pool_dilation(registry: &KernelRegistry) {
    let x = f32_tensor(&[1, 1, 5], vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    let attrs = NodeAttributes::new()
        .with_ints("kernel_shape", &[2])
        .with_ints("dilations", &[2]);
    let out = run(registry, "AveragePool", 19, &attrs, &x, false);
    assert_eq!(values_f32(&out), vec![2.0, 3.0, 4.0]);
}

pub fn lp_pool_norms(registry: &KernelRegistry) {
    let x = f32_tensor(&[1, 1, 2, 2], vec![3.0, 4.0, 0.0, 12.0]);
    let kernel = NodeAttributes::new().with_ints("kernel_shape", &[2, 2]);
    let l2 = run(registry, "LpPool", 11, &kernel, &x, false);
    assert_eq!(values_f32(&l2), vec![13.0]);
    let l1 = run(registry, "LpPool", 11, &kernel.clone().with_int("p", 1), &x, false);
    assert_eq!(values_f32(&l1), vec![19.0]);
    let l3 = run(registry, "LpPool", 11, &kernel.with_int("p", 3), &x, false);
    let expected = 1819f64.powf(1.0 / 3.0) as f32;
    assert!((values_f32(&l3)[0] - expected).abs() < 1e-4);

    let x = f32_tensor(&[1, 1, 2], vec![3.0, -4.0]);
    let padded = NodeAttributes::new()
        .with_ints("kernel_shape", &[2])
        .with_ints("pads", &[1, 0]);
    let out = run(registry, "LpPool", 2, &padded, &x, false);
    assert_eq!(values_f32(&out), vec![3.0, 5.0]);
}

pub fn lp_pool_dilation_and_ceil_mode(registry: &KernelRegistry) {
    let x = f32_tensor(&[1, 1, 6], iota(6).into_iter().map(|v| v + 1.0).collect());
    let attrs = NodeAttributes::new()
        .with_ints("kernel_shape", &[2])
        .with_ints("strides", &[2])
        .with_ints("dilations", &[2])
        .with_int("ceil_mode", 1)
        .with_int("p", 1);
    let out = run(registry, "LpPool", 18, &attrs, &x, false);
    assert_eq!(values_f32(&out), vec![4.0, 8.0, 5.0]);
}

pub fn global_pools_reduce_every_spatial_dim(registry: &KernelRegistry) {
    let x = f32_tensor(&[1, 2, 2, 2, 2], iota(16));
    let none = NodeAttributes::new();

    let avg = run(registry, "GlobalAveragePool", 1, &none, &x, false);
    assert_eq!(avg.values.dims(), &[1, 2, 1, 1, 1]);
    assert_eq!(values_f32(&avg), vec![3.5, 11.5]);

    let max = run(registry, "GlobalMaxPool", 1, &none, &x, false);
    assert_eq!(values_f32(&max), vec![7.0, 15.0]);

    let lp = run(registry, "GlobalLpPool", 2, &none, &x, false);
    let expected = [140f32.sqrt(), 1100f32.sqrt()];
    for (got, want) in values_f32(&lp).iter().zip(expected) {
        assert!((got - want).abs() < 1e-4, "{got} vs {want}");
    }
}

pub fn zero_sized_batch_returns_empty_outputs(registry: &KernelRegistry) {
    let x = f32_tensor(&[0, 1, 4], Vec::new());
    let attrs = NodeAttributes::new().with_ints("kernel_shape", &[2]);
    let out = run(registry, "MaxPool", 12, &attrs, &x, true);
    assert_eq!(out.values.dims(), &[0, 1, 3]);
    assert!(out.values.is_empty());
    assert_eq!(indices(&out), Vec::<i64>::new());
}

pub fn invalid_calls_are_rejected(registry: &KernelRegistry) {
    let op = PoolOperator::new("MaxPool", 12, &max_2x2()).unwrap();
    let x = f32_tensor(&[1, 1, 4], iota(4));
    assert!(matches!(
        op.compute(registry, &x, false),
        Err(PoolError::InvalidArgument(_))
    ));

    let avg = PoolOperator::new(
        "AveragePool",
        11,
        &NodeAttributes::new().with_ints("kernel_shape", &[2]),
    )
    .unwrap();
    let doubles = Tensor::from_f64(Shape::new([1, 1, 4]), vec![0.0; 4]).unwrap();
    assert!(matches!(
        avg.compute(registry, &doubles, false),
        Err(PoolError::UnsupportedType { .. })
    ));

    let oversized_pad = NodeAttributes::new()
        .with_ints("kernel_shape", &[2])
        .with_ints("pads", &[2, 0]);
    assert!(matches!(
        PoolOperator::new("MaxPool", 12, &oversized_pad),
        Err(PoolError::InvalidAttribute { name: "pads", .. })
    ));
}
