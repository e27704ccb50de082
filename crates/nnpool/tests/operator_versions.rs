use nnpool::ops::{lookup_schema, schemas, KernelKey};
use nnpool::{DType, NodeAttributes, PoolError, PoolKind, PoolOpType, PoolOperator};

fn window_2x2() -> NodeAttributes {
    NodeAttributes::new()
        .with_ints("kernel_shape", &[2, 2])
        .with_ints("strides", &[2, 2])
}

#[test]
fn version_ranges_do_not_overlap() {
    for op in PoolOpType::ALL {
        for version in 1..=22 {
            let covering = schemas()
                .iter()
                .filter(|schema| schema.op_type == op && schema.covers(version))
                .count();
            assert!(covering <= 1, "{op} v{version} matched {covering} rows");
        }
    }
}

#[test]
fn max_pool_dtypes_and_outputs_grow_with_version() {
    let v1 = lookup_schema(PoolOpType::MaxPool, 1).unwrap();
    assert!(!v1.emits_indices());
    assert!(!v1.supports_dtype(DType::F64));

    let v8 = lookup_schema(PoolOpType::MaxPool, 8).unwrap();
    assert!(v8.emits_indices());
    assert!(v8.supports_dtype(DType::F64));
    assert!(!v8.supports_dtype(DType::U8));

    let v12 = lookup_schema(PoolOpType::MaxPool, 12).unwrap();
    assert!(v12.supports_dtype(DType::I8) && v12.supports_dtype(DType::U8));
    assert_eq!(v12.end_version, None);
}

#[test]
fn versions_before_the_first_schema_are_rejected() {
    let err = PoolOperator::new("AveragePool", 6, &window_2x2()).unwrap_err();
    assert!(matches!(err, PoolError::NoSchema { version: 6, .. }), "{err}");

    let err = PoolOperator::new("LpPool", 1, &window_2x2()).unwrap_err();
    assert!(matches!(err, PoolError::NoSchema { .. }), "{err}");

    let err = PoolOperator::new("MinPool", 12, &window_2x2()).unwrap_err();
    assert!(matches!(err, PoolError::NoSchema { .. }), "{err}");
}

#[test]
fn ceil_mode_is_gated_by_version() {
    let attrs = window_2x2().with_int("ceil_mode", 1);
    assert!(matches!(
        PoolOperator::new("MaxPool", 8, &attrs),
        Err(PoolError::InvalidAttribute {
            name: "ceil_mode",
            ..
        })
    ));

    let op = PoolOperator::new("MaxPool", 10, &attrs).unwrap();
    assert_eq!(op.output_dims(&[1, 1, 5, 5]).unwrap(), vec![1, 1, 3, 3]);
    let op = PoolOperator::new("MaxPool", 8, &window_2x2()).unwrap();
    assert_eq!(op.output_dims(&[1, 1, 5, 5]).unwrap(), vec![1, 1, 2, 2]);
}

#[test]
fn unknown_attributes_are_ignored() {
    let attrs = window_2x2().with_string("layout", "NCHW");
    let op = PoolOperator::new("AveragePool", 11, &attrs).unwrap();
    assert_eq!(op.output_dims(&[2, 3, 4, 4]).unwrap(), vec![2, 3, 2, 2]);
}

#[test]
fn operators_map_to_their_reduction_family() {
    let cases = [
        ("MaxPool", 12, window_2x2(), KernelKey::MAX_POOL),
        ("AveragePool", 19, window_2x2(), KernelKey::AVERAGE_POOL),
        ("LpPool", 18, window_2x2().with_int("p", 3), KernelKey::LP_POOL),
        ("GlobalMaxPool", 1, NodeAttributes::new(), KernelKey::MAX_POOL),
        ("GlobalAveragePool", 1, NodeAttributes::new(), KernelKey::AVERAGE_POOL),
        ("GlobalLpPool", 2, NodeAttributes::new(), KernelKey::LP_POOL),
    ];
    for (name, version, attrs, key) in cases {
        let op = PoolOperator::new(name, version, &attrs).unwrap();
        assert_eq!(op.op_type().kernel_key(), key, "{name}");
    }

    let lp = PoolOperator::new("LpPool", 18, &window_2x2().with_int("p", 3)).unwrap();
    assert_eq!(lp.kind(), PoolKind::Lp { p: 3 });
}
