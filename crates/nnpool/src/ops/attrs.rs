//! Node attributes and their resolution into validated pooling parameters.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};

use super::schema::{first_version_with, OpSchema, PoolKind, PoolOpType, StorageOrder};

/// Padding strategy selected by the `auto_pad` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AutoPad {
    /// Use the explicit `pads` attribute.
    #[default]
    NotSet,
    /// No padding at all.
    Valid,
    /// Pad so `out = ceil(in / stride)`; an odd extra pad lands at the end.
    SameUpper,
    /// Pad so `out = ceil(in / stride)`; an odd extra pad lands at the beginning.
    SameLower,
}

impl AutoPad {
    pub fn parse(raw: &str) -> PoolResult<Self> {
        match raw.trim() {
            "" | "NOTSET" => Ok(AutoPad::NotSet),
            "VALID" => Ok(AutoPad::Valid),
            "SAME_UPPER" => Ok(AutoPad::SameUpper),
            "SAME_LOWER" => Ok(AutoPad::SameLower),
            other => Err(PoolError::attribute(
                "auto_pad",
                format!("unknown value {other:?}"),
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AutoPad::NotSet => "NOTSET",
            AutoPad::Valid => "VALID",
            AutoPad::SameUpper => "SAME_UPPER",
            AutoPad::SameLower => "SAME_LOWER",
        }
    }
}

impl fmt::Display for AutoPad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single attribute value as it appears on a graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int(i64),
    /// Graph nodes may carry float attributes; pooling defines none, so they are only ever
    /// ignored as unknown or reported as a type error.
    Float(f64),
    Ints(Vec<i64>),
    String(String),
}

impl AttributeValue {
    fn kind(&self) -> &'static str {
        match self {
            AttributeValue::Int(_) => "int",
            AttributeValue::Float(_) => "float",
            AttributeValue::Ints(_) => "ints",
            AttributeValue::String(_) => "string",
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<Vec<i64>> for AttributeValue {
    fn from(values: Vec<i64>) -> Self {
        AttributeValue::Ints(values)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

/// String-keyed attribute map of a pooling node.
///
/// Serializes as a flat JSON object, e.g. `{"kernel_shape": [3, 3], "auto_pad": "SAME_UPPER"}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAttributes {
    values: BTreeMap<String, AttributeValue>,
}

impl NodeAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_int(mut self, name: &str, value: i64) -> Self {
        self.set(name, value.into());
        self
    }

    pub fn with_ints(mut self, name: &str, values: &[i64]) -> Self {
        self.set(name, values.to_vec().into());
        self
    }

    pub fn with_string(mut self, name: &str, value: &str) -> Self {
        self.set(name, value.into());
        self
    }

    pub fn set(&mut self, name: &str, value: AttributeValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    pub fn int(&self, name: &'static str) -> PoolResult<Option<i64>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(AttributeValue::Int(value)) => Ok(Some(*value)),
            Some(other) => Err(type_error(name, "int", other)),
        }
    }

    /// Reads an `ints` attribute; a lone `int` is accepted as a one-element list.
    pub fn ints(&self, name: &'static str) -> PoolResult<Option<Vec<i64>>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(AttributeValue::Ints(values)) => Ok(Some(values.clone())),
            Some(AttributeValue::Int(value)) => Ok(Some(vec![*value])),
            Some(other) => Err(type_error(name, "ints", other)),
        }
    }

    pub fn string(&self, name: &'static str) -> PoolResult<Option<&str>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(AttributeValue::String(value)) => Ok(Some(value.as_str())),
            Some(other) => Err(type_error(name, "string", other)),
        }
    }
}

fn type_error(name: &'static str, expected: &str, found: &AttributeValue) -> PoolError {
    PoolError::attribute(
        name,
        format!("expected {expected}, found {}", found.kind()),
    )
}

const KNOWN_ATTRIBUTES: &[&str] = &[
    "kernel_shape",
    "strides",
    "pads",
    "dilations",
    "auto_pad",
    "ceil_mode",
    "storage_order",
    "count_include_pad",
    "p",
];

/// Validated pooling parameters for one operator instance.
///
/// Global operators leave the per-dimension vectors empty; they are filled in from the input
/// shape by [`PoolGeometry::resolve`](super::geometry::PoolGeometry::resolve).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolAttributes {
    pub global_pooling: bool,
    pub kernel_shape: Vec<usize>,
    pub strides: Vec<usize>,
    /// `[begin_0, .., begin_k, end_0, .., end_k]`.
    pub pads: Vec<usize>,
    pub dilations: Vec<usize>,
    pub auto_pad: AutoPad,
    pub ceil_mode: bool,
    pub storage_order: StorageOrder,
    pub count_include_pad: bool,
    pub p: u32,
}

impl PoolAttributes {
    /// Resolves node attributes against the schema row selected for the operator version.
    pub fn from_node(schema: &OpSchema, attrs: &NodeAttributes) -> PoolResult<Self> {
        let op_type = schema.op_type;
        check_gated_attributes(schema, attrs)?;

        for name in attrs.names() {
            if !KNOWN_ATTRIBUTES.contains(&name) {
                log::warn!("{op_type}: ignoring unknown attribute `{name}`");
            }
        }

        let ceil_mode = attrs.int("ceil_mode")?.unwrap_or(0) != 0;
        let count_include_pad = attrs.int("count_include_pad")?.unwrap_or(0) != 0;

        let storage_order = match attrs.int("storage_order")?.unwrap_or(0) {
            0 => StorageOrder::RowMajor,
            1 => StorageOrder::ColumnMajor,
            other => {
                return Err(PoolError::attribute(
                    "storage_order",
                    format!("must be 0 or 1, got {other}"),
                ))
            }
        };

        let p = match attrs.int("p")?.unwrap_or(2) {
            p if (1..=u32::MAX as i64).contains(&p) => p as u32,
            other => {
                return Err(PoolError::attribute(
                    "p",
                    format!("must be a positive integer, got {other}"),
                ))
            }
        };

        if op_type.is_global() {
            return Ok(PoolAttributes {
                global_pooling: true,
                kernel_shape: Vec::new(),
                strides: Vec::new(),
                pads: Vec::new(),
                dilations: Vec::new(),
                auto_pad: AutoPad::NotSet,
                ceil_mode: false,
                storage_order,
                count_include_pad: false,
                p,
            });
        }

        let kernel_shape = match attrs.ints("kernel_shape")? {
            Some(values) if !values.is_empty() => positive_dims("kernel_shape", &values)?,
            _ => {
                return Err(PoolError::attribute(
                    "kernel_shape",
                    format!("{op_type} requires a non-empty kernel_shape"),
                ))
            }
        };
        let rank = kernel_shape.len();

        let strides = match attrs.ints("strides")? {
            Some(values) => {
                expect_len("strides", &values, rank)?;
                positive_dims("strides", &values)?
            }
            None => vec![1; rank],
        };

        let dilations = match attrs.ints("dilations")? {
            Some(values) => {
                expect_len("dilations", &values, rank)?;
                positive_dims("dilations", &values)?
            }
            None => vec![1; rank],
        };

        let pads = match attrs.ints("pads")? {
            Some(values) => {
                expect_len("pads", &values, 2 * rank)?;
                non_negative_dims("pads", &values)?
            }
            None => vec![0; 2 * rank],
        };
        for (dim, &kernel) in kernel_shape.iter().enumerate() {
            if pads[dim] >= kernel || pads[dim + rank] >= kernel {
                return Err(PoolError::attribute(
                    "pads",
                    format!(
                        "pad should be smaller than kernel: dim {dim} has pads ({}, {}) for kernel {kernel}",
                        pads[dim],
                        pads[dim + rank]
                    ),
                ));
            }
        }

        let auto_pad = match attrs.string("auto_pad")? {
            Some(raw) => AutoPad::parse(raw)?,
            None => AutoPad::NotSet,
        };

        Ok(PoolAttributes {
            global_pooling: false,
            kernel_shape,
            strides,
            pads,
            dilations,
            auto_pad,
            ceil_mode,
            storage_order,
            count_include_pad,
            p,
        })
    }

    /// The reduction these attributes describe for `op_type`.
    pub fn kind(&self, op_type: PoolOpType) -> PoolKind {
        match op_type {
            PoolOpType::MaxPool | PoolOpType::GlobalMaxPool => PoolKind::Max {
                storage_order: self.storage_order,
            },
            PoolOpType::AveragePool | PoolOpType::GlobalAveragePool => PoolKind::Average {
                count_include_pad: self.count_include_pad,
            },
            PoolOpType::LpPool | PoolOpType::GlobalLpPool => PoolKind::Lp { p: self.p },
        }
    }

    pub fn has_dilation(&self) -> bool {
        self.dilations.iter().any(|&d| d > 1)
    }
}

/// Rejects attributes the selected operator version does not define.
fn check_gated_attributes(schema: &OpSchema, attrs: &NodeAttributes) -> PoolResult<()> {
    let op_type = schema.op_type;

    if op_type.is_global() {
        for name in ["kernel_shape", "strides", "pads", "dilations", "auto_pad"] {
            if attrs.contains(name) {
                return Err(PoolError::attribute(
                    name,
                    format!("not defined for {op_type}"),
                ));
            }
        }
    }

    let gates: [(&'static str, fn(&OpSchema) -> bool); 3] = [
        ("dilations", |s| s.dilations),
        ("ceil_mode", |s| s.ceil_mode),
        ("storage_order", |s| s.storage_order),
    ];
    for (name, gate) in gates {
        if attrs.contains(name) && !gate(schema) {
            let reason = match first_version_with(op_type, gate) {
                Some(since) => format!(
                    "{op_type} supports it from version {since}, selected version starts at {}",
                    schema.since_version
                ),
                None => format!("not defined for {op_type}"),
            };
            return Err(PoolError::attribute(name, reason));
        }
    }

    if attrs.contains("count_include_pad") && op_type != PoolOpType::AveragePool {
        return Err(PoolError::attribute(
            "count_include_pad",
            format!("not defined for {op_type}"),
        ));
    }
    if attrs.contains("p") && !matches!(op_type, PoolOpType::LpPool | PoolOpType::GlobalLpPool) {
        return Err(PoolError::attribute("p", format!("not defined for {op_type}")));
    }
    Ok(())
}

fn expect_len(name: &'static str, values: &[i64], expected: usize) -> PoolResult<()> {
    if values.len() != expected {
        return Err(PoolError::attribute(
            name,
            format!("expected {expected} values, got {}", values.len()),
        ));
    }
    Ok(())
}

fn positive_dims(name: &'static str, values: &[i64]) -> PoolResult<Vec<usize>> {
    values
        .iter()
        .map(|&value| {
            if value > 0 {
                Ok(value as usize)
            } else {
                Err(PoolError::attribute(
                    name,
                    format!("values must be positive, got {values:?}"),
                ))
            }
        })
        .collect()
}

fn non_negative_dims(name: &'static str, values: &[i64]) -> PoolResult<Vec<usize>> {
    values
        .iter()
        .map(|&value| {
            if value >= 0 {
                Ok(value as usize)
            } else {
                Err(PoolError::attribute(
                    name,
                    format!("values must be non-negative, got {values:?}"),
                ))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::schema::lookup_schema;

    fn resolve(op: PoolOpType, version: u32, attrs: NodeAttributes) -> PoolResult<PoolAttributes> {
        PoolAttributes::from_node(lookup_schema(op, version).unwrap(), &attrs)
    }

    #[test]
    fn defaults_fill_strides_pads_and_dilations() {
        let attrs = resolve(
            PoolOpType::MaxPool,
            12,
            NodeAttributes::new().with_ints("kernel_shape", &[3, 2]),
        )
        .unwrap();
        assert_eq!(attrs.strides, vec![1, 1]);
        assert_eq!(attrs.pads, vec![0, 0, 0, 0]);
        assert_eq!(attrs.dilations, vec![1, 1]);
        assert_eq!(attrs.auto_pad, AutoPad::NotSet);
        assert!(!attrs.has_dilation());
    }

    #[test]
    fn missing_kernel_shape_is_rejected() {
        let err = resolve(PoolOpType::AveragePool, 11, NodeAttributes::new()).unwrap_err();
        assert!(matches!(
            err,
            PoolError::InvalidAttribute {
                name: "kernel_shape",
                ..
            }
        ));
    }

    #[test]
    fn pads_must_be_smaller_than_kernel() {
        let err = resolve(
            PoolOpType::MaxPool,
            12,
            NodeAttributes::new()
                .with_ints("kernel_shape", &[2])
                .with_ints("pads", &[0, 2]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("pad should be smaller than kernel"));
    }

    #[test]
    fn rank_mismatched_strides_are_rejected() {
        let err = resolve(
            PoolOpType::LpPool,
            18,
            NodeAttributes::new()
                .with_ints("kernel_shape", &[2, 2])
                .with_ints("strides", &[1]),
        )
        .unwrap_err();
        assert!(matches!(err, PoolError::InvalidAttribute { name: "strides", .. }));
    }

    #[test]
    fn dilations_require_a_version_that_defines_them() {
        let attrs = NodeAttributes::new()
            .with_ints("kernel_shape", &[2, 2])
            .with_ints("dilations", &[2, 2]);
        let err = resolve(PoolOpType::AveragePool, 11, attrs.clone()).unwrap_err();
        assert!(err.to_string().contains("from version 19"), "{err}");
        assert!(resolve(PoolOpType::AveragePool, 19, attrs).unwrap().has_dilation());
    }

    #[test]
    fn global_ops_reject_window_attributes() {
        let err = resolve(
            PoolOpType::GlobalMaxPool,
            1,
            NodeAttributes::new().with_ints("kernel_shape", &[2]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PoolError::InvalidAttribute {
                name: "kernel_shape",
                ..
            }
        ));
        let global = resolve(
            PoolOpType::GlobalLpPool,
            2,
            NodeAttributes::new().with_int("p", 3),
        )
        .unwrap();
        assert!(global.global_pooling);
        assert_eq!(global.kind(PoolOpType::GlobalLpPool), PoolKind::Lp { p: 3 });
    }

    #[test]
    fn p_must_be_positive() {
        let err = resolve(
            PoolOpType::LpPool,
            11,
            NodeAttributes::new()
                .with_ints("kernel_shape", &[2])
                .with_int("p", 0),
        )
        .unwrap_err();
        assert!(matches!(err, PoolError::InvalidAttribute { name: "p", .. }));
    }

    #[test]
    fn attributes_deserialize_from_json() {
        let attrs: NodeAttributes = serde_json::from_str(
            r#"{"kernel_shape": [3, 3], "strides": [2, 2], "auto_pad": "SAME_LOWER", "ceil_mode": 1}"#,
        )
        .unwrap();
        let resolved = resolve(PoolOpType::MaxPool, 12, attrs).unwrap();
        assert_eq!(resolved.auto_pad, AutoPad::SameLower);
        assert!(resolved.ceil_mode);
        assert_eq!(resolved.strides, vec![2, 2]);
    }

    #[test]
    fn float_attributes_from_json_are_ignored_or_rejected() {
        let attrs: NodeAttributes =
            serde_json::from_str(r#"{"kernel_shape": [2], "spatial_scale": 0.5}"#).unwrap();
        assert_eq!(attrs.get("spatial_scale"), Some(&AttributeValue::Float(0.5)));
        assert!(resolve(PoolOpType::MaxPool, 12, attrs).is_ok());

        let attrs: NodeAttributes =
            serde_json::from_str(r#"{"kernel_shape": [2], "p": 2.5}"#).unwrap();
        let err = resolve(PoolOpType::LpPool, 18, attrs).unwrap_err();
        assert!(err.to_string().contains("expected int, found float"), "{err}");
    }

    #[test]
    fn wrong_attribute_type_is_reported() {
        let err = resolve(
            PoolOpType::MaxPool,
            12,
            NodeAttributes::new().with_string("kernel_shape", "3x3"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected ints, found string"), "{err}");
    }
}
