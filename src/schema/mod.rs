//! # Schema Module
//!
//! This module implements the serialized description of a data tree. A
//! schema is parsed from a compact JSON-like text into an internal tree of
//! schema nodes, renders back to canonical text, and reports the total byte
//! footprint a conforming data buffer must have. The schema walker descends
//! this internal form to impose tree structure over an opaque byte buffer.
//!
//! The grammar is a JSON superset with order-preserving objects:
//!
//! - `"<kind-name>"`: a single element of the named kind.
//! - `{ "dtype": "<kind-name>", "length": N, "offset": ..?, "stride": ..?,
//!   "endian": ..? }`: a leaf with explicit layout fields.
//! - `{ "dtype": <object>, "length": N }`: the inner object replicated `N`
//!   times contiguously.
//! - any other object: named children in insertion order.
//! - a JSON array: positional children.

use anyhow::{bail, Result};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::dtype::{ElementKind, Endianness};
use crate::error::TreeError;

/* DEFINITIONS */

/// The parsed internal form of a schema text. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schema {
    /// A typed leaf region.
    Leaf(LeafSpec),

    /// A compound replicated contiguously a fixed number of times.
    ListOf(Box<Schema>, usize),

    /// Named children laid out in insertion order.
    Object(IndexMap<String, Schema>),

    /// Positional children laid out in order.
    List(Vec<Schema>),
}

/// The layout description of a single schema leaf. Optional fields record
/// whether the schema text supplied them explicitly; an absent field lets
/// the walker fill in its running default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafSpec {
    /// The element kind of the leaf region.
    pub kind: ElementKind,

    /// The number of elements in the leaf region.
    pub count: usize,

    /// An explicit byte offset pinning the leaf, overriding the walker's
    /// running offset.
    pub offset: Option<usize>,

    /// An explicit byte distance between consecutive elements.
    pub stride: Option<usize>,

    /// An explicit per-element byte width.
    pub elem_bytes: Option<usize>,

    /// The byte order of the leaf's elements.
    pub endian: Endianness,
}

impl LeafSpec {
    /// Returns the layout of a single element of `kind` with no explicit
    /// fields, as produced by the short-form grammar.
    pub const fn scalar(kind: ElementKind) -> Self {
        Self {
            kind,
            count: 1,
            offset: None,
            stride: None,
            elem_bytes: None,
            endian: Endianness::DEFAULT,
        }
    }

    /// Returns the declared element width, defaulting to the kind's native
    /// size.
    pub fn resolved_elem_bytes(&self) -> usize {
        self.elem_bytes
            .unwrap_or(self.kind.native_size())
    }

    /// Returns the declared stride, defaulting to the element width.
    pub fn resolved_stride(&self) -> usize {
        self.stride
            .unwrap_or(self.resolved_elem_bytes())
    }

    /// Returns true if this leaf can re-render as the short form (a bare
    /// kind name).
    fn is_short(&self) -> bool {
        self.count == 1
            && self.offset.is_none()
            && self.stride.is_none()
            && self.elem_bytes.is_none()
            && self.endian == Endianness::DEFAULT
    }
}

/* INTERFACE */

impl Schema {
    /// Parses a schema text under the JSON-superset grammar. Malformed
    /// JSON, unknown kind names, and non-integer layout fields fail.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| TreeError::Parse {
                message: e.to_string(),
            })?;
        Self::from_value(&value)
    }

    /// Renders this schema as canonical text. Leaves that carry no explicit
    /// layout fields render as the short form, so `parse(s).to_json()`
    /// matches `s` under whitespace normalization.
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    /// Returns the number of bytes a data buffer conforming to this schema
    /// must hold: the depth-first sum of every leaf's footprint.
    pub fn total_bytes(&self) -> usize {
        match self {
            Self::Leaf(spec) => spec.count * spec.resolved_stride(),
            Self::ListOf(inner, count) => count * inner.total_bytes(),
            Self::Object(entries) => entries
                .values()
                .map(Self::total_bytes)
                .sum(),
            Self::List(items) => items
                .iter()
                .map(Self::total_bytes)
                .sum(),
        }
    }

    /* CONVERSION HELPERS */

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(name) => Ok(Self::Leaf(LeafSpec::scalar(
                ElementKind::from_name(name)?,
            ))),
            Value::Array(items) => {
                let mut parsed = Vec::with_capacity(items.len());
                for item in items {
                    parsed.push(Self::from_value(item)?);
                }
                Ok(Self::List(parsed))
            },
            Value::Object(entries) => match entries.get("dtype") {
                Some(Value::Object(_)) => {
                    let inner =
                        Self::from_value(&entries["dtype"])?;
                    let count =
                        optional_field(entries, "length")?.unwrap_or(1);
                    Ok(Self::ListOf(Box::new(inner), count))
                },
                Some(Value::String(name)) => {
                    Ok(Self::Leaf(Self::leaf_from_object(name, entries)?))
                },
                Some(_) => bail!(TreeError::Parse {
                    message: "the 'dtype' field must be a kind name or a \
                        nested compound object."
                        .to_string(),
                }),
                None => {
                    let mut parsed = IndexMap::with_capacity(entries.len());
                    for (name, child) in entries {
                        parsed.insert(
                            name.clone(),
                            Self::from_value(child)?,
                        );
                    }
                    Ok(Self::Object(parsed))
                },
            },
            _ => bail!(TreeError::Parse {
                message: format!(
                    "a schema node must be a kind name, an object, or an \
                    array (found '{value}')."
                ),
            }),
        }
    }

    fn leaf_from_object(
        name: &str,
        entries: &Map<String, Value>,
    ) -> Result<LeafSpec> {
        let kind = ElementKind::from_name(name)?;
        let endian = match entries.get("endian") {
            None => Endianness::DEFAULT,
            Some(Value::String(e)) => Endianness::from_name(e)?,
            Some(_) => bail!(TreeError::Parse {
                message: "the 'endian' field must be a string.".to_string(),
            }),
        };
        Ok(LeafSpec {
            kind,
            count: optional_field(entries, "length")?.unwrap_or(1),
            offset: optional_field(entries, "offset")?,
            stride: optional_field(entries, "stride")?,
            elem_bytes: optional_field(entries, "elem_bytes")?,
            endian,
        })
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Leaf(spec) if spec.is_short() => {
                Value::String(spec.kind.name().to_string())
            },
            Self::Leaf(spec) => {
                let mut obj = Map::new();
                obj.insert(
                    "dtype".to_string(),
                    json!(spec.kind.name()),
                );
                obj.insert("length".to_string(), json!(spec.count));
                if let Some(offset) = spec.offset {
                    obj.insert("offset".to_string(), json!(offset));
                }
                if let Some(stride) = spec.stride {
                    obj.insert("stride".to_string(), json!(stride));
                }
                if let Some(elem_bytes) = spec.elem_bytes {
                    obj.insert(
                        "elem_bytes".to_string(),
                        json!(elem_bytes),
                    );
                }
                if spec.endian != Endianness::DEFAULT {
                    obj.insert(
                        "endian".to_string(),
                        json!(spec.endian.name()),
                    );
                }
                Value::Object(obj)
            },
            Self::ListOf(inner, count) => json!({
                "dtype": inner.to_value(),
                "length": count,
            }),
            Self::Object(entries) => {
                let mut obj = Map::new();
                for (name, child) in entries {
                    obj.insert(name.clone(), child.to_value());
                }
                Value::Object(obj)
            },
            Self::List(items) => Value::Array(
                items
                    .iter()
                    .map(Self::to_value)
                    .collect(),
            ),
        }
    }
}

/// Reads an optional non-negative integer field from a schema object.
fn optional_field(
    entries: &Map<String, Value>,
    key: &str,
) -> Result<Option<usize>> {
    match entries.get(key) {
        None => Ok(None),
        Some(value) => match value.as_u64() {
            Some(n) => Ok(Some(n as usize)),
            None => bail!(TreeError::Parse {
                message: format!(
                    "the schema field '{key}' must be a non-negative \
                    integer (found '{value}')."
                ),
            }),
        },
    }
}
