//! # Data Type Module
//!
//! This module defines the primitive type registry and the data type
//! descriptor. The registry is a closed enumeration of element kinds with
//! per-kind native sizes and names; the descriptor is a copyable value
//! object describing how a region of bytes is to be interpreted as one leaf
//! of a data tree: which kind of element it holds, how many, and at what
//! offset and stride from a base pointer.

#![allow(non_camel_case_types)]

use anyhow::{bail, Result};
use serde_json::json;

use std::fmt;

use crate::error::TreeError;

/* ELEMENT KIND REGISTRY */

/// Closed enumeration of the kinds of element a tree node can hold. The
/// first three variants are structural markers with no associated storage;
/// the rest are concrete element types a leaf region can be made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElementKind {
    /// No data and no children.
    EMPTY,
    /// An ordered mapping from name to child node.
    OBJECT,
    /// An ordered sequence of child nodes.
    LIST,
    /// A single-byte truth value.
    BOOL,
    /// A signed 8-bit integer.
    INT8,
    /// A signed 16-bit integer.
    INT16,
    /// A signed 32-bit integer.
    INT32,
    /// A signed 64-bit integer.
    INT64,
    /// An unsigned 8-bit integer.
    UINT8,
    /// An unsigned 16-bit integer.
    UINT16,
    /// An unsigned 32-bit integer.
    UINT32,
    /// An unsigned 64-bit integer.
    UINT64,
    /// An IEEE 754 single-precision float.
    FLOAT32,
    /// An IEEE 754 double-precision float.
    FLOAT64,
    /// A byte string, one byte per element.
    BYTESTR,
}

impl ElementKind {
    /// Returns the native size in bytes of a single element of this kind, or
    /// zero for the structural kinds, which have no storage of their own.
    pub const fn native_size(self) -> usize {
        match self {
            Self::EMPTY | Self::OBJECT | Self::LIST => 0,
            Self::BOOL | Self::INT8 | Self::UINT8 | Self::BYTESTR => 1,
            Self::INT16 | Self::UINT16 => 2,
            Self::INT32 | Self::UINT32 | Self::FLOAT32 => 4,
            Self::INT64 | Self::UINT64 | Self::FLOAT64 => 8,
        }
    }

    /// Returns the registry name of this kind, as it appears in schema text.
    pub const fn name(self) -> &'static str {
        match self {
            Self::EMPTY => "empty",
            Self::OBJECT => "object",
            Self::LIST => "list",
            Self::BOOL => "bool",
            Self::INT8 => "int8",
            Self::INT16 => "int16",
            Self::INT32 => "int32",
            Self::INT64 => "int64",
            Self::UINT8 => "uint8",
            Self::UINT16 => "uint16",
            Self::UINT32 => "uint32",
            Self::UINT64 => "uint64",
            Self::FLOAT32 => "float32",
            Self::FLOAT64 => "float64",
            Self::BYTESTR => "bytestr",
        }
    }

    /// Looks `name` up in the registry. Fails if `name` does not correspond
    /// to any element kind.
    pub fn from_name(name: &str) -> Result<Self> {
        let kind = match name {
            "empty" => Self::EMPTY,
            "object" => Self::OBJECT,
            "list" => Self::LIST,
            "bool" => Self::BOOL,
            "int8" => Self::INT8,
            "int16" => Self::INT16,
            "int32" => Self::INT32,
            "int64" => Self::INT64,
            "uint8" => Self::UINT8,
            "uint16" => Self::UINT16,
            "uint32" => Self::UINT32,
            "uint64" => Self::UINT64,
            "float32" => Self::FLOAT32,
            "float64" => Self::FLOAT64,
            "bytestr" => Self::BYTESTR,
            _ => bail!(TreeError::UnknownKind {
                name: name.to_string(),
            }),
        };
        Ok(kind)
    }

    /// Returns true if this kind is one of the structural markers, which
    /// carry children or nothing rather than a byte region.
    pub const fn is_structural(self) -> bool {
        matches!(self, Self::EMPTY | Self::OBJECT | Self::LIST)
    }

    /// Returns true if this kind is a concrete element type, so that a leaf
    /// region can be made of it.
    pub const fn is_concrete(self) -> bool {
        !self.is_structural()
    }

    /// Returns true if this kind is one of the ten numeric element types
    /// (signed, unsigned, or floating point).
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::INT8
                | Self::INT16
                | Self::INT32
                | Self::INT64
                | Self::UINT8
                | Self::UINT16
                | Self::UINT32
                | Self::UINT64
                | Self::FLOAT32
                | Self::FLOAT64
        )
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/* ENDIANNESS */

/// Byte-order tag carried by a data type descriptor. `DEFAULT` resolves to
/// the host byte order at the point of use, so a descriptor built without an
/// explicit tag reads and writes native-order bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endianness {
    /// The byte order of the host, decided at the point of use.
    #[default]
    DEFAULT,
    /// Least-significant byte first.
    LITTLE,
    /// Most-significant byte first.
    BIG,
}

impl Endianness {
    /// Resolves this tag to a concrete byte order, mapping `DEFAULT` to the
    /// order of the host.
    pub const fn resolve(self) -> Self {
        match self {
            Self::DEFAULT => {
                if cfg!(target_endian = "big") {
                    Self::BIG
                } else {
                    Self::LITTLE
                }
            },
            other => other,
        }
    }

    /// Returns true if elements under this tag can be read without swapping
    /// bytes on the host.
    pub const fn matches_host(self) -> bool {
        match self {
            Self::DEFAULT => true,
            Self::LITTLE => cfg!(target_endian = "little"),
            Self::BIG => cfg!(target_endian = "big"),
        }
    }

    /// Returns the schema-text name of this tag.
    pub const fn name(self) -> &'static str {
        match self {
            Self::DEFAULT => "default",
            Self::LITTLE => "little",
            Self::BIG => "big",
        }
    }

    /// Parses a schema-text endianness name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "default" => Ok(Self::DEFAULT),
            "little" => Ok(Self::LITTLE),
            "big" => Ok(Self::BIG),
            _ => bail!(TreeError::Parse {
                message: format!(
                    "'{name}' is not a recognized endianness (expected \
                    'little', 'big', or 'default')."
                ),
            }),
        }
    }
}

/* DATA TYPE DESCRIPTOR */

/// Describes how to interpret a region of bytes as one leaf of a data tree:
/// the kind of its elements, how many there are, the byte offset of the
/// first element from a base pointer, the byte distance between consecutive
/// elements, the on-disk width of each element, and their byte order.
///
/// For the structural kinds the numeric fields are zero and unused; the
/// descriptor then only discriminates the shape of the node carrying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataType {
    kind: ElementKind,
    count: usize,
    offset: usize,
    stride: usize,
    elem_bytes: usize,
    endian: Endianness,
}

impl DataType {
    /// Returns a validated descriptor from explicit fields. Fails with an
    /// invalid-layout error if a concrete kind is given an element width
    /// narrower than its native size, or a stride narrower than its element
    /// width. Structural kinds ignore the numeric fields and zero them.
    pub fn new(
        kind: ElementKind,
        count: usize,
        offset: usize,
        stride: usize,
        elem_bytes: usize,
        endian: Endianness,
    ) -> Result<Self> {
        if kind.is_structural() {
            return Ok(Self::structural(kind));
        }

        if elem_bytes < kind.native_size() {
            bail!(TreeError::InvalidLayout {
                reason: format!(
                    "elements of kind '{}' are at least {} bytes wide, but \
                    the descriptor declares {elem_bytes}.",
                    kind.name(),
                    kind.native_size(),
                ),
            })
        }

        if stride < elem_bytes {
            bail!(TreeError::InvalidLayout {
                reason: format!(
                    "the stride ({stride}) is smaller than the declared \
                    element width ({elem_bytes}), so consecutive elements \
                    would overlap.",
                ),
            })
        }

        Ok(Self {
            kind,
            count,
            offset,
            stride,
            elem_bytes,
            endian,
        })
    }

    /// Returns the canonical descriptor for a single element of `kind`:
    /// count 1, offset 0, element width and stride at the native size, and
    /// default byte order.
    pub fn default_for(kind: ElementKind) -> Self {
        if kind.is_structural() {
            return Self::structural(kind);
        }
        let size = kind.native_size();
        Self {
            kind,
            count: 1,
            offset: 0,
            stride: size,
            elem_bytes: size,
            endian: Endianness::DEFAULT,
        }
    }

    /// Returns the descriptor of a contiguous vector of `count` elements of
    /// `kind`: offset 0, element width and stride at the native size, and
    /// default byte order.
    pub fn vector(kind: ElementKind, count: usize) -> Self {
        if kind.is_structural() {
            return Self::structural(kind);
        }
        let size = kind.native_size();
        Self {
            kind,
            count,
            offset: 0,
            stride: size,
            elem_bytes: size,
            endian: Endianness::DEFAULT,
        }
    }

    /// Returns a descriptor for one of the structural kinds, with all
    /// numeric fields zeroed.
    pub const fn structural(kind: ElementKind) -> Self {
        Self {
            kind,
            count: 0,
            offset: 0,
            stride: 0,
            elem_bytes: 0,
            endian: Endianness::DEFAULT,
        }
    }

    /// Returns a copy of this descriptor relocated to `offset`.
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /* FIELD ACCESS */

    /// Returns the element kind of this descriptor.
    pub const fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Returns the number of elements this descriptor spans.
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Returns the byte offset of the first element from a base pointer.
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the byte distance between consecutive elements.
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the declared width in bytes of a single element.
    pub const fn elem_bytes(&self) -> usize {
        self.elem_bytes
    }

    /// Returns the byte-order tag of this descriptor.
    pub const fn endian(&self) -> Endianness {
        self.endian
    }

    /* LAYOUT */

    /// Returns true if `other` describes elements this descriptor's region
    /// could hold verbatim: same kind, same element width, same byte order,
    /// and same count. Offset and stride are locators, not content, and do
    /// not participate.
    pub fn is_compatible(&self, other: &DataType) -> bool {
        self.kind == other.kind
            && self.elem_bytes == other.elem_bytes
            && self.endian.resolve() == other.endian.resolve()
            && self.count == other.count
    }

    /// Returns the total footprint of the described region in bytes. The
    /// offset is a locator and does not count toward the total.
    pub const fn total_bytes(&self) -> usize {
        if self.kind.is_structural() {
            0
        } else {
            self.count * self.stride
        }
    }

    /// Returns the byte offset of element `index` from a base pointer.
    pub const fn element_offset(&self, index: usize) -> usize {
        self.offset + index * self.stride
    }

    /* SERIALIZATION */

    /// Renders this descriptor as its long-form schema text.
    pub fn to_json(&self) -> String {
        json!({
            "dtype": self.kind.name(),
            "length": self.count,
            "offset": self.offset,
            "stride": self.stride,
            "elem_bytes": self.elem_bytes,
            "endian": self.endian.name(),
        })
        .to_string()
    }

    /// Parses a long-form descriptor from schema text. Absent fields take
    /// the defaults of the named kind, mirroring `to_json`.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| TreeError::Parse {
                message: e.to_string(),
            })?;

        let obj = value
            .as_object()
            .ok_or_else(|| TreeError::Parse {
                message: "a descriptor must be a JSON object.".to_string(),
            })?;

        let name = obj
            .get("dtype")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TreeError::Parse {
                message: "a descriptor requires a 'dtype' name.".to_string(),
            })?;

        let kind = ElementKind::from_name(name)?;
        let defaults = Self::default_for(kind);
        let field = |key: &str, default: usize| -> Result<usize> {
            match obj.get(key) {
                None => Ok(default),
                Some(v) => {
                    v.as_u64().map(|n| n as usize).ok_or_else(|| {
                        TreeError::Parse {
                            message: format!(
                                "the descriptor field '{key}' must be a \
                                non-negative integer."
                            ),
                        }
                        .into()
                    })
                },
            }
        };

        let count = field("length", defaults.count)?;
        let offset = field("offset", defaults.offset)?;
        let elem_bytes = field("elem_bytes", defaults.elem_bytes)?;
        let stride = field("stride", elem_bytes.max(defaults.stride))?;
        let endian = match obj.get("endian") {
            None => Endianness::DEFAULT,
            Some(v) => {
                let name = v.as_str().ok_or_else(|| TreeError::Parse {
                    message: "the descriptor field 'endian' must be a \
                        string."
                        .to_string(),
                })?;
                Endianness::from_name(name)?
            },
        };

        Self::new(kind, count, offset, stride, elem_bytes, endian)
    }
}

impl Default for DataType {
    fn default() -> Self {
        Self::structural(ElementKind::EMPTY)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn native_sizes_match_registry() {
        assert_eq!(ElementKind::UINT8.native_size(), 1);
        assert_eq!(ElementKind::INT32.native_size(), 4);
        assert_eq!(ElementKind::FLOAT64.native_size(), 8);
        assert_eq!(ElementKind::OBJECT.native_size(), 0);
    }

    #[test]
    fn name_lookup_round_trips() {
        for kind in [
            ElementKind::BOOL,
            ElementKind::INT16,
            ElementKind::UINT64,
            ElementKind::FLOAT32,
            ElementKind::BYTESTR,
        ] {
            assert_eq!(
                ElementKind::from_name(kind.name()).unwrap(),
                kind
            );
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = ElementKind::from_name("quaternion").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TreeError>(),
            Some(TreeError::UnknownKind { .. })
        ));
    }

    #[test]
    fn default_descriptor_is_scalar_sized() {
        let dt = DataType::default_for(ElementKind::FLOAT64);
        assert_eq!(dt.count(), 1);
        assert_eq!(dt.offset(), 0);
        assert_eq!(dt.stride(), 8);
        assert_eq!(dt.elem_bytes(), 8);
        assert_eq!(dt.total_bytes(), 8);
    }

    #[test]
    fn narrow_stride_is_rejected() {
        let err = DataType::new(
            ElementKind::UINT32,
            4,
            0,
            2,
            4,
            Endianness::DEFAULT,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TreeError>(),
            Some(TreeError::InvalidLayout { .. })
        ));
    }

    #[test]
    fn narrow_element_is_rejected() {
        let err = DataType::new(
            ElementKind::UINT32,
            4,
            0,
            4,
            2,
            Endianness::DEFAULT,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TreeError>(),
            Some(TreeError::InvalidLayout { .. })
        ));
    }

    #[test]
    fn compatibility_ignores_locators() {
        let a = DataType::new(
            ElementKind::UINT32,
            8,
            0,
            4,
            4,
            Endianness::DEFAULT,
        )
        .unwrap();
        let b = DataType::new(
            ElementKind::UINT32,
            8,
            128,
            16,
            4,
            Endianness::DEFAULT,
        )
        .unwrap();
        assert!(a.is_compatible(&b));

        let c = DataType::new(
            ElementKind::UINT32,
            7,
            0,
            4,
            4,
            Endianness::DEFAULT,
        )
        .unwrap();
        assert!(!a.is_compatible(&c));
    }

    #[test]
    fn total_bytes_counts_stride_not_offset() {
        let dt = DataType::new(
            ElementKind::UINT16,
            10,
            64,
            8,
            2,
            Endianness::DEFAULT,
        )
        .unwrap();
        assert_eq!(dt.total_bytes(), 80);
        assert_eq!(dt.element_offset(0), 64);
        assert_eq!(dt.element_offset(3), 88);
    }

    #[test]
    fn descriptor_json_round_trips() {
        let dt = DataType::new(
            ElementKind::FLOAT32,
            5,
            12,
            8,
            4,
            Endianness::BIG,
        )
        .unwrap();
        let text = dt.to_json();
        let back = DataType::from_json(&text).unwrap();
        assert_eq!(dt, back);
    }
}
