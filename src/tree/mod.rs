//! # Tree Node Module
//!
//! This module implements the central entity of the crate: a tree node that
//! is exactly one of empty, a typed leaf over a byte region, an ordered
//! mapping from name to child, or an ordered sequence of children. A leaf's
//! region can be owned by the node, borrowed from an external party, or
//! backed by a shared memory map; all three answer to the same typed
//! read/write surface. Paths address descendants with `/`-separated
//! segments, mutating lookups auto-create intermediate objects, and
//! read-only lookups silence misses through a shared empty sentinel.

use anyhow::{bail, Context, Result};
use bytemuck::Zeroable;
use indexmap::IndexMap;
use memmap2::MmapOptions;

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::ops;
use std::path::Path;
use std::ptr;
use std::slice;
use std::sync::OnceLock;

use crate::array::{
    read_element, write_element, Element, TypedArray, TypedArrayMut,
};
use crate::dtype::{DataType, ElementKind};
use crate::error::TreeError;
use crate::schema::Schema;
use crate::tree::storage::Storage;
use crate::util::{join_path, split_path};

/* MODULES */

pub mod storage;

mod walker;

/* DEFINITIONS */

/// A node of the data tree. The payload discriminates the node's shape;
/// the storage records how its leaf bytes, if any, are held.
#[derive(Debug, Default)]
pub struct Node {
    payload: Payload,
    data: Storage,
}

/// The shape of a node. A leaf carries the descriptor its byte region is
/// interpreted with; the structural shapes carry children instead.
#[derive(Debug, Default)]
enum Payload {
    #[default]
    Empty,
    Leaf(DataType),
    Object(IndexMap<String, Node>),
    List(Vec<Node>),
}

/* EMPTY SENTINEL */

struct Sentinel(OnceLock<Node>);

/// SAFETY: the sentinel node is created empty, is reachable only through a
/// shared reference, and has no interior mutability, so sharing it across
/// threads cannot race.
unsafe impl Sync for Sentinel {}

static EMPTY_SENTINEL: Sentinel = Sentinel(OnceLock::new());

/* LEAF ACCESSOR GENERATOR */

/// Generates the named setter and accessor surface for one numeric element
/// kind, delegating to the generic internals.
macro_rules! leaf_api {
    ($t:ty, $set:ident, $set_slice:ident, $as:ident, $as_array:ident,
     $as_array_mut:ident) => {
        #[doc = concat!(
            "Stores a single `",
            stringify!($t),
            "`, in place when a compatible leaf is already bound."
        )]
        pub fn $set(&mut self, value: $t) {
            self.set_scalar(value)
        }

        #[doc = concat!(
            "Stores a copy of a `",
            stringify!($t),
            "` slice, in place when a compatible leaf is already bound."
        )]
        pub fn $set_slice(&mut self, values: &[$t]) {
            self.set_slice(values)
        }

        #[doc = concat!(
            "Returns the leaf's single `",
            stringify!($t),
            "` value, zero on an empty node, or a kind mismatch."
        )]
        pub fn $as(&self) -> Result<$t> {
            self.as_scalar()
        }

        #[doc = concat!(
            "Returns a read-only `",
            stringify!($t),
            "` view of the leaf region."
        )]
        pub fn $as_array(&self) -> Result<TypedArray<'_, $t>> {
            self.as_array()
        }

        #[doc = concat!(
            "Returns a read-write `",
            stringify!($t),
            "` view of the leaf region."
        )]
        pub fn $as_array_mut(&mut self) -> Result<TypedArrayMut<'_, $t>> {
            self.as_array_mut()
        }
    };
}

/// Generates `From` conversions for one numeric element kind so that
/// scalars, slices, and vectors can be appended or assigned directly.
macro_rules! leaf_from {
    ($t:ty) => {
        impl From<$t> for Node {
            fn from(value: $t) -> Self {
                let mut node = Node::new();
                node.set_scalar(value);
                node
            }
        }

        impl From<&[$t]> for Node {
            fn from(values: &[$t]) -> Self {
                let mut node = Node::new();
                node.set_slice(values);
                node
            }
        }

        impl From<Vec<$t>> for Node {
            fn from(values: Vec<$t>) -> Self {
                Node::from(values.as_slice())
            }
        }
    };
}

/* CONSTRUCTION */

impl Node {
    /// Returns a new empty node.
    pub fn new() -> Self {
        Self {
            payload: Payload::Empty,
            data: Storage::None,
        }
    }

    /// Returns a leaf provisioned with a zeroed owned region large enough
    /// for `dtype`. Structural descriptors produce the matching childless
    /// shape instead.
    pub fn with_dtype(dtype: DataType) -> Self {
        let mut node = Self::new();
        if dtype.kind().is_structural() {
            node.coerce_structural(dtype.kind());
        } else {
            node.alloc_leaf(dtype);
        }
        node
    }

    /// Returns a leaf describing the region at `data` without taking
    /// ownership of it.
    ///
    /// # Safety
    ///
    /// `data` must cover `dtype.offset() + dtype.total_bytes()` bytes and
    /// outlive the node and every node assigned from it.
    pub unsafe fn with_dtype_ptr(dtype: DataType, data: *mut u8) -> Self {
        let mut node = Self::new();
        node.set_external(dtype, data);
        node
    }

    /// Builds a tree conforming to `schema` over a freshly allocated,
    /// zeroed buffer owned by the returned root.
    pub fn with_schema(schema: &Schema) -> Result<Self> {
        let mut buf = vec![0u8; schema.total_bytes()];
        let mut root = Self::new();
        unsafe {
            walker::walk(&mut root, buf.as_mut_ptr(), schema, 0)?;
        }
        root.data = Storage::Owned(buf);
        Ok(root)
    }

    /// Builds a tree conforming to `schema` over externally-provided
    /// memory at `data`, borrowing it.
    ///
    /// # Safety
    ///
    /// `data` must cover `schema.total_bytes()` bytes and outlive the tree
    /// and every node assigned from it.
    pub unsafe fn with_schema_ptr(
        schema: &Schema,
        data: *mut u8,
    ) -> Result<Self> {
        let mut root = Self::new();
        walker::walk(&mut root, data, schema, 0)?;
        Ok(root)
    }

    /// Builds a tree conforming to `schema` by reading exactly
    /// `schema.total_bytes()` bytes from the file at `path` into a buffer
    /// owned by the returned root. A shorter file fails with a short-read
    /// error carrying the path.
    pub fn load(schema: &Schema, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let total = schema.total_bytes();
        let mut file = File::open(path).context(TreeError::Io {
            action: "open",
            path: path.to_path_buf(),
        })?;

        let mut buf = vec![0u8; total];
        let mut filled = 0;
        while filled < total {
            let count = file
                .read(&mut buf[filled..])
                .context(TreeError::Io {
                    action: "read",
                    path: path.to_path_buf(),
                })?;
            if count == 0 {
                bail!(TreeError::ShortRead {
                    path: path.to_path_buf(),
                    expected: total,
                    actual: filled,
                })
            }
            filled += count;
        }

        // The walker binds leaves as borrowers of `buf`; the root adopts
        // the buffer only after the walk returns, so no traversal step can
        // release it.
        let mut root = Self::new();
        unsafe {
            walker::walk(&mut root, buf.as_mut_ptr(), schema, 0)?;
        }
        root.data = Storage::Owned(buf);
        Ok(root)
    }

    /// Builds a tree conforming to `schema` over a shared read-write map
    /// of the file at `path`, creating it if absent. An empty file is
    /// grown to `schema.total_bytes()`; a non-empty file shorter than that
    /// fails with a short-read error.
    pub fn mmap(schema: &Schema, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let total = schema.total_bytes();

        if total == 0 {
            let mut root = Self::new();
            unsafe {
                walker::walk(&mut root, ptr::null_mut(), schema, 0)?;
            }
            return Ok(root);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .context(TreeError::Io {
                action: "open",
                path: path.to_path_buf(),
            })?;

        let actual = file
            .metadata()
            .context(TreeError::Io {
                action: "stat",
                path: path.to_path_buf(),
            })?
            .len() as usize;
        if actual == 0 {
            file.set_len(total as u64)
                .context(TreeError::Io {
                    action: "grow",
                    path: path.to_path_buf(),
                })?;
        } else if actual < total {
            bail!(TreeError::ShortRead {
                path: path.to_path_buf(),
                expected: total,
                actual,
            })
        }

        let mut map = unsafe {
            MmapOptions::new()
                .len(total)
                .map_mut(&file)
                .context(TreeError::Io {
                    action: "map",
                    path: path.to_path_buf(),
                })?
        };

        let base = map.as_mut_ptr();
        let mut root = Self::new();
        unsafe {
            walker::walk(&mut root, base, schema, 0)?;
        }
        root.data = Storage::Mmap { file, map };
        Ok(root)
    }

    /// Returns the canonical process-wide empty node, the target of every
    /// failed read-only lookup. Its address is stable for the life of the
    /// process, and the shared reference keeps it immutable.
    pub fn empty() -> &'static Node {
        EMPTY_SENTINEL.0.get_or_init(Node::new)
    }
}

/* SHAPE AND LIFECYCLE */

impl Node {
    /// Returns the element kind discriminating this node's shape.
    pub fn kind(&self) -> ElementKind {
        match &self.payload {
            Payload::Empty => ElementKind::EMPTY,
            Payload::Leaf(dtype) => dtype.kind(),
            Payload::Object(_) => ElementKind::OBJECT,
            Payload::List(_) => ElementKind::LIST,
        }
    }

    /// Returns this node's descriptor: the leaf's own, or a structural
    /// marker for the other shapes.
    pub fn dtype(&self) -> DataType {
        match &self.payload {
            Payload::Leaf(dtype) => *dtype,
            _ => DataType::structural(self.kind()),
        }
    }

    /// Returns true if this node is empty.
    pub fn is_empty(&self) -> bool {
        matches!(self.payload, Payload::Empty)
    }

    /// Returns true if this node's release would free resources (an owned
    /// region or a memory map).
    pub fn is_owner(&self) -> bool {
        self.data.is_owner()
    }

    /// Returns the node to the empty shape, releasing any owned or mapped
    /// storage and dropping all children.
    pub fn reset(&mut self) {
        self.payload = Payload::Empty;
        self.data.release();
    }

    /// Returns the recursive sum of the byte footprints of every leaf at
    /// or below this node.
    pub fn total_bytes(&self) -> usize {
        match &self.payload {
            Payload::Empty => 0,
            Payload::Leaf(dtype) => dtype.total_bytes(),
            Payload::Object(entries) => entries
                .values()
                .map(Node::total_bytes)
                .sum(),
            Payload::List(items) => items
                .iter()
                .map(Node::total_bytes)
                .sum(),
        }
    }

    /* COERCION */

    /// Reshapes this node into an empty object, releasing prior state. A
    /// node that is already an object keeps its children.
    pub(super) fn coerce_object(&mut self) {
        if !matches!(self.payload, Payload::Object(_)) {
            self.data.release();
            self.payload = Payload::Object(IndexMap::new());
        }
    }

    /// Reshapes this node into an empty list, releasing prior state. A
    /// node that is already a list keeps its children.
    pub(super) fn coerce_list(&mut self) {
        if !matches!(self.payload, Payload::List(_)) {
            self.data.release();
            self.payload = Payload::List(Vec::new());
        }
    }

    /// Reshapes this node into the named childless structural shape.
    pub(super) fn coerce_structural(&mut self, kind: ElementKind) {
        match kind {
            ElementKind::OBJECT => self.coerce_object(),
            ElementKind::LIST => self.coerce_list(),
            _ => self.reset(),
        }
    }

    /* STORAGE INTERNALS */

    /// Releases prior state and provisions a zeroed owned region covering
    /// `dtype`. Returns the region's base pointer.
    fn alloc_leaf(&mut self, dtype: DataType) -> *mut u8 {
        self.payload = Payload::Empty;
        self.data.release();
        let mut buf = vec![0u8; dtype.offset() + dtype.total_bytes()];
        let base = buf.as_mut_ptr();
        self.data = Storage::Owned(buf);
        self.payload = Payload::Leaf(dtype);
        base
    }

    /// Returns the leaf region's base pointer, failing on a leaf that has
    /// a descriptor but no bound storage.
    fn leaf_ptr(&self) -> Result<*const u8> {
        let base = self.data.base_ptr();
        if base.is_null() {
            bail!(TreeError::ShapeMismatch {
                operation: "access a leaf region with no bound storage",
                found: self.kind(),
            })
        }
        Ok(base)
    }

    /// Writable variant of [`Self::leaf_ptr`].
    fn leaf_ptr_mut(&mut self) -> Result<*mut u8> {
        let base = self.data.base_ptr_mut();
        if base.is_null() {
            bail!(TreeError::ShapeMismatch {
                operation: "access a leaf region with no bound storage",
                found: self.kind(),
            })
        }
        Ok(base)
    }
}

/* TYPED SETTERS */

impl Node {
    /// Stores a single scalar of any numeric element kind. A bound leaf
    /// already compatible with the value is written through in place, so
    /// schema-bound and borrowed regions see the update; anything else is
    /// discarded in favor of a freshly owned region.
    pub fn set_scalar<T: Element>(&mut self, value: T) {
        let dtype = DataType::default_for(T::KIND);
        if let Some(existing) = self.compatible_leaf(&dtype) {
            if let Ok(base) = self.leaf_ptr_mut() {
                unsafe { write_element(base, &existing, 0, value) };
                return;
            }
        }
        let base = self.alloc_leaf(dtype);
        unsafe { write_element(base, &dtype, 0, value) };
    }

    /// Stores a contiguous copy of `values`. A compatible bound leaf is
    /// written through in place, honoring its stride; anything else is
    /// replaced by a freshly owned contiguous region.
    pub fn set_slice<T: Element>(&mut self, values: &[T]) {
        let dtype = DataType::vector(T::KIND, values.len());
        if let Some(existing) = self.compatible_leaf(&dtype) {
            if let Ok(base) = self.leaf_ptr_mut() {
                for (i, value) in values.iter().enumerate() {
                    unsafe {
                        write_element(base, &existing, i, *value)
                    };
                }
                return;
            }
        }
        let base = self.alloc_leaf(dtype);
        unsafe {
            ptr::copy_nonoverlapping(
                values.as_ptr() as *const u8,
                base,
                std::mem::size_of_val(values),
            );
        }
    }

    /// Stores a boolean as a single byte, in place when a compatible leaf
    /// is already bound.
    pub fn set_bool(&mut self, value: bool) {
        let dtype = DataType::default_for(ElementKind::BOOL);
        if let Some(existing) = self.compatible_leaf(&dtype) {
            if let Ok(base) = self.leaf_ptr_mut() {
                unsafe {
                    base.add(existing.element_offset(0))
                        .write(value as u8)
                };
                return;
            }
        }
        let base = self.alloc_leaf(dtype);
        unsafe { base.write(value as u8) };
    }

    /// Returns a copy of this leaf's descriptor when it could hold the
    /// elements `dtype` describes verbatim.
    fn compatible_leaf(&self, dtype: &DataType) -> Option<DataType> {
        match &self.payload {
            Payload::Leaf(existing) if existing.is_compatible(dtype) => {
                Some(*existing)
            },
            _ => None,
        }
    }

    /// Discards prior state and stores the raw bytes of `value` as a
    /// byte-string leaf.
    pub fn set_bytestr(&mut self, value: &str) {
        let dtype = DataType::vector(ElementKind::BYTESTR, value.len());
        let base = self.alloc_leaf(dtype);
        unsafe {
            ptr::copy_nonoverlapping(value.as_ptr(), base, value.len());
        }
    }

    /// Records `dtype` without provisioning storage. The caller follows up
    /// with an external binding or a schema walk.
    pub fn set_dtype(&mut self, dtype: DataType) {
        self.payload = Payload::Empty;
        self.data.release();
        if dtype.kind().is_structural() {
            self.coerce_structural(dtype.kind());
        } else {
            self.payload = Payload::Leaf(dtype);
        }
    }

    /// Binds this node as a leaf over the externally-owned region at
    /// `base`, releasing prior state. The node never frees the region.
    ///
    /// # Safety
    ///
    /// `base` must cover `dtype.offset() + dtype.total_bytes()` bytes and
    /// outlive this node and every node assigned from it.
    pub unsafe fn set_external(&mut self, dtype: DataType, base: *mut u8) {
        self.payload = Payload::Empty;
        self.data.release();
        if dtype.kind().is_structural() {
            self.coerce_structural(dtype.kind());
        } else {
            self.payload = Payload::Leaf(dtype);
            self.data = Storage::Borrowed(base);
        }
    }

    /// Adopts a typed view's pointer and descriptor as a borrowed leaf,
    /// without copying elements.
    ///
    /// # Safety
    ///
    /// The view's region must outlive this node and every node assigned
    /// from it.
    pub unsafe fn set_view<T: Element>(
        &mut self,
        view: &TypedArrayMut<'_, T>,
    ) {
        self.set_external(*view.dtype(), view.data_ptr());
    }

    /// Replaces this node with a copy of `source`. Owned leaf regions are
    /// deep-copied; borrowed regions are shared; a mapped region is
    /// adopted as borrowed so that the map keeps exactly one owner.
    pub fn set_node(&mut self, source: &Node) {
        match &source.payload {
            Payload::Empty => self.reset(),
            Payload::Leaf(dtype) => match &source.data {
                Storage::None => self.set_dtype(*dtype),
                Storage::Owned(buf) => {
                    let rebased = dtype.with_offset(0);
                    let base = self.alloc_leaf(rebased);
                    unsafe {
                        ptr::copy_nonoverlapping(
                            buf.as_ptr().add(dtype.offset()),
                            base,
                            rebased.total_bytes(),
                        );
                    }
                },
                Storage::Borrowed(p) => unsafe {
                    self.set_external(*dtype, *p)
                },
                Storage::Mmap { map, .. } => unsafe {
                    self.set_external(*dtype, map.as_ptr() as *mut u8)
                },
            },
            Payload::Object(entries) => {
                self.reset();
                self.coerce_object();
                for (name, child) in entries {
                    let mut copy = Node::new();
                    copy.set_node(child);
                    self.insert_child(name.clone(), copy);
                }
            },
            Payload::List(items) => {
                self.reset();
                self.coerce_list();
                for child in items {
                    let mut copy = Node::new();
                    copy.set_node(child);
                    self.append(copy);
                }
            },
        }
    }

    leaf_api!(i8, set_int8, set_int8_slice, as_int8, as_int8_array,
        as_int8_array_mut);
    leaf_api!(i16, set_int16, set_int16_slice, as_int16, as_int16_array,
        as_int16_array_mut);
    leaf_api!(i32, set_int32, set_int32_slice, as_int32, as_int32_array,
        as_int32_array_mut);
    leaf_api!(i64, set_int64, set_int64_slice, as_int64, as_int64_array,
        as_int64_array_mut);
    leaf_api!(u8, set_uint8, set_uint8_slice, as_uint8, as_uint8_array,
        as_uint8_array_mut);
    leaf_api!(u16, set_uint16, set_uint16_slice, as_uint16,
        as_uint16_array, as_uint16_array_mut);
    leaf_api!(u32, set_uint32, set_uint32_slice, as_uint32,
        as_uint32_array, as_uint32_array_mut);
    leaf_api!(u64, set_uint64, set_uint64_slice, as_uint64,
        as_uint64_array, as_uint64_array_mut);
    leaf_api!(f32, set_float32, set_float32_slice, as_float32,
        as_float32_array, as_float32_array_mut);
    leaf_api!(f64, set_float64, set_float64_slice, as_float64,
        as_float64_array, as_float64_array_mut);
}

/* TYPED GETTERS */

impl Node {
    /// Returns the leaf's single element of kind `T`. An empty node reads
    /// as zero so that fluent lookups of missing paths stay quiet; any
    /// other kind disagreement is a mismatch error.
    pub fn as_scalar<T: Element>(&self) -> Result<T> {
        match &self.payload {
            Payload::Empty => Ok(T::zeroed()),
            Payload::Leaf(dtype) if dtype.kind() == T::KIND => {
                if dtype.count() == 0 {
                    bail!(TreeError::IndexOutOfRange {
                        index: 0,
                        length: 0,
                    })
                }
                let base = self.leaf_ptr()?;
                Ok(unsafe { read_element(base, dtype, 0) })
            },
            _ => bail!(TreeError::KindMismatch {
                expected: T::KIND,
                found: self.kind(),
            }),
        }
    }

    /// Returns a read-only typed view of the leaf region. An empty node
    /// yields a zero-length view.
    pub fn as_array<T: Element>(&self) -> Result<TypedArray<'_, T>> {
        match &self.payload {
            Payload::Empty => unsafe {
                TypedArray::from_raw_parts(
                    ptr::null(),
                    DataType::vector(T::KIND, 0),
                )
            },
            Payload::Leaf(dtype) if dtype.kind() == T::KIND => {
                let base = self.leaf_ptr()?;
                unsafe { TypedArray::from_raw_parts(base, *dtype) }
            },
            _ => bail!(TreeError::KindMismatch {
                expected: T::KIND,
                found: self.kind(),
            }),
        }
    }

    /// Returns a read-write typed view of the leaf region.
    pub fn as_array_mut<T: Element>(
        &mut self,
    ) -> Result<TypedArrayMut<'_, T>> {
        let dtype = match &self.payload {
            Payload::Leaf(dtype) if dtype.kind() == T::KIND => *dtype,
            _ => bail!(TreeError::KindMismatch {
                expected: T::KIND,
                found: self.kind(),
            }),
        };
        let base = self.leaf_ptr_mut()?;
        unsafe { TypedArrayMut::from_raw_parts(base, dtype) }
    }

    /// Returns the leaf's boolean value, false on an empty node.
    pub fn as_bool(&self) -> Result<bool> {
        match &self.payload {
            Payload::Empty => Ok(false),
            Payload::Leaf(dtype)
                if dtype.kind() == ElementKind::BOOL =>
            {
                if dtype.count() == 0 {
                    bail!(TreeError::IndexOutOfRange {
                        index: 0,
                        length: 0,
                    })
                }
                let base = self.leaf_ptr()?;
                Ok(unsafe { *base.add(dtype.element_offset(0)) } != 0)
            },
            _ => bail!(TreeError::KindMismatch {
                expected: ElementKind::BOOL,
                found: self.kind(),
            }),
        }
    }

    /// Returns the leaf's byte-string contents, gathered across its
    /// stride; an empty node reads as the empty string.
    pub fn as_bytestr(&self) -> Result<String> {
        match &self.payload {
            Payload::Empty => Ok(String::new()),
            Payload::Leaf(dtype)
                if dtype.kind() == ElementKind::BYTESTR =>
            {
                let base = self.leaf_ptr()?;
                let mut bytes = Vec::with_capacity(dtype.count());
                for i in 0..dtype.count() {
                    bytes.push(unsafe {
                        *base.add(dtype.element_offset(i))
                    });
                }
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            },
            _ => bail!(TreeError::KindMismatch {
                expected: ElementKind::BYTESTR,
                found: self.kind(),
            }),
        }
    }

    /* WIDENING CONVERSIONS */

    /// Widens the leaf's first element to a signed 64-bit integer across
    /// every numeric kind. Structural shapes and unreadable leaves convert
    /// to zero.
    pub fn to_int64(&self) -> i64 {
        self.widen(|v| v as i64, |v| v as i64, |v| v as i64)
    }

    /// Widens the leaf's first element to an unsigned 64-bit integer.
    pub fn to_uint64(&self) -> u64 {
        self.widen(|v| v as u64, |v| v as u64, |v| v as u64)
    }

    /// Widens the leaf's first element to a double-precision float.
    pub fn to_float64(&self) -> f64 {
        self.widen(|v| v as f64, |v| v as f64, |v| v)
    }

    /// Shared widening dispatch: reads the first element under its own
    /// kind and converts through the matching closure.
    fn widen<V>(
        &self,
        from_i: impl Fn(i64) -> V,
        from_u: impl Fn(u64) -> V,
        from_f: impl Fn(f64) -> V,
    ) -> V {
        match self.kind() {
            ElementKind::BOOL => {
                from_u(self.as_bool().unwrap_or(false) as u64)
            },
            ElementKind::INT8 => from_i(self.first_or_zero::<i8>() as i64),
            ElementKind::INT16 => {
                from_i(self.first_or_zero::<i16>() as i64)
            },
            ElementKind::INT32 => {
                from_i(self.first_or_zero::<i32>() as i64)
            },
            ElementKind::INT64 => from_i(self.first_or_zero::<i64>()),
            ElementKind::UINT8 => {
                from_u(self.first_or_zero::<u8>() as u64)
            },
            ElementKind::UINT16 => {
                from_u(self.first_or_zero::<u16>() as u64)
            },
            ElementKind::UINT32 => {
                from_u(self.first_or_zero::<u32>() as u64)
            },
            ElementKind::UINT64 => from_u(self.first_or_zero::<u64>()),
            ElementKind::FLOAT32 => {
                from_f(self.first_or_zero::<f32>() as f64)
            },
            ElementKind::FLOAT64 => from_f(self.first_or_zero::<f64>()),
            _ => from_u(0),
        }
    }

    fn first_or_zero<T: Element>(&self) -> T {
        self.as_scalar().unwrap_or_else(|_| T::zeroed())
    }
}

/* STRUCTURAL OPERATIONS */

impl Node {
    /// Descends `path`, coercing this node to an object if it is not one
    /// and auto-creating empty children for missing segments. Returns the
    /// terminal node for mutation.
    pub fn fetch(&mut self, path: &str) -> &mut Node {
        self.coerce_object();
        let (curr, next) = split_path(path);
        let entries = match &mut self.payload {
            Payload::Object(entries) => entries,
            _ => unreachable!(),
        };
        let child = entries
            .entry(curr.to_string())
            .or_default();
        match next {
            None => child,
            Some(rest) => child.fetch(rest),
        }
    }

    /// Returns the `index`-th child for mutation, coercing this node to a
    /// list if it is not one and growing it with empty nodes as needed.
    pub fn fetch_index(&mut self, index: usize) -> &mut Node {
        self.coerce_list();
        let items = match &mut self.payload {
            Payload::List(items) => items,
            _ => unreachable!(),
        };
        while items.len() <= index {
            items.push(Node::new());
        }
        &mut items[index]
    }

    /// Looks `path` up without coercing or creating anything. A missing
    /// entry, or a lookup against a non-object, yields the shared empty
    /// sentinel.
    pub fn entry(&self, path: &str) -> &Node {
        let entries = match &self.payload {
            Payload::Object(entries) => entries,
            _ => return Node::empty(),
        };
        let (curr, next) = split_path(path);
        match entries.get(curr) {
            None => Node::empty(),
            Some(child) => match next {
                None => child,
                Some(rest) => child.entry(rest),
            },
        }
    }

    /// Looks the `index`-th child up without coercing or creating
    /// anything; misses yield the shared empty sentinel.
    pub fn entry_index(&self, index: usize) -> &Node {
        match &self.payload {
            Payload::List(items) => {
                items.get(index).unwrap_or_else(|| Node::empty())
            },
            _ => Node::empty(),
        }
    }

    /// Coerces this node to a list and pushes a child initialized from
    /// `value`.
    pub fn append(&mut self, value: impl Into<Node>) {
        self.coerce_list();
        match &mut self.payload {
            Payload::List(items) => items.push(value.into()),
            _ => unreachable!(),
        }
    }

    /// Installs `child` under `name`, coercing this node to an object.
    pub(super) fn insert_child(&mut self, name: String, child: Node) {
        self.coerce_object();
        match &mut self.payload {
            Payload::Object(entries) => {
                entries.insert(name, child);
            },
            _ => unreachable!(),
        }
    }

    /// Returns true if `path` resolves through object children from here.
    /// Only meaningful on objects; every other shape answers false.
    pub fn has_path(&self, path: &str) -> bool {
        let entries = match &self.payload {
            Payload::Object(entries) => entries,
            _ => return false,
        };
        let (curr, next) = split_path(path);
        match (entries.get(curr), next) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(child), Some(rest)) => child.has_path(rest),
        }
    }

    /// Erases the child at `path`. Returns false when the path is absent
    /// or this node is not an object; the root itself is never deleted.
    pub fn remove(&mut self, path: &str) -> bool {
        let entries = match &mut self.payload {
            Payload::Object(entries) => entries,
            _ => return false,
        };
        let (curr, next) = split_path(path);
        match next {
            None => entries.shift_remove(curr).is_some(),
            Some(rest) => entries
                .get_mut(curr)
                .map(|child| child.remove(rest))
                .unwrap_or(false),
        }
    }

    /// Erases the `index`-th child of a list. Returns false when out of
    /// range or this node is not a list.
    pub fn remove_index(&mut self, index: usize) -> bool {
        match &mut self.payload {
            Payload::List(items) if index < items.len() => {
                items.remove(index);
                true
            },
            _ => false,
        }
    }

    /// Returns the number of direct children of an object or list, and
    /// zero for the other shapes.
    pub fn number_of_entries(&self) -> usize {
        match &self.payload {
            Payload::Object(entries) => entries.len(),
            Payload::List(items) => items.len(),
            _ => 0,
        }
    }

    /// Returns the direct child names of an object, or, with `expand`, the
    /// `/`-joined paths to every non-object descendant.
    pub fn paths(&self, expand: bool) -> Vec<String> {
        let mut out = Vec::new();
        if let Payload::Object(entries) = &self.payload {
            if expand {
                self.collect_paths("", &mut out);
            } else {
                out.extend(entries.keys().cloned());
            }
        }
        out
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        if let Payload::Object(entries) = &self.payload {
            for (name, child) in entries {
                let path = join_path(prefix, name);
                if matches!(child.payload, Payload::Object(_)) {
                    child.collect_paths(&path, out);
                } else {
                    out.push(path);
                }
            }
        }
    }
}

/* RENDERING AND SERIALIZATION */

impl Node {
    /// Renders a JSON-like text reproducing the structural and
    /// leaf-descriptor shape of this tree, without values.
    pub fn json_schema(&self) -> String {
        let mut out = String::new();
        self.write_json_schema(&mut out);
        out
    }

    /// Reparses this tree's shape as a schema value.
    pub fn schema(&self) -> Result<Schema> {
        Schema::parse(&self.json_schema())
    }

    fn write_json_schema(&self, out: &mut String) {
        match &self.payload {
            Payload::Empty => out.push_str("\"empty\""),
            Payload::Leaf(dtype) => {
                out.push_str(&leaf_schema_text(dtype))
            },
            Payload::Object(entries) => {
                out.push('{');
                for (i, (name, child)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push('"');
                    out.push_str(name);
                    out.push_str("\": ");
                    child.write_json_schema(out);
                }
                out.push('}');
            },
            Payload::List(items) => {
                out.push('[');
                for (i, child) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    child.write_json_schema(out);
                }
                out.push(']');
            },
        }
    }

    /// Renders a JSON-like text of this tree including leaf values.
    /// Byte-string leaves are quoted when `json_fmt` is set.
    pub fn to_text(&self, json_fmt: bool) -> String {
        let mut out = String::new();
        self.write_text(&mut out, json_fmt);
        out
    }

    fn write_text(&self, out: &mut String, json_fmt: bool) {
        match &self.payload {
            Payload::Empty => out.push_str("null"),
            Payload::Leaf(dtype) => {
                self.write_leaf_text(out, dtype, json_fmt)
            },
            Payload::Object(entries) => {
                out.push('{');
                for (i, (name, child)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push('"');
                    out.push_str(name);
                    out.push_str("\": ");
                    child.write_text(out, true);
                }
                out.push('}');
            },
            Payload::List(items) => {
                out.push('[');
                for (i, child) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    child.write_text(out, true);
                }
                out.push(']');
            },
        }
    }

    fn write_leaf_text(
        &self,
        out: &mut String,
        dtype: &DataType,
        json_fmt: bool,
    ) {
        match dtype.kind() {
            ElementKind::BOOL => out.push_str(
                if self.as_bool().unwrap_or(false) {
                    "true"
                } else {
                    "false"
                },
            ),
            ElementKind::BYTESTR => {
                let text = self
                    .as_bytestr()
                    .unwrap_or_default();
                if json_fmt {
                    out.push('"');
                    out.push_str(&text);
                    out.push('"');
                } else {
                    out.push_str(&text);
                }
            },
            ElementKind::INT8 => self.write_numeric::<i8>(out),
            ElementKind::INT16 => self.write_numeric::<i16>(out),
            ElementKind::INT32 => self.write_numeric::<i32>(out),
            ElementKind::INT64 => self.write_numeric::<i64>(out),
            ElementKind::UINT8 => self.write_numeric::<u8>(out),
            ElementKind::UINT16 => self.write_numeric::<u16>(out),
            ElementKind::UINT32 => self.write_numeric::<u32>(out),
            ElementKind::UINT64 => self.write_numeric::<u64>(out),
            ElementKind::FLOAT32 => self.write_numeric::<f32>(out),
            ElementKind::FLOAT64 => self.write_numeric::<f64>(out),
            _ => out.push_str("null"),
        }
    }

    fn write_numeric<T: Element + fmt::Display>(&self, out: &mut String) {
        let view = match self.as_array::<T>() {
            Ok(view) => view,
            Err(_) => {
                out.push_str("null");
                return;
            },
        };
        if view.len() == 1 {
            if let Ok(value) = view.get(0) {
                out.push_str(&value.to_string());
            }
            return;
        }
        out.push('[');
        for i in 0..view.len() {
            if i > 0 {
                out.push_str(", ");
            }
            if let Ok(value) = view.get(i) {
                out.push_str(&value.to_string());
            }
        }
        out.push(']');
    }

    /// Serializes every leaf's bytes depth-first into a fresh buffer. With
    /// `compact`, each leaf contributes `count * elem_bytes` tightly
    /// repacked bytes; otherwise its full `total_bytes()` region is copied
    /// verbatim, stride included.
    pub fn serialize(&self, compact: bool) -> Vec<u8> {
        let mut dst = Vec::with_capacity(self.total_bytes());
        self.serialize_into(&mut dst, compact);
        dst
    }

    /// Appends this tree's serialized leaf bytes to `dst` depth-first.
    pub fn serialize_into(&self, dst: &mut Vec<u8>, compact: bool) {
        match &self.payload {
            Payload::Empty => {},
            Payload::Leaf(dtype) => {
                let base = match self.leaf_ptr() {
                    Ok(base) => base,
                    Err(_) => return,
                };
                if compact {
                    for i in 0..dtype.count() {
                        let start = dtype.element_offset(i);
                        dst.extend_from_slice(unsafe {
                            slice::from_raw_parts(
                                base.add(start),
                                dtype.elem_bytes(),
                            )
                        });
                    }
                } else {
                    dst.extend_from_slice(unsafe {
                        slice::from_raw_parts(
                            base.add(dtype.offset()),
                            dtype.total_bytes(),
                        )
                    });
                }
            },
            Payload::Object(entries) => {
                for child in entries.values() {
                    child.serialize_into(dst, compact);
                }
            },
            Payload::List(items) => {
                for child in items {
                    child.serialize_into(dst, compact);
                }
            },
        }
    }

    /// Serializes this tree into the file at `path`.
    pub fn serialize_to_file(
        &self,
        path: impl AsRef<Path>,
        compact: bool,
    ) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.serialize(compact)).context(
            TreeError::Io {
                action: "write",
                path: path.to_path_buf(),
            },
        )?;
        Ok(())
    }
}

/* COMPARISON */

impl Node {
    /// Compares this tree against `other`, recording every divergence in
    /// `diff` as a mirror tree of byte-string descriptions. Equal subtrees
    /// leave no entry. With `widen`, numeric leaves compare through their
    /// double-precision widening instead of exact kind compatibility.
    pub fn compare(
        &self,
        other: &Node,
        diff: &mut Node,
        widen: bool,
    ) -> bool {
        diff.reset();
        self.compare_into(other, diff, widen)
    }

    fn compare_into(
        &self,
        other: &Node,
        diff: &mut Node,
        widen: bool,
    ) -> bool {
        match (&self.payload, &other.payload) {
            (Payload::Empty, Payload::Empty) => true,
            (Payload::Leaf(a), Payload::Leaf(b)) => {
                let equal = if widen {
                    self.widened_leaf_eq(other, a, b)
                } else {
                    self.leaf_eq(other, a, b)
                };
                if !equal {
                    diff.set_bytestr(&format!(
                        "leaf mismatch ({} x{} vs {} x{})",
                        a.kind(),
                        a.count(),
                        b.kind(),
                        b.count(),
                    ));
                }
                equal
            },
            (Payload::Object(a), Payload::Object(b)) => {
                let mut equal = true;
                for (name, child) in a {
                    match b.get(name) {
                        None => {
                            diff.fetch(name).set_bytestr(
                                "missing from right-hand tree",
                            );
                            equal = false;
                        },
                        Some(counterpart) => {
                            if child.compare_into(
                                counterpart,
                                diff.fetch(name),
                                widen,
                            ) {
                                diff.remove(name);
                            } else {
                                equal = false;
                            }
                        },
                    }
                }
                for name in b.keys() {
                    if !a.contains_key(name) {
                        diff.fetch(name)
                            .set_bytestr("missing from left-hand tree");
                        equal = false;
                    }
                }
                equal
            },
            (Payload::List(a), Payload::List(b)) => {
                if a.len() != b.len() {
                    diff.set_bytestr(&format!(
                        "list length mismatch ({} vs {})",
                        a.len(),
                        b.len(),
                    ));
                    return false;
                }
                let mut equal = true;
                for (i, (child, counterpart)) in
                    a.iter().zip(b).enumerate()
                {
                    if !child.compare_into(
                        counterpart,
                        diff.fetch_index(i),
                        widen,
                    ) {
                        equal = false;
                    }
                }
                equal
            },
            _ => {
                diff.set_bytestr(&format!(
                    "shape mismatch ({} vs {})",
                    self.kind(),
                    other.kind(),
                ));
                false
            },
        }
    }

    fn leaf_eq(&self, other: &Node, a: &DataType, b: &DataType) -> bool {
        if !a.is_compatible(b) {
            return false;
        }
        let (pa, pb) = (self.data.base_ptr(), other.data.base_ptr());
        if pa.is_null() || pb.is_null() {
            return pa.is_null() && pb.is_null();
        }

        macro_rules! elementwise {
            ($t:ty) => {
                (0..a.count()).all(|i| unsafe {
                    read_element::<$t>(pa, a, i)
                        == read_element::<$t>(pb, b, i)
                })
            };
        }

        match a.kind() {
            ElementKind::INT8 => elementwise!(i8),
            ElementKind::INT16 => elementwise!(i16),
            ElementKind::INT32 => elementwise!(i32),
            ElementKind::INT64 => elementwise!(i64),
            ElementKind::UINT8 => elementwise!(u8),
            ElementKind::UINT16 => elementwise!(u16),
            ElementKind::UINT32 => elementwise!(u32),
            ElementKind::UINT64 => elementwise!(u64),
            ElementKind::FLOAT32 => elementwise!(f32),
            ElementKind::FLOAT64 => elementwise!(f64),
            ElementKind::BOOL | ElementKind::BYTESTR => {
                (0..a.count()).all(|i| unsafe {
                    *pa.add(a.element_offset(i))
                        == *pb.add(b.element_offset(i))
                })
            },
            _ => true,
        }
    }

    fn widened_leaf_eq(
        &self,
        other: &Node,
        a: &DataType,
        b: &DataType,
    ) -> bool {
        if !a.kind().is_numeric() || !b.kind().is_numeric() {
            return self.leaf_eq(other, a, b);
        }
        if a.count() != b.count() {
            return false;
        }
        let (pa, pb) = (self.data.base_ptr(), other.data.base_ptr());
        if pa.is_null() || pb.is_null() {
            return pa.is_null() && pb.is_null();
        }
        (0..a.count()).all(|i| {
            element_as_f64(pa, a, i) == element_as_f64(pb, b, i)
        })
    }
}

/// Renders a leaf descriptor in schema form. Offsets are omitted: the
/// schema a tree reports describes the sibling-sequential layout its
/// serialized bytes take, not where this leaf happens to sit in its own
/// storage. Stride and element width appear only when they diverge from
/// the defaults a reader would assume.
fn leaf_schema_text(dtype: &DataType) -> String {
    let mut obj = serde_json::Map::new();
    obj.insert(
        "dtype".to_string(),
        serde_json::json!(dtype.kind().name()),
    );
    obj.insert(
        "length".to_string(),
        serde_json::json!(dtype.count()),
    );
    if dtype.elem_bytes() != dtype.kind().native_size() {
        obj.insert(
            "elem_bytes".to_string(),
            serde_json::json!(dtype.elem_bytes()),
        );
    }
    if dtype.stride() != dtype.elem_bytes() {
        obj.insert(
            "stride".to_string(),
            serde_json::json!(dtype.stride()),
        );
    }
    if dtype.endian() != crate::dtype::Endianness::DEFAULT {
        obj.insert(
            "endian".to_string(),
            serde_json::json!(dtype.endian().name()),
        );
    }
    serde_json::Value::Object(obj).to_string()
}

/// Reads element `index` of a numeric leaf region widened to a double.
fn element_as_f64(base: *const u8, dtype: &DataType, index: usize) -> f64 {
    macro_rules! widened {
        ($t:ty) => {
            unsafe { read_element::<$t>(base, dtype, index) as f64 }
        };
    }
    match dtype.kind() {
        ElementKind::INT8 => widened!(i8),
        ElementKind::INT16 => widened!(i16),
        ElementKind::INT32 => widened!(i32),
        ElementKind::INT64 => widened!(i64),
        ElementKind::UINT8 => widened!(u8),
        ElementKind::UINT16 => widened!(u16),
        ElementKind::UINT32 => widened!(u32),
        ElementKind::UINT64 => widened!(u64),
        ElementKind::FLOAT32 => widened!(f32),
        ElementKind::FLOAT64 => widened!(f64),
        _ => 0.0,
    }
}

/* TRAIT IMPLEMENTATIONS */

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (&self.payload, &other.payload) {
            (Payload::Empty, Payload::Empty) => true,
            (Payload::Leaf(a), Payload::Leaf(b)) => {
                self.leaf_eq(other, a, b)
            },
            (Payload::Object(a), Payload::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(name, child)| {
                        b.get(name).is_some_and(|c| child == c)
                    })
            },
            (Payload::List(a), Payload::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Clone for Node {
    fn clone(&self) -> Self {
        let mut copy = Node::new();
        copy.set_node(self);
        copy
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text(true))
    }
}

impl ops::Index<&str> for Node {
    type Output = Node;

    fn index(&self, path: &str) -> &Node {
        self.entry(path)
    }
}

impl ops::IndexMut<&str> for Node {
    fn index_mut(&mut self, path: &str) -> &mut Node {
        self.fetch(path)
    }
}

impl ops::Index<usize> for Node {
    type Output = Node;

    fn index(&self, index: usize) -> &Node {
        self.entry_index(index)
    }
}

impl ops::IndexMut<usize> for Node {
    fn index_mut(&mut self, index: usize) -> &mut Node {
        self.fetch_index(index)
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        let mut node = Node::new();
        node.set_bool(value);
        node
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        let mut node = Node::new();
        node.set_bytestr(value);
        node
    }
}

leaf_from!(i8);
leaf_from!(i16);
leaf_from!(i32);
leaf_from!(i64);
leaf_from!(u8);
leaf_from!(u16);
leaf_from!(u32);
leaf_from!(u64);
leaf_from!(f32);
leaf_from!(f64);

#[cfg(test)]
mod test {
    use super::*;
    use crate::dtype::Endianness;

    #[test]
    fn scalar_setter_owns_and_reads_back() {
        let mut n = Node::new();
        n.set_uint32(42);
        assert_eq!(n.kind(), ElementKind::UINT32);
        assert!(n.is_owner());
        assert_eq!(n.as_uint32().unwrap(), 42);
        assert_eq!(n.total_bytes(), 4);
    }

    #[test]
    fn setter_replaces_prior_shape() {
        let mut n = Node::new();
        n.fetch("child").set_uint32(1);
        assert_eq!(n.kind(), ElementKind::OBJECT);

        n.set_float64(2.5);
        assert_eq!(n.kind(), ElementKind::FLOAT64);
        assert_eq!(n.number_of_entries(), 0);
    }

    #[test]
    fn fetch_coerces_and_auto_creates() {
        let mut n = Node::new();
        n.fetch("a/b/c").set_uint32(10);
        assert!(n.has_path("a/b/c"));
        assert_eq!(n["a"].kind(), ElementKind::OBJECT);
        assert_eq!(n["a"]["b"]["c"].as_uint32().unwrap(), 10);
    }

    #[test]
    fn append_coerces_to_list() {
        let mut n = Node::new();
        n.fetch("k").set_uint32(1);
        n.append(5u32);
        assert_eq!(n.kind(), ElementKind::LIST);
        assert_eq!(n.number_of_entries(), 1);
        assert_eq!(n[0].as_uint32().unwrap(), 5);
    }

    #[test]
    fn entry_returns_sentinel_for_misses() {
        let n = Node::new();
        let first = n.entry("missing") as *const Node;
        let second = n.entry("missing/deeper") as *const Node;
        assert_eq!(first, second);
        assert!(n.entry("missing").is_empty());
    }

    #[test]
    fn missing_path_reads_as_zero() {
        let n = Node::new();
        assert_eq!(n["a"]["b"].as_int32().unwrap(), 0);
        assert!(!n["a"].as_bool().unwrap());
    }

    #[test]
    fn mismatched_kind_read_fails() {
        let mut n = Node::new();
        n.set_uint32(9);
        let err = n.as_float64().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TreeError>(),
            Some(TreeError::KindMismatch { .. })
        ));
    }

    #[test]
    fn remove_reports_presence() {
        let mut n = Node::new();
        n.fetch("a/b").set_uint32(1);
        assert!(!n.remove("a/c"));
        assert!(n.remove("a/b"));
        assert!(!n.has_path("a/b"));
        assert!(n.has_path("a"));
    }

    #[test]
    fn remove_index_respects_bounds() {
        let mut n = Node::new();
        n.append(1u32);
        n.append(2u32);
        assert!(!n.remove_index(5));
        assert!(n.remove_index(0));
        assert_eq!(n.number_of_entries(), 1);
        assert_eq!(n[0].as_uint32().unwrap(), 2);
    }

    #[test]
    fn paths_lists_names_and_expands_to_leaves() {
        let mut n = Node::new();
        n.fetch("a/x").set_uint32(1);
        n.fetch("a/y").set_uint32(2);
        n.fetch("b").set_float64(3.0);

        assert_eq!(n.paths(false), vec!["a", "b"]);
        assert_eq!(n.paths(true), vec!["a/x", "a/y", "b"]);
    }

    #[test]
    fn reset_releases_ownership() {
        let mut n = Node::new();
        n.set_uint64_slice(&[1, 2, 3]);
        assert!(n.is_owner());
        n.reset();
        assert!(!n.is_owner());
        assert!(n.is_empty());
        assert_eq!(n.total_bytes(), 0);
    }

    #[test]
    fn set_node_copies_owned_and_shares_borrowed() {
        let mut owned = Node::new();
        owned.set_uint32_slice(&[1, 2, 3]);

        let mut copy = Node::new();
        copy.set_node(&owned);
        assert!(copy.is_owner());
        assert_eq!(copy, owned);

        // Mutating the copy must not reach back into the source.
        copy.as_uint32_array_mut()
            .unwrap()
            .set(0, 99)
            .unwrap();
        assert_eq!(owned.as_uint32_array().unwrap().get(0).unwrap(), 1);

        let mut backing: Vec<u8> = 7u32.to_ne_bytes().to_vec();
        let borrowed = unsafe {
            Node::with_dtype_ptr(
                DataType::default_for(ElementKind::UINT32),
                backing.as_mut_ptr(),
            )
        };
        let mut shared = Node::new();
        shared.set_node(&borrowed);
        assert!(!shared.is_owner());
        assert_eq!(shared.as_uint32().unwrap(), 7);
    }

    #[test]
    fn structural_equality_is_per_element() {
        let mut a = Node::new();
        a.fetch("x").set_uint32_slice(&[1, 2, 3]);
        let mut b = Node::new();
        b.fetch("x").set_uint32_slice(&[1, 2, 3]);
        assert_eq!(a, b);

        b.fetch("x").set_uint32_slice(&[1, 2, 4]);
        assert_ne!(a, b);
    }

    #[test]
    fn compare_reports_divergent_paths() {
        let mut a = Node::new();
        a.fetch("same").set_uint32(1);
        a.fetch("diff").set_uint32(2);
        let mut b = Node::new();
        b.fetch("same").set_uint32(1);
        b.fetch("diff").set_uint32(3);

        let mut diff = Node::new();
        assert!(!a.compare(&b, &mut diff, false));
        assert!(!diff.has_path("same"));
        assert!(diff.has_path("diff"));
    }

    #[test]
    fn widened_compare_crosses_kinds() {
        let mut a = Node::new();
        a.set_uint32(30);
        let mut b = Node::new();
        b.set_float64(30.0);

        let mut diff = Node::new();
        assert!(!a.compare(&b, &mut diff, false));
        assert!(a.compare(&b, &mut diff, true));
    }

    #[test]
    fn serialize_compact_repacks_strided_leaves() {
        // One u16 per 4-byte slot.
        let mut backing = vec![0u8; 8];
        backing[0] = 0x11;
        backing[4] = 0x22;
        let dtype = DataType::new(
            ElementKind::UINT16,
            2,
            0,
            4,
            2,
            Endianness::DEFAULT,
        )
        .unwrap();
        let n = unsafe {
            Node::with_dtype_ptr(dtype, backing.as_mut_ptr())
        };

        assert_eq!(n.serialize(false), backing);
        assert_eq!(
            n.serialize(true),
            vec![0x11, backing[1], 0x22, backing[5]]
        );
    }

    #[test]
    fn json_schema_reflects_shape() {
        let mut n = Node::new();
        n.fetch("a").set_uint32(1);
        n.fetch("b").set_float64(2.0);
        let schema = n.schema().unwrap();
        assert_eq!(schema.total_bytes(), 12);
    }

    #[test]
    fn display_renders_values() {
        let mut n = Node::new();
        n.fetch("a").set_uint32(10);
        n.fetch("s").set_bytestr("hi");
        let text = n.to_text(true);
        assert!(text.contains("\"a\": 10"));
        assert!(text.contains("\"s\": \"hi\""));
    }

    #[test]
    fn descriptor_only_leaf_has_no_region() {
        let mut n = Node::new();
        n.set_dtype(DataType::vector(ElementKind::UINT32, 4));
        assert_eq!(n.kind(), ElementKind::UINT32);
        assert!(n.as_uint32_array().is_err());
    }
}
