//! # Typed Array Module
//!
//! This module implements non-owning strided accessors over raw bytes. A
//! view pairs a base pointer with a data type descriptor and exposes
//! bounds-checked element reads and writes for one of the ten numeric
//! element kinds, honoring the descriptor's offset, stride, and byte order.
//! The underlying bytes are never reordered in place; byte swaps happen on
//! the way in and out, so a view can sit on top of a buffer produced by a
//! foreign-endian writer (or a shared memory map) without disturbing it.

use anyhow::{bail, ensure, Result};
use bytemuck::Pod;

use std::marker::PhantomData;
use std::ptr;

use crate::dtype::{DataType, ElementKind};
use crate::error::TreeError;

/* ELEMENT TRAIT */

/// Marks the ten numeric element kinds a typed view can be parameterized
/// over, tying each Rust primitive to its registry kind and giving the view
/// a uniform byte-swap hook.
pub trait Element: Pod + PartialEq + std::fmt::Debug {
    /// The registry kind corresponding to this primitive.
    const KIND: ElementKind;

    /// Returns this value with its byte order reversed.
    fn swap_bytes(self) -> Self;
}

macro_rules! element {
    ($t:ty, $kind:ident, |$v:ident| $swap:expr) => {
        impl Element for $t {
            const KIND: ElementKind = ElementKind::$kind;

            #[inline(always)]
            fn swap_bytes(self) -> Self {
                let $v = self;
                $swap
            }
        }
    };
}

element!(i8, INT8, |v| v.swap_bytes());
element!(i16, INT16, |v| v.swap_bytes());
element!(i32, INT32, |v| v.swap_bytes());
element!(i64, INT64, |v| v.swap_bytes());
element!(u8, UINT8, |v| v.swap_bytes());
element!(u16, UINT16, |v| v.swap_bytes());
element!(u32, UINT32, |v| v.swap_bytes());
element!(u64, UINT64, |v| v.swap_bytes());
element!(f32, FLOAT32, |v| f32::from_bits(v.to_bits().swap_bytes()));
element!(f64, FLOAT64, |v| f64::from_bits(v.to_bits().swap_bytes()));

/* VIEW DEFINITIONS */

/// A read-only strided view of `T` elements over raw bytes. The view does
/// not own the bytes; its lifetime parameter ties it to whatever does.
#[derive(Clone, Copy, Debug)]
pub struct TypedArray<'a, T: Element> {
    base: *const u8,
    dtype: DataType,
    _marker: PhantomData<&'a [T]>,
}

/// A read-write strided view of `T` elements over raw bytes.
pub struct TypedArrayMut<'a, T: Element> {
    base: *mut u8,
    dtype: DataType,
    _marker: PhantomData<&'a mut [T]>,
}

/* ELEMENT ACCESS PRIMITIVES */

/// Reads element `index` of the region described by `dtype` at `base`,
/// swapping bytes if the descriptor's byte order differs from the host's.
///
/// # Safety
///
/// `base` must point to a region covering `dtype.element_offset(index)`
/// plus the native size of `T`.
#[inline]
pub(crate) unsafe fn read_element<T: Element>(
    base: *const u8,
    dtype: &DataType,
    index: usize,
) -> T {
    let src = base.add(dtype.element_offset(index)) as *const T;
    let value = ptr::read_unaligned(src);
    if dtype.endian().matches_host() {
        value
    } else {
        value.swap_bytes()
    }
}

/// Writes element `index` of the region described by `dtype` at `base`,
/// swapping bytes if the descriptor's byte order differs from the host's.
///
/// # Safety
///
/// Same region requirement as [`read_element`], with write access.
#[inline]
pub(crate) unsafe fn write_element<T: Element>(
    base: *mut u8,
    dtype: &DataType,
    index: usize,
    value: T,
) {
    let encoded = if dtype.endian().matches_host() {
        value
    } else {
        value.swap_bytes()
    };
    let dst = base.add(dtype.element_offset(index)) as *mut T;
    ptr::write_unaligned(dst, encoded);
}

fn check_kind<T: Element>(dtype: &DataType) -> Result<()> {
    if dtype.kind() != T::KIND {
        bail!(TreeError::KindMismatch {
            expected: T::KIND,
            found: dtype.kind(),
        })
    }
    Ok(())
}

fn check_bounds(index: usize, length: usize) -> Result<()> {
    if index >= length {
        bail!(TreeError::IndexOutOfRange { index, length })
    }
    Ok(())
}

/* READ-ONLY VIEW */

impl<'a, T: Element> TypedArray<'a, T> {
    /// Builds a view of the region described by `dtype` at `base`. Fails if
    /// the descriptor's kind does not match `T`.
    ///
    /// # Safety
    ///
    /// `base` must point to memory covering the descriptor's offset plus
    /// `total_bytes()`, and must stay valid and unwritten for `'a`.
    pub unsafe fn from_raw_parts(
        base: *const u8,
        dtype: DataType,
    ) -> Result<Self> {
        check_kind::<T>(&dtype)?;
        Ok(Self {
            base,
            dtype,
            _marker: PhantomData,
        })
    }

    /// Returns the number of elements in the view.
    pub const fn len(&self) -> usize {
        self.dtype.count()
    }

    /// Returns true if the view spans no elements.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the descriptor this view interprets its bytes with.
    pub const fn dtype(&self) -> &DataType {
        &self.dtype
    }

    /// Returns the base pointer the view's offsets are relative to.
    pub const fn data_ptr(&self) -> *const u8 {
        self.base
    }

    /// Returns element `index`, or an out-of-range error past the end.
    pub fn get(&self, index: usize) -> Result<T> {
        check_bounds(index, self.len())?;
        Ok(unsafe { read_element(self.base, &self.dtype, index) })
    }

    /// Gathers every element into `dst`, which must hold exactly `len()`
    /// slots.
    pub fn copy_to_contiguous(&self, dst: &mut [T]) -> Result<()> {
        ensure!(
            dst.len() == self.len(),
            TreeError::IndexOutOfRange {
                index: dst.len(),
                length: self.len(),
            }
        );
        for (i, slot) in dst.iter_mut().enumerate() {
            *slot = unsafe { read_element(self.base, &self.dtype, i) };
        }
        Ok(())
    }

    /// Gathers every element into a freshly allocated contiguous vector.
    pub fn to_vec(&self) -> Vec<T> {
        (0..self.len())
            .map(|i| unsafe { read_element(self.base, &self.dtype, i) })
            .collect()
    }
}

/* READ-WRITE VIEW */

impl<'a, T: Element> TypedArrayMut<'a, T> {
    /// Builds a mutable view of the region described by `dtype` at `base`.
    /// Fails if the descriptor's kind does not match `T`.
    ///
    /// # Safety
    ///
    /// `base` must point to writable memory covering the descriptor's
    /// offset plus `total_bytes()`, with no other access for `'a`.
    pub unsafe fn from_raw_parts(
        base: *mut u8,
        dtype: DataType,
    ) -> Result<Self> {
        check_kind::<T>(&dtype)?;
        Ok(Self {
            base,
            dtype,
            _marker: PhantomData,
        })
    }

    /// Returns the number of elements in the view.
    pub const fn len(&self) -> usize {
        self.dtype.count()
    }

    /// Returns true if the view spans no elements.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the descriptor this view interprets its bytes with.
    pub const fn dtype(&self) -> &DataType {
        &self.dtype
    }

    /// Returns the base pointer the view's offsets are relative to.
    pub const fn data_ptr(&self) -> *mut u8 {
        self.base
    }

    /// Returns element `index`, or an out-of-range error past the end.
    pub fn get(&self, index: usize) -> Result<T> {
        check_bounds(index, self.len())?;
        Ok(unsafe { read_element(self.base, &self.dtype, index) })
    }

    /// Writes `value` into element `index`, or an out-of-range error past
    /// the end.
    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        check_bounds(index, self.len())?;
        unsafe { write_element(self.base, &self.dtype, index, value) };
        Ok(())
    }

    /// Scatters a contiguous buffer of exactly `len()` elements into the
    /// view, honoring its stride.
    pub fn copy_from_contiguous(&mut self, src: &[T]) -> Result<()> {
        ensure!(
            src.len() == self.len(),
            TreeError::IndexOutOfRange {
                index: src.len(),
                length: self.len(),
            }
        );
        for (i, value) in src.iter().enumerate() {
            unsafe { write_element(self.base, &self.dtype, i, *value) };
        }
        Ok(())
    }

    /// Gathers every element into `dst`, which must hold exactly `len()`
    /// slots.
    pub fn copy_to_contiguous(&self, dst: &mut [T]) -> Result<()> {
        ensure!(
            dst.len() == self.len(),
            TreeError::IndexOutOfRange {
                index: dst.len(),
                length: self.len(),
            }
        );
        for (i, slot) in dst.iter_mut().enumerate() {
            *slot = unsafe { read_element(self.base, &self.dtype, i) };
        }
        Ok(())
    }

    /// Reborrows this view read-only.
    pub fn as_view(&self) -> TypedArray<'_, T> {
        TypedArray {
            base: self.base,
            dtype: self.dtype,
            _marker: PhantomData,
        }
    }
}
