//! # Node Storage Module
//!
//! This module defines the storage modes a tree node can hold its leaf
//! bytes under. A node either holds nothing, owns a heap buffer, borrows a
//! pointer whose lifetime an external party guarantees, or keeps a shared
//! read-write memory map of a file. Release is a single path: dropping the
//! variant frees an owned buffer, unmaps a mapped region and closes its
//! file, and leaves a borrowed pointer alone.

use memmap2::MmapMut;

use std::fs::File;
use std::ptr;

/* DEFINITIONS */

/// The storage mode of a node's byte region.
#[derive(Debug, Default)]
pub enum Storage {
    /// No storage. Structural nodes and descriptor-only leaves hold this.
    #[default]
    None,

    /// A heap buffer owned by the node and freed on release.
    Owned(Vec<u8>),

    /// A pointer owned by an external party. Never released by the node;
    /// the caller guarantees the region outlives every borrower.
    Borrowed(*mut u8),

    /// A shared read-write memory map. Release unmaps the region and then
    /// closes the descriptor.
    Mmap { file: File, map: MmapMut },
}

impl Storage {
    /// Returns the base pointer leaf descriptors offset into, or null when
    /// no storage is attached.
    pub fn base_ptr(&self) -> *const u8 {
        match self {
            Self::None => ptr::null(),
            Self::Owned(buf) => buf.as_ptr(),
            Self::Borrowed(p) => *p,
            Self::Mmap { map, .. } => map.as_ptr(),
        }
    }

    /// Returns the writable base pointer, or null when no storage is
    /// attached.
    pub fn base_ptr_mut(&mut self) -> *mut u8 {
        match self {
            Self::None => ptr::null_mut(),
            Self::Owned(buf) => buf.as_mut_ptr(),
            Self::Borrowed(p) => *p,
            Self::Mmap { map, .. } => map.as_mut_ptr(),
        }
    }

    /// Returns true if dropping this storage would release resources (an
    /// owned buffer or a memory map).
    pub fn is_owner(&self) -> bool {
        matches!(self, Self::Owned(_) | Self::Mmap { .. })
    }

    /// Releases whatever this storage holds and leaves it empty. Owned
    /// buffers are freed, maps are unmapped and their files closed, and
    /// borrowed pointers are forgotten without being touched.
    pub fn release(&mut self) {
        *self = Self::None;
    }
}
