//! # Error Module
//!
//! This module defines the errors that can happen while building, binding,
//! or accessing a data tree. Some examples of this are:
//!
//! - A schema text naming an element kind that is not in the registry.
//! - A typed accessor invoked against a leaf of a different kind.
//! - A data file too short for the schema that is supposed to describe it.

use std::path::PathBuf;
use std::{error::Error, fmt};

use crate::dtype::ElementKind;

/* ERROR WRAPPER */

/// Wrapper for all tree-related errors that could happen during runtime.
/// Parse and I/O variants carry the offending name or path so that they can
/// surface to the top-level caller with enough context to act on.
#[derive(Debug)]
pub enum TreeError {
    /// A kind name lookup against the primitive type registry failed.
    UnknownKind { name: String },

    /// The fields of a data type descriptor are inconsistent with each
    /// other, such as a stride smaller than the element width.
    InvalidLayout { reason: String },

    /// A typed accessor was invoked on a leaf of a different kind.
    KindMismatch {
        expected: ElementKind,
        found: ElementKind,
    },

    /// An array or list index was past the end of its container.
    IndexOutOfRange { index: usize, length: usize },

    /// A read-only lookup failed on an interface that cannot silence the
    /// miss through the empty sentinel.
    PathNotFound { path: String },

    /// A structural operation was invoked on a node of the wrong shape.
    ShapeMismatch {
        operation: &'static str,
        found: ElementKind,
    },

    /// A file-backed operation failed. Carries the action that failed and
    /// the path it was attempted on.
    Io { action: &'static str, path: PathBuf },

    /// A data file held fewer bytes than its schema requires.
    ShortRead {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    /// A schema text could not be parsed under the JSON-superset grammar.
    Parse { message: String },
}

impl Error for TreeError {}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKind { name } => {
                write!(
                    f,
                    "The name '{name}' does not correspond to any element \
                    kind in the primitive type registry.",
                )
            },
            Self::InvalidLayout { reason } => {
                write!(
                    f,
                    "The fields of a data type descriptor are inconsistent: \
                    {reason}",
                )
            },
            Self::KindMismatch { expected, found } => {
                write!(
                    f,
                    "A typed accessor for elements of kind '{}' was invoked \
                    on a leaf holding elements of kind '{}'.",
                    expected.name(),
                    found.name(),
                )
            },
            Self::IndexOutOfRange { index, length } => {
                write!(
                    f,
                    "The index {index} is out of range for a container of \
                    {length} elements.",
                )
            },
            Self::PathNotFound { path } => {
                write!(f, "No entry exists under the path '{path}'.")
            },
            Self::ShapeMismatch { operation, found } => {
                write!(
                    f,
                    "The operation '{operation}' was invoked on a node of \
                    shape '{}', which does not support it.",
                    found.name(),
                )
            },
            Self::Io { action, path } => {
                write!(
                    f,
                    "Failed to {action} '{}'.",
                    path.to_string_lossy(),
                )
            },
            Self::ShortRead {
                path,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "The data file '{}' holds {actual} bytes, but its schema \
                    requires {expected}.",
                    path.to_string_lossy(),
                )
            },
            Self::Parse { message } => {
                write!(f, "The schema text is malformed: {message}")
            },
        }
    }
}
