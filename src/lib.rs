#![warn(missing_docs)]
//! # Canopy
//!
//! A hierarchical, self-describing, schema-driven data tree for scientific
//! computing. A tree node is a typed leaf (an array of numeric elements at
//! a specified memory layout), an ordered mapping from name to child, or an
//! ordered list of children. Leaf storage can be owned by the tree,
//! borrowed from externally-provided memory for zero-copy views, or backed
//! by a memory-mapped file; all three answer to the same typed read/write
//! surface.
//!
//! A schema expressed as compact JSON-like text defines element kinds,
//! counts, strides, and offsets, and can be walked to impose a tree
//! structure over an opaque byte buffer:
//!
//! ```
//! use canopy::{Node, Schema};
//!
//! # fn main() -> anyhow::Result<()> {
//! let schema =
//!     Schema::parse(r#"{"a": "uint32", "b": "uint32", "c": "float64"}"#)?;
//! let mut tree = Node::with_schema(&schema)?;
//! tree.fetch("a").set_uint32(10);
//! assert_eq!(tree["a"].as_uint32()?, 10);
//! # Ok(())
//! # }
//! ```

/* UTILITY MODULES */

mod util;

#[cfg(test)]
mod test;

pub mod error;

/* IMPLEMENTATION MODULES */

pub mod array;
pub mod dtype;
pub mod handle;
pub mod schema;
pub mod tree;

/* RE-EXPORTS */

pub use array::{Element, TypedArray, TypedArrayMut};
pub use dtype::{DataType, ElementKind, Endianness};
pub use error::TreeError;
pub use handle::{BasicHandle, Handle};
pub use schema::Schema;
pub use tree::Node;
