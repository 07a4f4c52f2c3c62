//! # Schema Walker Module
//!
//! This module implements the traversal that binds a parsed schema onto a
//! byte buffer. The walker descends the schema tree together with a base
//! pointer and a running byte offset, mutating a node to take on the
//! schema's object/list/leaf structure and attaching to each leaf a
//! descriptor whose offset is absolute within the buffer.
//!
//! Offsets accumulate sibling-sequentially: children are laid out
//! contiguously in schema order, each advancing the running offset by its
//! own total footprint. A leaf that declares an explicit offset is bound
//! there instead, but its siblings keep advancing from the running offset,
//! so one relocated leaf does not shift the rest of the layout.
//!
//! The walker never owns the buffer. Every leaf it binds is a borrowed
//! region; adopting the buffer into a root's storage is the caller's move,
//! made after the walk returns.

use anyhow::Result;

use crate::dtype::DataType;
use crate::schema::{LeafSpec, Schema};
use crate::tree::Node;

/// Rebuilds `node` to mirror `schema`, binding leaves into the buffer at
/// `base` starting from `offset`.
///
/// # Safety
///
/// `base` must point to a region of at least `offset +
/// schema.total_bytes()` bytes that outlives `node` and every node that
/// adopts pointers from it.
pub(super) unsafe fn walk(
    node: &mut Node,
    base: *mut u8,
    schema: &Schema,
    offset: usize,
) -> Result<()> {
    match schema {
        Schema::Leaf(spec) => walk_leaf(node, base, spec, offset),
        Schema::ListOf(inner, count) => {
            node.coerce_list();
            let mut running = offset;
            for _ in 0..*count {
                let mut child = Node::new();
                walk(&mut child, base, inner, running)?;
                running += child.total_bytes();
                node.append(child);
            }
            Ok(())
        },
        Schema::Object(entries) => {
            node.coerce_object();
            let mut running = offset;
            for (name, child_schema) in entries {
                let mut child = Node::new();
                walk(&mut child, base, child_schema, running)?;
                running += child.total_bytes();
                node.insert_child(name.clone(), child);
            }
            Ok(())
        },
        Schema::List(items) => {
            node.coerce_list();
            let mut running = offset;
            for item in items {
                let mut child = Node::new();
                walk(&mut child, base, item, running)?;
                running += child.total_bytes();
                node.append(child);
            }
            Ok(())
        },
    }
}

/// Binds one leaf: explicit layout fields win over the walker's running
/// defaults, and the node adopts the buffer as a borrowed region.
unsafe fn walk_leaf(
    node: &mut Node,
    base: *mut u8,
    spec: &LeafSpec,
    offset: usize,
) -> Result<()> {
    if spec.kind.is_structural() {
        node.coerce_structural(spec.kind);
        return Ok(());
    }

    let elem_bytes = spec.resolved_elem_bytes();
    let dtype = DataType::new(
        spec.kind,
        spec.count,
        spec.offset.unwrap_or(offset),
        spec.stride.unwrap_or(elem_bytes),
        elem_bytes,
        spec.endian,
    )?;
    node.set_external(dtype, base);
    Ok(())
}
