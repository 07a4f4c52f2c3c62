//! # I/O Handle Module
//!
//! This module defines the seam between the data tree and pluggable
//! storage backends. The [`Handle`] trait is the contract richer protocol
//! implementations (HDF5 and the like) satisfy from the outside; the crate
//! itself ships only [`BasicHandle`], which persists a tree as a pair of
//! files: the schema as text beside the raw serialized leaf bytes.

use anyhow::{bail, Context, Result};

use std::path::{Path, PathBuf};

use crate::error::TreeError;
use crate::schema::Schema;
use crate::tree::Node;

/* HANDLE INTERFACE */

/// Represents the behavior of an open connection to a tree stored under
/// some protocol. Implementations decide what `open` and `close` mean for
/// their backing store; between the two, the handle answers whole-tree and
/// per-path reads and writes.
pub trait Handle {
    /// Establishes the connection, reading whatever state the backing
    /// store already holds. Fails under any I/O failure.
    fn open(&mut self) -> Result<()>;

    /// Returns true if the handle is currently open.
    fn is_open(&self) -> bool;

    /// Copies the handle's entire tree into `node`.
    fn read(&mut self, node: &mut Node) -> Result<()>;

    /// Copies the subtree under `path` into `node`. Fails if no entry
    /// exists under `path`.
    fn read_path(&mut self, path: &str, node: &mut Node) -> Result<()>;

    /// Replaces the handle's entire tree with a copy of `node`.
    fn write(&mut self, node: &Node) -> Result<()>;

    /// Replaces the subtree under `path` with a copy of `node`, creating
    /// intermediate objects as needed.
    fn write_path(&mut self, path: &str, node: &Node) -> Result<()>;

    /// Returns the direct child names of the handle's root.
    fn list_child_names(&self) -> Vec<String>;

    /// Erases the subtree under `path`, reporting whether it existed.
    fn remove(&mut self, path: &str) -> bool;

    /// Returns true if an entry exists under `path`.
    fn has_path(&self, path: &str) -> bool;

    /// Flushes pending state to the backing store and severs the
    /// connection. Fails under any I/O failure.
    fn close(&mut self) -> Result<()>;
}

/* BUILT-IN FILE PAIR HANDLE */

/// A handle over the crate's built-in protocol: a data file of raw
/// serialized leaf bytes, interpreted by a schema text stored beside it
/// under the same path with a `.schema` suffix. Writes accumulate in
/// memory and persist on `close`.
pub struct BasicHandle {
    path: PathBuf,
    root: Node,
    open: bool,
}

impl BasicHandle {
    /// Returns a closed handle addressing the file pair rooted at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            root: Node::new(),
            open: false,
        }
    }

    fn schema_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".schema");
        self.path.with_file_name(name)
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.open {
            bail!(TreeError::Io {
                action: "use a closed handle on",
                path: self.path.clone(),
            })
        }
        Ok(())
    }
}

impl Handle for BasicHandle {
    fn open(&mut self) -> Result<()> {
        let schema_path = self.schema_path();
        if schema_path.exists() {
            let text = std::fs::read_to_string(&schema_path).context(
                TreeError::Io {
                    action: "open",
                    path: schema_path.clone(),
                },
            )?;
            let schema = Schema::parse(&text)?;
            self.root = Node::load(&schema, &self.path)?;
        } else {
            self.root = Node::new();
        }
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read(&mut self, node: &mut Node) -> Result<()> {
        self.ensure_open()?;
        node.set_node(&self.root);
        Ok(())
    }

    fn read_path(&mut self, path: &str, node: &mut Node) -> Result<()> {
        self.ensure_open()?;
        if !self.root.has_path(path) {
            bail!(TreeError::PathNotFound {
                path: path.to_string(),
            })
        }
        node.set_node(self.root.entry(path));
        Ok(())
    }

    fn write(&mut self, node: &Node) -> Result<()> {
        self.ensure_open()?;
        self.root.set_node(node);
        Ok(())
    }

    fn write_path(&mut self, path: &str, node: &Node) -> Result<()> {
        self.ensure_open()?;
        self.root.fetch(path).set_node(node);
        Ok(())
    }

    fn list_child_names(&self) -> Vec<String> {
        self.root.paths(false)
    }

    fn remove(&mut self, path: &str) -> bool {
        self.root.remove(path)
    }

    fn has_path(&self, path: &str) -> bool {
        self.root.has_path(path)
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        // The reported schema and the non-compact serialization describe
        // the same sibling-sequential layout, so the pair re-loads as-is.
        let schema_text = self.root.schema()?.to_json();
        std::fs::write(self.schema_path(), schema_text).context(
            TreeError::Io {
                action: "write",
                path: self.schema_path(),
            },
        )?;
        self.root
            .serialize_to_file(&self.path, false)?;
        self.open = false;
        Ok(())
    }
}
