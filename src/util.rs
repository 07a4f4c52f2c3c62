//! # General Utilities Module
//!
//! This module makes room for verbose or repeated routines used throughout
//! the crate, chiefly path manipulation for the tree addressing scheme.

/* PATHS */

/// The separator between segments of a tree path.
pub const PATH_SEPARATOR: char = '/';

/// Splits `path` into its first segment and the remainder, if any. Empty
/// trailing segments are discarded, so `"a/"` splits the same as `"a"`.
pub fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once(PATH_SEPARATOR) {
        Some((curr, next)) if !next.is_empty() => (curr, Some(next)),
        Some((curr, _)) => (curr, None),
        None => (path, None),
    }
}

/// Joins `prefix` and `name` into a single path, omitting the separator when
/// `prefix` is empty.
pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}{PATH_SEPARATOR}{name}")
    }
}
