//! # Integration Test Module
//!
//! This module provides end-to-end tests that exercise the data tree
//! through its public surface: building trees by hand, binding schemas
//! over external buffers, round-tripping serialized bytes, and the
//! file-backed load and mmap paths.

use anyhow::Result;

use crate::dtype::ElementKind;
use crate::error::TreeError;
use crate::schema::Schema;
use crate::tree::Node;

/* HAND-BUILT TREES */

#[test]
fn scalar_trio() -> Result<()> {
    let mut n = Node::new();
    n.fetch("a").set_uint32(10);
    n.fetch("b").set_uint32(20);
    n.fetch("c").set_float64(30.0);

    assert_eq!(n["a"].as_uint32()?, 10);
    assert_eq!(n["b"].as_uint32()?, 20);
    assert_eq!(n["c"].as_float64()?, 30.0);
    Ok(())
}

#[test]
fn nested_auto_create() -> Result<()> {
    let mut n = Node::new();
    n.fetch("a/b").set_uint32(10);

    assert_eq!(n["a"]["b"].as_uint32()?, 10);
    assert_eq!(n["a"].kind(), ElementKind::OBJECT);
    assert!(n.has_path("a/b"));
    Ok(())
}

#[test]
fn vector_leaf() -> Result<()> {
    let values: Vec<u32> = (0..100).collect();
    let mut n = Node::new();
    n.fetch("a").set_uint32_slice(&values);

    let view = n["a"].as_uint32_array()?;
    assert_eq!(view.len(), 100);
    assert_eq!(view.get(99)?, 99);
    Ok(())
}

#[test]
fn list_of_mixed_values() -> Result<()> {
    let values: Vec<u32> = (0..100).collect();

    let mut n = Node::new();
    let list = n.fetch("mylist");
    list.append(10u32);
    list.append(20u32);
    list.append(30.0f64);
    list.append(values);

    assert_eq!(n["mylist"][0].as_uint32()?, 10);
    assert_eq!(n["mylist"][1].as_uint32()?, 20);
    assert_eq!(n["mylist"][2].as_float64()?, 30.0);

    let tail = n["mylist"][3].as_uint32_array()?;
    assert_eq!(tail.len(), 100);
    assert_eq!(tail.get(99)?, 99);
    Ok(())
}

/* SCHEMA-BOUND BUFFERS */

/// Lays `a`, `b`, and `c` out at offsets 0, 4, and 8 of a 16-byte buffer.
fn trio_buffer(a: u32, b: u32, c: f64) -> Vec<u8> {
    let mut buf = vec![0u8; 16];
    buf[0..4].copy_from_slice(&a.to_ne_bytes());
    buf[4..8].copy_from_slice(&b.to_ne_bytes());
    buf[8..16].copy_from_slice(&c.to_ne_bytes());
    buf
}

#[test]
fn schema_over_buffer_reads_in_place() -> Result<()> {
    let mut buf = trio_buffer(10, 20, 30.0);
    let schema =
        Schema::parse(r#"{"a": "uint32", "b": "uint32", "c": "float64"}"#)?;
    let n = unsafe { Node::with_schema_ptr(&schema, buf.as_mut_ptr())? };

    assert_eq!(n["a"].as_uint32()?, 10);
    assert_eq!(n["b"].as_uint32()?, 20);
    assert_eq!(n["c"].as_float64()?, 30.0);
    Ok(())
}

#[test]
fn schema_over_buffer_writes_through() -> Result<()> {
    let mut buf = trio_buffer(10, 20, 30.0);
    let schema =
        Schema::parse(r#"{"a": "uint32", "b": "uint32", "c": "float64"}"#)?;
    let mut n =
        unsafe { Node::with_schema_ptr(&schema, buf.as_mut_ptr())? };

    n.fetch("a").set_uint32(20);
    n.fetch("b").set_uint32(10);
    n.fetch("c").set_float64(40.0);

    assert_eq!(n["a"].as_uint32()?, 20);
    assert_eq!(u32::from_ne_bytes(buf[0..4].try_into()?), 20);
    assert_eq!(u32::from_ne_bytes(buf[4..8].try_into()?), 10);
    assert_eq!(f64::from_ne_bytes(buf[8..16].try_into()?), 40.0);

    // Direct buffer mutation is visible through the typed surface.
    buf[0..4].copy_from_slice(&77u32.to_ne_bytes());
    assert_eq!(n["a"].as_uint32()?, 77);
    Ok(())
}

#[test]
fn nested_schema_group() -> Result<()> {
    let mut buf = trio_buffer(10, 20, 30.0);
    let schema = Schema::parse(
        r#"{"g": {"a": "uint32", "b": "uint32", "c": "float64"}}"#,
    )?;
    let n = unsafe { Node::with_schema_ptr(&schema, buf.as_mut_ptr())? };

    assert_eq!(n["g"]["a"].as_uint32()?, 10);
    assert_eq!(n["g"]["b"].as_uint32()?, 20);
    assert_eq!(n["g"]["c"].as_float64()?, 30.0);
    Ok(())
}

#[test]
fn array_schema_over_buffer() -> Result<()> {
    let mut buf = vec![0u8; 16];
    buf[0..4].copy_from_slice(&10u32.to_ne_bytes());
    buf[4..12].copy_from_slice(&30.0f64.to_ne_bytes());
    buf[12..16].copy_from_slice(&20u32.to_ne_bytes());

    let schema = Schema::parse(r#"["uint32", "float64", "uint32"]"#)?;
    let n = unsafe { Node::with_schema_ptr(&schema, buf.as_mut_ptr())? };

    assert_eq!(n.kind(), ElementKind::LIST);
    assert_eq!(n[0].as_uint32()?, 10);
    assert_eq!(n[1].as_float64()?, 30.0);
    assert_eq!(n[2].as_uint32()?, 20);
    Ok(())
}

#[test]
fn compound_list_of_layout() -> Result<()> {
    // [int1:u32][int2:u32][f64][u32][other:f64] at offsets 0,4,8,16,20.
    let mut buf = vec![0u8; 28];
    buf[0..4].copy_from_slice(&10u32.to_ne_bytes());
    buf[4..8].copy_from_slice(&20u32.to_ne_bytes());
    buf[8..16].copy_from_slice(&30.0f64.to_ne_bytes());
    buf[16..20].copy_from_slice(&40u32.to_ne_bytes());
    buf[20..28].copy_from_slice(&50.0f64.to_ne_bytes());

    let schema = Schema::parse(
        r#"{"top": [{"int1": "uint32", "int2": "uint32"}, "float64",
            "uint32"], "other": "float64"}"#,
    )?;
    let n = unsafe { Node::with_schema_ptr(&schema, buf.as_mut_ptr())? };

    assert_eq!(n["top"][0]["int1"].as_uint32()?, 10);
    assert_eq!(n["top"][0]["int2"].as_uint32()?, 20);
    assert_eq!(n["top"][1].as_float64()?, 30.0);
    assert_eq!(n["top"][2].as_uint32()?, 40);
    assert_eq!(n["other"].as_float64()?, 50.0);
    Ok(())
}

#[test]
fn replicated_compound_advances_offsets() -> Result<()> {
    let schema = Schema::parse(
        r#"{"dtype": {"x": "uint32", "y": "uint32"}, "length": 3}"#,
    )?;
    assert_eq!(schema.total_bytes(), 24);

    let mut buf = vec![0u8; 24];
    for i in 0..6u32 {
        let at = i as usize * 4;
        buf[at..at + 4].copy_from_slice(&i.to_ne_bytes());
    }
    let n = unsafe { Node::with_schema_ptr(&schema, buf.as_mut_ptr())? };

    assert_eq!(n.number_of_entries(), 3);
    assert_eq!(n[0]["x"].as_uint32()?, 0);
    assert_eq!(n[1]["x"].as_uint32()?, 2);
    assert_eq!(n[2]["y"].as_uint32()?, 5);
    Ok(())
}

#[test]
fn explicit_offset_overrides_without_moving_siblings() -> Result<()> {
    // `b` is pinned to the tail of the buffer; `c` still lands at the
    // running offset after `b`'s footprint, not after its landing spot.
    let mut buf = vec![0u8; 16];
    buf[0..4].copy_from_slice(&1u32.to_ne_bytes());
    buf[12..16].copy_from_slice(&2u32.to_ne_bytes());
    buf[8..12].copy_from_slice(&3u32.to_ne_bytes());

    let schema = Schema::parse(
        r#"{"a": "uint32",
            "b": {"dtype": "uint32", "length": 1, "offset": 12},
            "c": "uint32"}"#,
    )?;
    let n = unsafe { Node::with_schema_ptr(&schema, buf.as_mut_ptr())? };

    assert_eq!(n["a"].as_uint32()?, 1);
    assert_eq!(n["b"].as_uint32()?, 2);
    assert_eq!(n["c"].as_uint32()?, 3);
    Ok(())
}

/* ROUND TRIPS */

#[test]
fn schema_text_round_trip() -> Result<()> {
    let texts = [
        r#""float32""#,
        r#"{"a": "uint32", "b": {"dtype": "int16", "length": 8}}"#,
        r#"["bool", {"nested": ["float64"]}]"#,
        r#"{"dtype": {"x": "uint32"}, "length": 2}"#,
    ];
    for text in texts {
        let parsed = Schema::parse(text)?;
        let reparsed = Schema::parse(&parsed.to_json())?;
        assert_eq!(parsed, reparsed);
    }
    Ok(())
}

#[test]
fn serialize_matches_source_buffer() -> Result<()> {
    let mut buf = trio_buffer(10, 20, 30.0);
    let schema =
        Schema::parse(r#"{"a": "uint32", "b": "uint32", "c": "float64"}"#)?;
    let n = unsafe { Node::with_schema_ptr(&schema, buf.as_mut_ptr())? };

    assert_eq!(n.serialize(false), buf);
    assert_eq!(n.serialize(true), buf);
    Ok(())
}

#[test]
fn serialize_then_rebind_preserves_tree() -> Result<()> {
    let mut buf = trio_buffer(10, 20, 30.0);
    let schema =
        Schema::parse(r#"{"a": "uint32", "b": "uint32", "c": "float64"}"#)?;
    let n = unsafe { Node::with_schema_ptr(&schema, buf.as_mut_ptr())? };

    let mut bytes = n.serialize(false);
    let rebuilt =
        unsafe { Node::with_schema_ptr(&schema, bytes.as_mut_ptr())? };
    assert_eq!(n, rebuilt);
    Ok(())
}

#[test]
fn built_tree_round_trips_through_reported_schema() -> Result<()> {
    let mut n = Node::new();
    n.fetch("counts").set_uint32_slice(&[5, 6, 7]);
    n.fetch("scale").set_float64(0.25);
    n.fetch("tag").set_bytestr("mesh");

    let schema = n.schema()?;
    let mut bytes = n.serialize(false);
    let rebuilt =
        unsafe { Node::with_schema_ptr(&schema, bytes.as_mut_ptr())? };

    assert_eq!(rebuilt["counts"].as_uint32_array()?.get(2)?, 7);
    assert_eq!(rebuilt["scale"].as_float64()?, 0.25);
    assert_eq!(rebuilt["tag"].as_bytestr()?, "mesh");
    assert_eq!(n, rebuilt);
    Ok(())
}

/* FILE-BACKED TREES */

#[test]
fn load_reads_exactly_schema_bytes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("trio.bin");
    std::fs::write(&path, trio_buffer(10, 20, 30.0))?;

    let schema =
        Schema::parse(r#"{"a": "uint32", "b": "uint32", "c": "float64"}"#)?;
    let n = Node::load(&schema, &path)?;

    assert!(n.is_owner());
    assert_eq!(n["a"].as_uint32()?, 10);
    assert_eq!(n["b"].as_uint32()?, 20);
    assert_eq!(n["c"].as_float64()?, 30.0);
    Ok(())
}

#[test]
fn load_rejects_short_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("short.bin");
    std::fs::write(&path, [0u8; 7])?;

    let schema =
        Schema::parse(r#"{"a": "uint32", "b": "uint32", "c": "float64"}"#)?;
    let err = Node::load(&schema, &path).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TreeError>(),
        Some(TreeError::ShortRead {
            expected: 16,
            actual: 7,
            ..
        })
    ));
    Ok(())
}

#[test]
fn load_reports_missing_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let schema = Schema::parse(r#"{"a": "uint32"}"#)?;
    let err =
        Node::load(&schema, dir.path().join("absent.bin")).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TreeError>(),
        Some(TreeError::Io { action: "open", .. })
    ));
    Ok(())
}

#[test]
fn mmap_writes_persist_to_disk() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("mapped.bin");
    let schema =
        Schema::parse(r#"{"a": "uint32", "b": "float64"}"#)?;

    {
        let mut n = Node::mmap(&schema, &path)?;
        assert!(n.is_owner());
        n.fetch("a").set_uint32(123);
        n.fetch("b").set_float64(-2.5);
        // The map is torn down here; children release their borrows
        // first, then the root unmaps and closes.
    }

    let bytes = std::fs::read(&path)?;
    assert_eq!(bytes.len(), 12);
    assert_eq!(u32::from_ne_bytes(bytes[0..4].try_into()?), 123);
    assert_eq!(f64::from_ne_bytes(bytes[4..12].try_into()?), -2.5);

    let reopened = Node::mmap(&schema, &path)?;
    assert_eq!(reopened["a"].as_uint32()?, 123);
    assert_eq!(reopened["b"].as_float64()?, -2.5);
    Ok(())
}

#[test]
fn mmap_rejects_short_existing_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stub.bin");
    std::fs::write(&path, [0u8; 4])?;

    let schema =
        Schema::parse(r#"{"a": "uint32", "b": "float64"}"#)?;
    let err = Node::mmap(&schema, &path).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TreeError>(),
        Some(TreeError::ShortRead {
            expected: 12,
            actual: 4,
            ..
        })
    ));
    Ok(())
}

#[test]
fn loaded_tree_survives_source_file_changes() -> Result<()> {
    // Load copies the file into an owned buffer, unlike mmap.
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("owned.bin");
    std::fs::write(&path, 9u32.to_ne_bytes())?;

    let schema = Schema::parse(r#"{"a": "uint32"}"#)?;
    let n = Node::load(&schema, &path)?;
    std::fs::write(&path, 1u32.to_ne_bytes())?;

    assert_eq!(n["a"].as_uint32()?, 9);
    Ok(())
}
