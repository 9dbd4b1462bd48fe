// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The patch-object engine: apply and derive RFC 6901-pointer patch
//! documents between `serde_json::Value`s, per RFC 8620 §5.3 (`Foo/set`'s
//! `update` argument shorthand).
//!
//! A patch document is a flat map from JSON-pointer-like path (segments
//! joined by `/`, no leading slash, `~0`/`~1` escaped per RFC 6901) to
//! either a replacement value or `null` to delete. [`apply`] interprets one
//! such document against a base value; [`create`] derives the minimal
//! document that turns one value into another.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A patch document: path -> replacement value (`null` deletes).
pub type PatchObject = BTreeMap<String, Value>;

/// Errors from applying a patch document.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatchError {
    /// A path segment tried to descend through a value that is not a JSON
    /// object (e.g. `"a/b"` when `a` is a string).
    #[error("cannot apply patch through non-object at `{pointer}`")]
    NotAnObject {
        /// The path that failed, in original (unescaped) form.
        pointer: String,
    },
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .map(|seg| seg.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// Apply every entry of `patch` to a deep copy of `val`, returning the
/// result. Entries are applied in `patch`'s (sorted) key order; a `null`
/// value deletes the target, any other value replaces it. Intermediate
/// objects are created as needed when setting a value; deleting a path
/// that does not exist is a no-op. The empty-string path (RFC 6901's
/// pointer to the whole document) replaces `val` itself wholesale, which
/// is how [`create`] expresses a diff between two non-object roots.
///
/// # Errors
///
/// Returns [`PatchError::NotAnObject`] if a path segment would need to
/// descend through a non-object value that already exists.
pub fn apply(val: &Value, patch: &PatchObject) -> Result<Value, PatchError> {
    let mut out = val.clone();
    for (path, new_value) in patch {
        apply_one(&mut out, path, new_value)?;
    }
    Ok(out)
}

fn apply_one(root: &mut Value, path: &str, new_value: &Value) -> Result<(), PatchError> {
    if path.is_empty() {
        // The empty-string RFC 6901 pointer names the whole document:
        // replace (or, for `null`, delete down to `Value::Null`) the root.
        *root = new_value.clone();
        return Ok(());
    }

    let segments = split_path(path);
    let Some((last, parents)) = segments.split_last() else {
        return Ok(());
    };

    if !root.is_object() {
        *root = Value::Object(Map::new());
    }
    let mut cursor = root
        .as_object_mut()
        .expect("just coerced to an object above");

    for seg in parents {
        let entry = cursor.entry(seg.clone()).or_insert_with(|| Value::Object(Map::new()));
        if new_value.is_null() && !entry.is_object() {
            // Deleting through a missing/non-object intermediate is a no-op.
            return Ok(());
        }
        if !entry.is_object() {
            return Err(PatchError::NotAnObject {
                pointer: path.to_string(),
            });
        }
        cursor = entry.as_object_mut().expect("checked is_object above");
    }

    if new_value.is_null() {
        cursor.remove(last);
    } else {
        cursor.insert(last.clone(), new_value.clone());
    }
    Ok(())
}

/// Derive the minimal patch document such that `apply(a, create(a, b)) ==
/// b`, for arbitrary JSON values `a` and `b`, not just objects. Object-valued
/// properties present in both `a` and `b` are diffed recursively so only the
/// changed leaves appear in the result; any other type mismatch (including
/// arrays, which JMAP always replaces wholesale, and differing non-object
/// roots) is recorded as a single full-value replacement keyed by the
/// RFC 6901 pointer to that location — `""` at the root.
#[must_use]
pub fn create(a: &Value, b: &Value) -> PatchObject {
    let mut out = PatchObject::new();
    diff_into(&mut Vec::new(), a, b, &mut out);
    out
}

fn diff_into(prefix: &mut Vec<String>, a: &Value, b: &Value, out: &mut PatchObject) {
    match (a, b) {
        (Value::Object(a_map), Value::Object(b_map)) => {
            for key in a_map.keys().chain(b_map.keys()).collect::<std::collections::BTreeSet<_>>() {
                match (a_map.get(key), b_map.get(key)) {
                    (Some(av), Some(bv)) if av == bv => {}
                    (Some(av), Some(bv)) if av.is_object() && bv.is_object() => {
                        prefix.push(escape_segment(key));
                        diff_into(prefix, av, bv, out);
                        prefix.pop();
                    }
                    (Some(_), None) => {
                        out.insert(joined_path(prefix, key), Value::Null);
                    }
                    (_, Some(bv)) => {
                        out.insert(joined_path(prefix, key), bv.clone());
                    }
                    (None, None) => unreachable!("key came from one of the two maps"),
                }
            }
        }
        _ if a != b => {
            // An empty `prefix` joins to `""`, the RFC 6901 pointer that
            // `apply_one` treats as "replace the whole document" — the
            // root-replacement slot this patch format otherwise lacks.
            out.insert(prefix.join("/"), b.clone());
        }
        _ => {}
    }
}

fn escape_segment(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn joined_path(prefix: &[String], key: &str) -> String {
    if prefix.is_empty() {
        escape_segment(key)
    } else {
        format!("{}/{}", prefix.join("/"), escape_segment(key))
    }
}
