// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! A path-aware JSON argument validator.
//!
//! [`Parser`] replaces the exception-for-control-flow idiom ("throw on the
//! first bad property") with an explicit accumulating parser: every
//! `read_*` call either fills its output or records the RFC 6901 pointer of
//! the offending location and returns `None`, and nothing unwinds. A
//! handler calls `read_*` for every property it cares about and then checks
//! [`Parser::into_result`] once at the end.

use jmap_error::MethodError;
use serde_json::{Map, Value};

/// Depth/size guard applied to an arguments object before path-aware
/// validation begins, so adversarial nesting can't make the invalid-pointer
/// walk itself expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardLimits {
    /// Maximum allowed nesting depth of objects/arrays.
    pub max_depth: usize,
    /// Maximum allowed UTF-8 byte size of the serialized value.
    pub max_size_bytes: usize,
}

impl GuardLimits {
    /// Construct new guard limits.
    #[must_use]
    pub const fn new(max_depth: usize, max_size_bytes: usize) -> Self {
        Self {
            max_depth,
            max_size_bytes,
        }
    }
}

impl Default for GuardLimits {
    fn default() -> Self {
        Self::new(32, 16 * 1024 * 1024)
    }
}

fn exceeds_depth(value: &Value, max_depth: usize) -> bool {
    if max_depth == 0 {
        return value.is_object() || value.is_array();
    }
    match value {
        Value::Object(map) => map.values().any(|v| exceeds_depth(v, max_depth - 1)),
        Value::Array(arr) => arr.iter().any(|v| exceeds_depth(v, max_depth - 1)),
        _ => false,
    }
}

/// One segment of the parser's current path into the arguments object.
#[derive(Debug, Clone)]
enum PathSegment {
    Property(String),
    Index(usize),
}

/// A mutable path stack plus an accumulator for invalid RFC 6901 pointers.
///
/// The invariant: after argument parsing completes, the accumulator
/// contains exactly the set of pointers naming locations that failed
/// validation, in the order they were encountered.
#[derive(Debug, Default)]
pub struct Parser {
    path: Vec<PathSegment>,
    invalid: Vec<String>,
}

impl Parser {
    /// Start a fresh parser with an empty path and no recorded errors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the depth/size guard over `arguments` before constructing a
    /// parser for it.
    ///
    /// # Errors
    ///
    /// Returns [`MethodError::invalid_argument`] with pointer `""` (the
    /// whole arguments object) if `arguments` is too deep or too large —
    /// deliberately a single error rather than walking every offending
    /// location, since an adversarially nested payload could otherwise make
    /// that walk itself expensive.
    pub fn for_arguments(arguments: &Value, limits: GuardLimits) -> Result<Self, MethodError> {
        if exceeds_depth(arguments, limits.max_depth) {
            return Err(MethodError::invalid_argument(""));
        }
        if arguments.to_string().len() > limits.max_size_bytes {
            return Err(MethodError::invalid_argument(""));
        }
        Ok(Self::new())
    }

    fn pointer(&self) -> String {
        let mut out = String::new();
        for seg in &self.path {
            out.push('/');
            match seg {
                PathSegment::Property(name) => out.push_str(&escape_pointer_segment(name)),
                PathSegment::Index(i) => out.push_str(&i.to_string()),
            }
        }
        out
    }

    /// Push a property-name segment, run `f`, then pop it again.
    pub fn descend_property<R>(&mut self, name: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        self.path.push(PathSegment::Property(name.to_string()));
        let r = f(self);
        self.path.pop();
        r
    }

    /// Push an array-index segment, run `f`, then pop it again.
    pub fn descend_index<R>(&mut self, index: usize, f: impl FnOnce(&mut Self) -> R) -> R {
        self.path.push(PathSegment::Index(index));
        let r = f(self);
        self.path.pop();
        r
    }

    /// Record `name` as invalid at the current path, snapshotting the full
    /// RFC 6901 pointer into the accumulator.
    pub fn invalid(&mut self, name: &str) {
        self.descend_property(name, |p| {
            p.invalid.push(p.pointer());
        });
    }

    /// Record the current path itself (with no further descent) as invalid.
    pub fn invalid_here(&mut self) {
        self.invalid.push(self.pointer());
    }

    /// Returns `true` if no invalid pointers have been recorded.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.invalid.is_empty()
    }

    /// All recorded invalid pointers, in encounter order.
    #[must_use]
    pub fn invalid_pointers(&self) -> &[String] {
        &self.invalid
    }

    /// Finish parsing: `Ok(())` if nothing was recorded invalid, otherwise
    /// [`MethodError::InvalidArguments`] carrying every recorded pointer.
    ///
    /// # Errors
    ///
    /// Returns [`MethodError::InvalidArguments`] if any property failed
    /// validation.
    pub fn into_result(self) -> Result<(), MethodError> {
        if self.invalid.is_empty() {
            Ok(())
        } else {
            Err(MethodError::InvalidArguments {
                arguments: self.invalid,
            })
        }
    }

    /// Read a mandatory or optional string property.
    ///
    /// Absent + optional => `Ok(None)`. Absent + mandatory, or present with
    /// the wrong shape, => invalid pointer recorded and `None` returned.
    pub fn read_str<'a>(&mut self, obj: &'a Value, name: &str, mandatory: bool) -> Option<&'a str> {
        match obj.get(name) {
            None if mandatory => {
                self.invalid(name);
                None
            }
            None => None,
            Some(Value::String(s)) => Some(s.as_str()),
            Some(_) => {
                self.invalid(name);
                None
            }
        }
    }

    /// Read a mandatory or optional boolean property.
    pub fn read_bool(&mut self, obj: &Value, name: &str, mandatory: bool) -> Option<bool> {
        match obj.get(name) {
            None if mandatory => {
                self.invalid(name);
                None
            }
            None => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(_) => {
                self.invalid(name);
                None
            }
        }
    }

    /// Read a mandatory or optional integer property (JSON numbers without
    /// a fractional part).
    pub fn read_i64(&mut self, obj: &Value, name: &str, mandatory: bool) -> Option<i64> {
        match obj.get(name) {
            None if mandatory => {
                self.invalid(name);
                None
            }
            None => None,
            Some(v) => match v.as_i64() {
                Some(n) => Some(n),
                None => {
                    self.invalid(name);
                    None
                }
            },
        }
    }

    /// Read a mandatory or optional object property.
    pub fn read_object<'a>(
        &mut self,
        obj: &'a Value,
        name: &str,
        mandatory: bool,
    ) -> Option<&'a Map<String, Value>> {
        match obj.get(name) {
            None if mandatory => {
                self.invalid(name);
                None
            }
            None => None,
            Some(Value::Object(m)) => Some(m),
            Some(_) => {
                self.invalid(name);
                None
            }
        }
    }

    /// Read a mandatory or optional array property.
    pub fn read_array<'a>(
        &mut self,
        obj: &'a Value,
        name: &str,
        mandatory: bool,
    ) -> Option<&'a Vec<Value>> {
        match obj.get(name) {
            None if mandatory => {
                self.invalid(name);
                None
            }
            None => None,
            Some(Value::Array(a)) => Some(a),
            Some(_) => {
                self.invalid(name);
                None
            }
        }
    }

    /// Read an array-of-strings property, recording an invalid pointer at
    /// the specific index that isn't a string rather than the whole array.
    pub fn read_string_array(&mut self, obj: &Value, name: &str, mandatory: bool) -> Option<Vec<String>> {
        let arr = self.read_array(obj, name, mandatory)?;
        let arr = arr.clone();
        let mut out = Vec::with_capacity(arr.len());
        let mut ok = true;
        self.descend_property(name, |p| {
            for (i, item) in arr.iter().enumerate() {
                match item.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => {
                        p.descend_index(i, |p| p.invalid_here());
                        ok = false;
                    }
                }
            }
        });
        if ok { Some(out) } else { None }
    }
}

fn escape_pointer_segment(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_mandatory_property_is_recorded_invalid() {
        let mut p = Parser::new();
        let obj = json!({});
        assert_eq!(p.read_str(&obj, "ids", true), None);
        assert_eq!(p.invalid_pointers(), &["/ids".to_string()]);
    }

    #[test]
    fn missing_optional_property_is_not_an_error() {
        let mut p = Parser::new();
        let obj = json!({});
        assert_eq!(p.read_str(&obj, "ids", false), None);
        assert!(p.is_valid());
    }

    #[test]
    fn wrong_shape_is_recorded_invalid() {
        let mut p = Parser::new();
        let obj = json!({"ids": 5});
        assert_eq!(p.read_array(&obj, "ids", true), None);
        assert_eq!(p.invalid_pointers(), &["/ids".to_string()]);
    }

    #[test]
    fn nested_path_builds_correct_pointer() {
        let mut p = Parser::new();
        p.descend_property("update", |p| {
            p.descend_property("M123", |p| {
                p.invalid("mailboxIds");
            });
        });
        assert_eq!(p.invalid_pointers(), &["/update/M123/mailboxIds".to_string()]);
    }

    #[test]
    fn into_result_ok_when_nothing_recorded() {
        assert!(Parser::new().into_result().is_ok());
    }

    #[test]
    fn into_result_carries_every_pointer() {
        let mut p = Parser::new();
        p.invalid("a");
        p.invalid("b");
        let err = p.into_result().unwrap_err();
        match err {
            MethodError::InvalidArguments { arguments } => {
                assert_eq!(arguments, vec!["/a".to_string(), "/b".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn guard_rejects_over_deep_arguments() {
        let deep = json!({"a": {"b": {"c": {"d": 1}}}});
        let limits = GuardLimits::new(2, 1_000_000);
        assert!(Parser::for_arguments(&deep, limits).is_err());
    }

    #[test]
    fn guard_rejects_oversized_arguments() {
        let big = json!({"data": "x".repeat(1000)});
        let limits = GuardLimits::new(32, 10);
        assert!(Parser::for_arguments(&big, limits).is_err());
    }

    #[test]
    fn guard_accepts_well_formed_arguments() {
        let ok = json!({"ids": ["a", "b"]});
        assert!(Parser::for_arguments(&ok, GuardLimits::default()).is_ok());
    }

    #[test]
    fn read_string_array_flags_offending_index_not_whole_array() {
        let mut p = Parser::new();
        let obj = json!({"ids": ["a", 5, "c"]});
        assert_eq!(p.read_string_array(&obj, "ids", true), None);
        assert_eq!(p.invalid_pointers(), &["/ids/1".to_string()]);
    }

    #[test]
    fn pointer_escapes_tilde_and_slash() {
        let mut p = Parser::new();
        p.invalid("a/b~c");
        assert_eq!(p.invalid_pointers(), &["/a~1b~0c".to_string()]);
    }
}
