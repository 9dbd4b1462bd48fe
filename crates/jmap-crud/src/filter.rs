// SPDX-License-Identifier: MIT OR Apache-2.0
//! The recursive `FilterOperator` tree `Query`'s `filter` argument parses
//! into: `AND`/`OR`/`NOT` over a list of nested operators or leaf
//! conditions, per RFC 8620 §5.5.

use crate::CrudHooks;
use jmap_parser::Parser;
use serde_json::Value;

/// `AND` / `OR` / `NOT` combinator over a list of child filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// All children must match.
    And,
    /// At least one child must match.
    Or,
    /// No child may match.
    Not,
}

impl FilterOperator {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            "NOT" => Some(Self::Not),
            _ => None,
        }
    }
}

/// A parsed `filter` tree: either a combinator over child filters, or a
/// type-specific leaf condition (opaque `Value`, produced by
/// [`CrudHooks::parse_filter_condition`]).
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// A `{operator, conditions}` node.
    Operator(FilterOperator, Vec<Filter>),
    /// A leaf condition, already validated by the type's hook.
    Condition(Value),
}

impl Filter {
    /// Parse `value` as a filter tree, recursing through `operator` nodes
    /// and delegating leaf conditions to `hooks`.
    #[must_use]
    pub fn parse(parser: &mut Parser, value: &Value, hooks: &dyn CrudHooks) -> Option<Self> {
        let Some(obj) = value.as_object() else {
            parser.invalid_here();
            return None;
        };

        if let Some(op_value) = obj.get("operator") {
            let Some(op_str) = op_value.as_str() else {
                parser.invalid("operator");
                return None;
            };
            let Some(op) = FilterOperator::from_str(op_str) else {
                parser.invalid("operator");
                return None;
            };
            let Some(conditions) = parser.read_array(value, "conditions", true) else {
                return None;
            };
            let conditions = conditions.clone();
            let mut children = Vec::with_capacity(conditions.len());
            let mut ok = true;
            parser.descend_property("conditions", |parser| {
                for (i, child) in conditions.iter().enumerate() {
                    match parser.descend_index(i, |parser| Self::parse(parser, child, hooks)) {
                        Some(child) => children.push(child),
                        None => ok = false,
                    }
                }
            });
            if !ok {
                return None;
            }
            return Some(Self::Operator(op, children));
        }

        hooks.parse_filter_condition(parser, value).map(Self::Condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    struct Hooks {
        valid: BTreeSet<String>,
    }

    impl CrudHooks for Hooks {
        fn properties(&self) -> &BTreeSet<String> {
            &self.valid
        }

        fn parse_filter_condition(&self, parser: &mut Parser, value: &Value) -> Option<Value> {
            let obj = value.as_object()?;
            if let Some(subject) = obj.get("subject") {
                if subject.is_string() {
                    return Some(value.clone());
                }
            }
            parser.invalid_here();
            None
        }
    }

    fn hooks() -> Hooks {
        Hooks {
            valid: BTreeSet::new(),
        }
    }

    #[test]
    fn leaf_condition_parses_via_hook() {
        let mut p = Parser::new();
        let v = json!({"subject": "hello"});
        let f = Filter::parse(&mut p, &v, &hooks()).unwrap();
        assert_eq!(f, Filter::Condition(v));
    }

    #[test]
    fn and_operator_parses_children_recursively() {
        let mut p = Parser::new();
        let v = json!({"operator": "AND", "conditions": [
            {"subject": "a"},
            {"subject": "b"},
        ]});
        let f = Filter::parse(&mut p, &v, &hooks()).unwrap();
        match f {
            Filter::Operator(FilterOperator::And, children) => assert_eq!(children.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn nested_not_over_or() {
        let mut p = Parser::new();
        let v = json!({"operator": "NOT", "conditions": [
            {"operator": "OR", "conditions": [{"subject": "a"}, {"subject": "b"}]},
        ]});
        let f = Filter::parse(&mut p, &v, &hooks()).unwrap();
        match f {
            Filter::Operator(FilterOperator::Not, children) => {
                assert_eq!(children.len(), 1);
                assert!(matches!(children[0], Filter::Operator(FilterOperator::Or, _)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_operator_is_invalid() {
        let mut p = Parser::new();
        let v = json!({"operator": "XOR", "conditions": []});
        assert!(Filter::parse(&mut p, &v, &hooks()).is_none());
        assert_eq!(p.invalid_pointers(), &["/operator".to_string()]);
    }

    #[test]
    fn bad_leaf_condition_is_invalid() {
        let mut p = Parser::new();
        let v = json!({"subject": 5});
        assert!(Filter::parse(&mut p, &v, &hooks()).is_none());
        assert_eq!(p.invalid_pointers(), &["".to_string()]);
    }
}
