//! Tag-set representation and the four set operations.
//!
//! Tag sets travel as comma-joined strings. They are normalized on every
//! boundary crossing: entries are trimmed, blanks dropped, duplicates
//! collapsed, and the result is joined back in sorted order, so
//! `"a,b,,a"` becomes `"a,b"` no matter how it arrives.

use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::{OpError, Reason};

/// Split a comma-joined tag string into a sorted, de-duplicated set.
/// Entries are trimmed; blank entries are dropped.
pub fn split_tags(input: &str) -> BTreeSet<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join a tag set back into its canonical comma-joined form.
pub fn join_tags(tags: &BTreeSet<String>) -> String {
    tags.iter().cloned().collect::<Vec<_>>().join(",")
}

/// Canonicalize a comma-joined tag string in one step.
pub fn normalize_tags(input: &str) -> String {
    join_tags(&split_tags(input))
}

/// One of the four ways a stored tag set can be combined with a supplied one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagSetOp {
    /// Replace the stored set with the supplied one.
    Set,
    /// Union of stored and supplied sets.
    Or,
    /// Intersection of stored and supplied sets.
    And,
    /// Stored set minus the supplied one.
    Minus,
}

impl TagSetOp {
    /// Apply this operation to `current` with the supplied `operand`.
    pub fn apply(&self, current: &BTreeSet<String>, operand: &BTreeSet<String>) -> BTreeSet<String> {
        match self {
            TagSetOp::Set => operand.clone(),
            TagSetOp::Or => current.union(operand).cloned().collect(),
            TagSetOp::And => current.intersection(operand).cloned().collect(),
            TagSetOp::Minus => current.difference(operand).cloned().collect(),
        }
    }
}

impl FromStr for TagSetOp {
    type Err = OpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SET" => Ok(TagSetOp::Set),
            "OR" => Ok(TagSetOp::Or),
            "AND" => Ok(TagSetOp::And),
            "MINUS" => Ok(TagSetOp::Minus),
            other => Err(OpError::new(
                Reason::WrongFormat,
                format!("Method {other:?} is unapplicable"),
            )
            .detail("wrong_value", serde_json::Value::String(other.to_string()))),
        }
    }
}
