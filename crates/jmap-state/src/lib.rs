// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The opaque per-type state token codec.
//!
//! A [`StateToken`] wraps a `MODSEQ_FMT`-formatted integer drawn from the
//! backing store's per-type modification sequence. It is intentionally
//! comparable only for equality — the core specification requires that
//! "lexicographic ordering MUST NOT be exposed", so [`StateToken`]
//! deliberately does not derive `Ord`/`PartialOrd`; the only sanctioned way
//! to compare two states is [`compare`], which parses both sides back to
//! their modseq and orders those.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Errors parsing a state token back into a modseq.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateTokenError {
    /// The token was not a valid unsigned decimal integer.
    #[error("state token `{0}` is not a valid modseq")]
    NotAModseq(String),
}

/// An opaque, per-type state string used for optimistic concurrency and
/// change detection. Equality-comparable only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateToken(String);

impl StateToken {
    /// Mint a state token from a raw modseq.
    #[must_use]
    pub fn from_modseq(modseq: u64) -> Self {
        Self(modseq.to_string())
    }

    /// Parse an arbitrary string as a state token without validating its
    /// shape — used when echoing back a client-supplied `ifInState` or
    /// `sinceState` value for comparison.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The token's wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the underlying modseq.
    ///
    /// # Errors
    ///
    /// Returns [`StateTokenError::NotAModseq`] if this token was never
    /// minted from a modseq (e.g. a malformed client-supplied value).
    pub fn modseq(&self) -> Result<u64, StateTokenError> {
        self.0
            .parse::<u64>()
            .map_err(|_| StateTokenError::NotAModseq(self.0.clone()))
    }
}

impl PartialEq for StateToken {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for StateToken {}

/// Compare two state tokens by their underlying modseq.
///
/// Returns `None` if either token is not a well-formed modseq string (e.g.
/// a stale or client-forged `sinceState`) — callers should treat that as
/// "incomparable" and map it to `cannotCalculateChanges`, per §4.3/4.4 of
/// the core specification.
#[must_use]
pub fn compare(a: &StateToken, b: &StateToken) -> Option<Ordering> {
    Some(a.modseq().ok()?.cmp(&b.modseq().ok()?))
}

/// An in-memory per-type modseq counter, standing in for "the type's
/// modification-sequence from the backing store" (§4.10). Real deployments
/// delegate this to the mailbox store; this type lets the dispatcher and
/// its tests exercise `getState`/`cmpState`/`highestModseq` without one.
#[derive(Debug, Default)]
pub struct ModseqTable {
    counters: std::sync::Mutex<BTreeMap<String, AtomicU64>>,
}

impl ModseqTable {
    /// A fresh table with every type starting at modseq 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current modseq for `object_type`, defaulting to 0 if the type
    /// has never changed.
    #[must_use]
    pub fn current(&self, object_type: &str) -> u64 {
        let counters = self.counters.lock().expect("modseq table lock poisoned");
        counters
            .get(object_type)
            .map_or(0, |c| c.load(AtomicOrdering::SeqCst))
    }

    /// `getState`: the current state token for `object_type`.
    #[must_use]
    pub fn state(&self, object_type: &str) -> StateToken {
        StateToken::from_modseq(self.current(object_type))
    }

    /// Bump `object_type`'s modseq by one (a handler calls this after a
    /// successful mutation) and return the new value.
    pub fn bump(&self, object_type: &str) -> u64 {
        let mut counters = self.counters.lock().expect("modseq table lock poisoned");
        counters
            .entry(object_type.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, AtomicOrdering::SeqCst)
            + 1
    }

    /// `highestModseq`: alias of [`ModseqTable::current`], named to match
    /// §4.10's vocabulary.
    #[must_use]
    pub fn highest_modseq(&self, object_type: &str) -> u64 {
        self.current(object_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_tokens_compare_equal() {
        let a = StateToken::from_modseq(5);
        let b = StateToken::from_modseq(5);
        assert_eq!(a, b);
        assert_eq!(compare(&a, &b), Some(Ordering::Equal));
    }

    #[test]
    fn newer_modseq_compares_greater() {
        let older = StateToken::from_modseq(1);
        let newer = StateToken::from_modseq(2);
        assert_eq!(compare(&newer, &older), Some(Ordering::Greater));
        assert_eq!(compare(&older, &newer), Some(Ordering::Less));
    }

    #[test]
    fn malformed_token_is_incomparable() {
        let bogus = StateToken::from_raw("not-a-number");
        let ok = StateToken::from_modseq(1);
        assert_eq!(compare(&bogus, &ok), None);
    }

    #[test]
    fn modseq_table_starts_at_zero_and_bumps_monotonically() {
        let table = ModseqTable::new();
        assert_eq!(table.current("Email"), 0);
        assert_eq!(table.bump("Email"), 1);
        assert_eq!(table.bump("Email"), 2);
        assert_eq!(table.current("Mailbox"), 0);
        assert_eq!(table.highest_modseq("Email"), 2);
    }

    #[test]
    fn state_token_serde_round_trips() {
        let t = StateToken::from_modseq(42);
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v, serde_json::json!("42"));
    }
}
