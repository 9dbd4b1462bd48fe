// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The per-request rights cache.
//!
//! Memoizes the authenticated user's ACL rights bitset for each mailbox
//! name touched during a request, so repeated `hasrights` checks against
//! the same mailbox don't re-walk the backing store's ACL. A handler that
//! changes a mailbox's ACL mid-request must call [`RightsCache::invalidate`]
//! so the next lookup re-derives the bitset rather than serving a stale one.

use std::collections::BTreeMap;
use tracing::trace;

/// A single ACL right, per RFC 4314 §2 (the `lrswipkxtecdn` rights string),
/// as used by JMAP mailbox sharing (RFC 8621 §2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Right {
    /// `l` — lookup: mailbox is visible to `Mailbox/get`.
    Lookup = 1 << 0,
    /// `r` — read: messages may be fetched.
    Read = 1 << 1,
    /// `s` — keep seen/unseen state per user.
    Seen = 1 << 2,
    /// `w` — write other flags (not seen/deleted).
    Write = 1 << 3,
    /// `i` — insert new messages.
    Insert = 1 << 4,
    /// `p` — post (submit mail addressed to this mailbox).
    Post = 1 << 5,
    /// `k` — create child mailboxes.
    CreateChild = 1 << 6,
    /// `x` — delete the mailbox itself.
    DeleteMailbox = 1 << 7,
    /// `t` — mark messages `\Deleted`.
    DeleteMessages = 1 << 8,
    /// `e` — expunge messages marked `\Deleted`.
    Expunge = 1 << 9,
    /// `c` — legacy `create`, folded into `k`/`x` by RFC 4314 but still
    /// advertised by some stores; kept as a distinct bit for fidelity.
    CreateLegacy = 1 << 10,
    /// `d` — legacy `delete`, folded into `t`/`e`/`x`.
    DeleteLegacy = 1 << 11,
    /// `n` — annotate: set/read shared mailbox annotations.
    Annotate = 1 << 12,
}

impl Right {
    /// This right's bit value.
    #[must_use]
    pub fn bit(self) -> u32 {
        self as u32
    }
}

/// A bitset of [`Right`]s, as returned by [`RightsCache::rights`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rights(u32);

impl Rights {
    /// The empty rights set.
    pub const NONE: Rights = Rights(0);

    /// Build a rights set from an iterator of individual rights.
    #[must_use]
    pub fn of(rights: impl IntoIterator<Item = Right>) -> Self {
        rights.into_iter().fold(Rights::NONE, |acc, r| acc | r)
    }

    /// The raw bitmask.
    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Construct directly from a raw bitmask, e.g. one read back from a
    /// backing store's stored ACL representation.
    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        Rights(bits)
    }

    /// `true` if every bit set in `mask` is also set in `self`.
    #[must_use]
    pub fn has(self, mask: Rights) -> bool {
        self.0 & mask.0 == mask.0
    }

    /// `true` if this set has no rights at all.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr<Right> for Rights {
    type Output = Rights;
    fn bitor(self, rhs: Right) -> Rights {
        Rights(self.0 | rhs.bit())
    }
}

impl std::ops::BitOr for Rights {
    type Output = Rights;
    fn bitor(self, rhs: Rights) -> Rights {
        Rights(self.0 | rhs.0)
    }
}

/// The narrow contract this cache needs from the backing store: derive the
/// authenticated user's effective rights bitset on a mailbox, by name.
/// Everything about how ACLs are actually stored is out of scope here.
pub trait RightsSource {
    /// Compute the current user's effective rights on `mailbox`.
    fn rights_for(&self, mailbox: &str) -> Rights;
}

/// Per-request memoization table mapping mailbox name to its rights
/// bitset, plus a tombstone set of names explicitly invalidated so a
/// subsequent lookup is known to need re-derivation rather than reusing a
/// stale `None`.
#[derive(Debug, Default)]
pub struct RightsCache {
    cached: BTreeMap<String, Rights>,
}

impl RightsCache {
    /// A fresh, empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The memoized rights bitset for `mailbox`, deriving and caching it
    /// via `source` on first access.
    pub fn rights(&mut self, mailbox: &str, source: &dyn RightsSource) -> Rights {
        if let Some(r) = self.cached.get(mailbox) {
            return *r;
        }
        let derived = source.rights_for(mailbox);
        trace!(mailbox, bits = derived.bits(), "derived rights");
        self.cached.insert(mailbox.to_string(), derived);
        derived
    }

    /// `true` if the memoized (or freshly derived) rights for `mailbox`
    /// contain every bit in `mask`.
    pub fn has_rights(&mut self, mailbox: &str, mask: Rights, source: &dyn RightsSource) -> bool {
        self.rights(mailbox, source).has(mask)
    }

    /// Drop the memoized entry for `mailbox`, forcing re-derivation on the
    /// next lookup. Called by a handler that just altered the mailbox's
    /// ACL mid-request.
    pub fn invalidate(&mut self, mailbox: &str) {
        self.cached.remove(mailbox);
    }

    /// Number of mailboxes with a memoized entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cached.len()
    }

    /// Returns `true` if nothing has been memoized yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cached.is_empty()
    }
}
