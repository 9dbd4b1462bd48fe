// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The per-request open-mailbox cache.
//!
//! Lock-promotion is impossible in the underlying mailbox store (opening a
//! mailbox read-only and later asking for a write lock on the same handle
//! cannot be satisfied), so [`MailboxCache`] enforces that any request
//! needing write access declares it before the first `open` call, via
//! [`MailboxCache::set_force_rw`]. A handle opened read-write always
//! satisfies a later read-only request for the same name; the reverse
//! requires the caller to have set the force flag first.

use jmap_error::MethodError;
use std::collections::BTreeMap;
use tracing::debug;

/// The lock mode a mailbox handle was opened under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Read-only; concurrent readers are fine, no mutation is possible.
    ReadOnly,
    /// Read-write; exclusive with respect to other writers per the
    /// backing store's own locking.
    ReadWrite,
}

/// An open mailbox handle. `lock_id` identifies the underlying lock so
/// tests (and callers) can verify that repeated opens of the same name
/// return handles denoting the same lock rather than re-acquiring it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxHandle {
    /// Mailbox name this handle was opened for.
    pub name: String,
    /// The mode it was actually opened under.
    pub mode: LockMode,
    /// Opaque identifier of the underlying lock.
    pub lock_id: u64,
}

/// The narrow contract this cache needs from the backing mailbox store:
/// open a named mailbox under a lock mode, and commit or abort an open
/// handle at request teardown. Everything else about mailbox storage is
/// out of scope for this workspace.
pub trait MailboxStore {
    /// Open `name` under `mode`, or fail if the store can't.
    ///
    /// # Errors
    ///
    /// Returns a [`MethodError`] if the mailbox doesn't exist or the store
    /// is unavailable.
    fn open(&self, name: &str, mode: LockMode) -> Result<MailboxHandle, MethodError>;

    /// Commit a read-write handle's changes, or release a read-only one.
    ///
    /// # Errors
    ///
    /// Returns a [`MethodError`] if the commit fails at the store layer.
    fn commit(&self, handle: &MailboxHandle) -> Result<(), MethodError>;
}

/// Per-request cache of open mailbox handles, keyed by name.
pub struct MailboxCache<'s> {
    store: &'s dyn MailboxStore,
    entries: BTreeMap<String, MailboxHandle>,
    force_rw: bool,
}

impl<'s> MailboxCache<'s> {
    /// A fresh, empty cache backed by `store`.
    #[must_use]
    pub fn new(store: &'s dyn MailboxStore) -> Self {
        Self {
            store,
            entries: BTreeMap::new(),
            force_rw: false,
        }
    }

    /// Stick the request into "always open read-write" mode. Must be
    /// called before the first [`MailboxCache::open`] of any mailbox that
    /// will later need a write lock; sticky for the life of the cache.
    pub fn set_force_rw(&mut self) {
        self.force_rw = true;
    }

    /// Whether the force-read-write flag has been set.
    #[must_use]
    pub fn is_force_rw(&self) -> bool {
        self.force_rw
    }

    /// Open `name`, reusing a cached handle if one satisfies the request.
    ///
    /// # Errors
    ///
    /// Returns a [`MethodError`] if `rw` is requested but only a
    /// read-only handle is cached and [`MailboxCache::set_force_rw`] was
    /// not called before the first open of `name` in this request, or if
    /// the underlying store fails to open a fresh handle.
    pub fn open(&mut self, name: &str, rw: bool) -> Result<&MailboxHandle, MethodError> {
        let wants = if rw || self.force_rw {
            LockMode::ReadWrite
        } else {
            LockMode::ReadOnly
        };

        if let Some(existing) = self.entries.get(name) {
            return match (existing.mode, wants) {
                (LockMode::ReadWrite, _) | (LockMode::ReadOnly, LockMode::ReadOnly) => {
                    Ok(self.entries.get(name).expect("just checked it exists"))
                }
                (LockMode::ReadOnly, LockMode::ReadWrite) => {
                    debug!(mailbox = name, "lock upgrade forbidden");
                    Err(MethodError::from_backend_failure(
                        false,
                        format!("lock upgrade forbidden for mailbox `{name}`"),
                    ))
                }
            };
        }

        let handle = self.store.open(name, wants)?;
        self.entries.insert(name.to_string(), handle);
        Ok(self.entries.get(name).expect("just inserted"))
    }

    /// Advisory close: the cache retains ownership until
    /// [`MailboxCache::teardown`], so this only exists for callers that
    /// want to express "I'm done with this handle for now" in their own
    /// reasoning.
    pub fn close(&self, _name: &str) {}

    /// Commit every cached handle exactly once. Called at request
    /// teardown; consumes the cache so a handle can't be reused
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns the first commit failure encountered; later handles are
    /// still committed on a best-effort basis before returning.
    pub fn teardown(self) -> Result<(), MethodError> {
        let mut first_err = None;
        for handle in self.entries.values() {
            if let Err(e) = self.store.commit(handle) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Number of mailboxes currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been opened yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestStore {
        next_lock_id: AtomicU64,
        lock_ids: Mutex<BTreeMap<String, u64>>,
        commits: Mutex<Vec<String>>,
    }

    impl MailboxStore for TestStore {
        fn open(&self, name: &str, mode: LockMode) -> Result<MailboxHandle, MethodError> {
            let mut ids = self.lock_ids.lock().unwrap();
            let lock_id = *ids
                .entry(name.to_string())
                .or_insert_with(|| self.next_lock_id.fetch_add(1, Ordering::SeqCst));
            Ok(MailboxHandle {
                name: name.to_string(),
                mode,
                lock_id,
            })
        }

        fn commit(&self, handle: &MailboxHandle) -> Result<(), MethodError> {
            self.commits.lock().unwrap().push(handle.name.clone());
            Ok(())
        }
    }

    #[test]
    fn opening_the_same_name_twice_with_the_same_mode_reuses_the_lock() {
        let store = TestStore::default();
        let mut cache = MailboxCache::new(&store);
        let first = cache.open("INBOX", false).unwrap().clone();
        let second = cache.open("INBOX", false).unwrap().clone();
        assert_eq!(first.lock_id, second.lock_id);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn read_write_handle_satisfies_a_later_read_only_request() {
        let store = TestStore::default();
        let mut cache = MailboxCache::new(&store);
        cache.open("INBOX", true).unwrap();
        let second = cache.open("INBOX", false).unwrap();
        assert_eq!(second.mode, LockMode::ReadWrite);
    }

    #[test]
    fn upgrading_a_cached_read_only_handle_is_forbidden() {
        let store = TestStore::default();
        let mut cache = MailboxCache::new(&store);
        cache.open("INBOX", false).unwrap();
        let err = cache.open("INBOX", true).unwrap_err();
        assert!(matches!(err, MethodError::ServerFail { .. }));
    }

    #[test]
    fn force_rw_set_before_first_open_avoids_the_upgrade_failure() {
        let store = TestStore::default();
        let mut cache = MailboxCache::new(&store);
        cache.set_force_rw();
        cache.open("INBOX", false).unwrap();
        let second = cache.open("INBOX", true).unwrap();
        assert_eq!(second.mode, LockMode::ReadWrite);
    }

    #[test]
    fn teardown_commits_every_cached_handle_exactly_once() {
        let store = TestStore::default();
        let mut cache = MailboxCache::new(&store);
        cache.open("INBOX", false).unwrap();
        cache.open("Archive", true).unwrap();
        cache.teardown().unwrap();
        let commits = store.commits.lock().unwrap();
        assert_eq!(commits.len(), 2);
    }
}
