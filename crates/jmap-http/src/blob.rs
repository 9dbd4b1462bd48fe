// SPDX-License-Identifier: MIT OR Apache-2.0
//! Content-addressed blob storage backing uploads, downloads, `Blob/get`,
//! and `Blob/copy`.
//!
//! Blobs are keyed by [`jmap_blobid::BlobId`], itself a SHA-1 digest of the
//! content — storage is a pure key-value map from account scope + digest to
//! bytes, with no notion of mailbox, message, or MIME structure.

use jmap_blobid::BlobId;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// Failure modes a [`BlobStore`] implementation can report.
#[derive(Debug, Error)]
pub enum BlobStoreError {
    /// The backing filesystem rejected a read or write.
    #[error("blob store I/O failure: {0}")]
    Io(#[from] std::io::Error),
    /// `copy` was asked to duplicate a blob that does not exist in the
    /// source account.
    #[error("source blob not found")]
    SourceNotFound,
}

/// Content-addressed storage for opaque blob bytes, scoped per account.
///
/// Implementations need not deduplicate across accounts — each account's
/// blobs are logically independent even when two accounts happen to upload
/// identical content (and therefore compute the same [`BlobId`]).
pub trait BlobStore: Send + Sync {
    /// Store `content` under `account_id`, returning its content-derived id.
    fn put(&self, account_id: &str, content: &[u8]) -> Result<BlobId, BlobStoreError>;

    /// Fetch the bytes of `blob_id` under `account_id`, if present.
    fn get(&self, account_id: &str, blob_id: &BlobId) -> Result<Option<Vec<u8>>, BlobStoreError>;

    /// Duplicate `blob_id` from `from_account_id` into `to_account_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::SourceNotFound`] if `blob_id` does not
    /// exist under `from_account_id`.
    fn copy(&self, from_account_id: &str, to_account_id: &str, blob_id: &BlobId) -> Result<(), BlobStoreError>;

    /// Remove `blob_id` from `account_id`'s scope, used by `Blob/copy`'s
    /// `onSuccessDestroyOriginal`. A missing blob is not an error — the
    /// caller only wants it gone.
    fn delete(&self, account_id: &str, blob_id: &BlobId) -> Result<(), BlobStoreError>;
}

/// A filesystem-backed [`BlobStore`]: one file per blob at
/// `{root}/{account_id}/{digestHex}`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Root directory blobs are stored under. Created lazily per account on
    /// first write — the root itself is not created here.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, account_id: &str, blob_id: &BlobId) -> PathBuf {
        self.root.join(account_id).join(blob_id.digest_hex())
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, account_id: &str, content: &[u8]) -> Result<BlobId, BlobStoreError> {
        let blob_id = BlobId::from_content(content);
        let path = self.path_for(account_id, &blob_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(blob_id)
    }

    fn get(&self, account_id: &str, blob_id: &BlobId) -> Result<Option<Vec<u8>>, BlobStoreError> {
        match std::fs::read(self.path_for(account_id, blob_id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn copy(&self, from_account_id: &str, to_account_id: &str, blob_id: &BlobId) -> Result<(), BlobStoreError> {
        let source = self.path_for(from_account_id, blob_id);
        if !source.exists() {
            return Err(BlobStoreError::SourceNotFound);
        }
        let dest = self.path_for(to_account_id, blob_id);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&source, &dest)?;
        Ok(())
    }

    fn delete(&self, account_id: &str, blob_id: &BlobId) -> Result<(), BlobStoreError> {
        match std::fs::remove_file(self.path_for(account_id, blob_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// An in-memory [`BlobStore`], used in tests and for ephemeral deployments
/// that accept losing blobs across restarts.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryBlobStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, account_id: &str, content: &[u8]) -> Result<BlobId, BlobStoreError> {
        let blob_id = BlobId::from_content(content);
        self.blobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert((account_id.to_string(), blob_id.digest_hex().to_string()), content.to_vec());
        Ok(blob_id)
    }

    fn get(&self, account_id: &str, blob_id: &BlobId) -> Result<Option<Vec<u8>>, BlobStoreError> {
        let key = (account_id.to_string(), blob_id.digest_hex().to_string());
        Ok(self.blobs.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(&key).cloned())
    }

    fn copy(&self, from_account_id: &str, to_account_id: &str, blob_id: &BlobId) -> Result<(), BlobStoreError> {
        let mut blobs = self.blobs.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let source_key = (from_account_id.to_string(), blob_id.digest_hex().to_string());
        let Some(content) = blobs.get(&source_key).cloned() else {
            return Err(BlobStoreError::SourceNotFound);
        };
        blobs.insert((to_account_id.to_string(), blob_id.digest_hex().to_string()), content);
        Ok(())
    }

    fn delete(&self, account_id: &str, blob_id: &BlobId) -> Result<(), BlobStoreError> {
        let key = (account_id.to_string(), blob_id.digest_hex().to_string());
        self.blobs.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&key);
        Ok(())
    }
}
