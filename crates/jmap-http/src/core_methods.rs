// SPDX-License-Identifier: MIT OR Apache-2.0
//! The methods the core registers directly, per §4.2: `Core/echo`,
//! `Blob/get`, `Blob/copy`. Every data-type-specific method (mail,
//! contacts, calendars, submission) belongs to a protocol module this
//! crate does not define.

use crate::blob::{BlobStore, BlobStoreError};
use jmap_blobid::BlobId;
use jmap_crud::get::resolve;
use jmap_crud::{CopyOutcome, CopyRequest, CopyResponse, GetRequest, GetResponse};
use jmap_dispatch::RequestContext;
use jmap_error::{MethodError, ObjectError};
use jmap_parser::Parser;
use jmap_registry::{MethodFlags, MethodRegistry};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Register `Core/echo`, `Blob/get`, and `Blob/copy` against `registry`,
/// wiring the latter two to `blobs`.
pub fn register(registry: &mut MethodRegistry<RequestContext<'static>>, blobs: Arc<dyn BlobStore>) {
    registry.register(
        "Core/echo",
        jmap_capability::uri::CORE,
        MethodFlags::SHARED_CSTATE,
        core_echo,
    );

    let get_blobs = Arc::clone(&blobs);
    registry.register(
        "Blob/get",
        jmap_capability::uri::CORE,
        MethodFlags::SHARED_CSTATE,
        move |ctx: &mut RequestContext<'_>, args| blob_get(ctx, args, &get_blobs),
    );

    registry.register(
        "Blob/copy",
        jmap_capability::uri::CORE,
        MethodFlags::NONE,
        move |ctx: &mut RequestContext<'_>, args| blob_copy(ctx, args, &blobs),
    );
}

fn core_echo(_ctx: &mut RequestContext<'_>, args: Value) -> Result<Value, MethodError> {
    Ok(args)
}

fn blob_properties() -> BTreeSet<String> {
    ["id".to_string(), "size".to_string()].into_iter().collect()
}

fn blob_get(ctx: &mut RequestContext<'_>, args: Value, blobs: &Arc<dyn BlobStore>) -> Result<Value, MethodError> {
    let mut parser = Parser::new();
    let valid_properties = blob_properties();
    let parsed = GetRequest::parse(&mut parser, &args, &valid_properties, false);
    parser.into_result()?;
    let request = parsed.expect("parser reported no invalid pointers");

    if ctx.account(&request.account_id).is_none() {
        return Err(MethodError::AccountNotFound);
    }
    let account_id = request.account_id.clone();

    let (list, not_found) = resolve(&request, Vec::new, |id| lookup_blob(blobs, &account_id, id))?;

    let response = GetResponse {
        account_id: request.account_id,
        state: ctx.modseq.state("Blob").as_str().to_string(),
        list,
        not_found,
    };
    Ok(response.reply())
}

fn lookup_blob(blobs: &Arc<dyn BlobStore>, account_id: &str, id: &str) -> Result<Option<Value>, MethodError> {
    let Ok(blob_id) = BlobId::parse(id) else {
        return Ok(None);
    };
    match blobs.get(account_id, &blob_id) {
        Ok(Some(bytes)) => Ok(Some(json!({"id": id, "size": bytes.len()}))),
        Ok(None) => Ok(None),
        Err(e) => Err(MethodError::from_backend_failure(false, e.to_string())),
    }
}

fn blob_copy(ctx: &mut RequestContext<'_>, args: Value, blobs: &Arc<dyn BlobStore>) -> Result<Value, MethodError> {
    let mut parser = Parser::new();
    let parsed = CopyRequest::parse(&mut parser, &args);
    parser.into_result()?;
    let request = parsed.expect("parser reported no invalid pointers");

    if ctx.account(&request.from_account_id).is_none() {
        return Err(MethodError::AccountNotFound);
    }
    if ctx.account(&request.account_id).is_none() {
        return Err(MethodError::AccountNotFound);
    }

    let mut outcome = CopyOutcome::new();
    for (creation_id, spec) in &request.create {
        copy_one(ctx, blobs, &request, creation_id, spec, &mut outcome)?;
    }

    if request.deferred_destroy_args(&outcome).is_some() {
        for source_id in &outcome.source_ids_copied {
            if let Ok(blob_id) = BlobId::parse(source_id) {
                let _ = blobs.delete(&request.from_account_id, &blob_id);
            }
        }
    }

    let response = CopyResponse {
        from_account_id: request.from_account_id,
        account_id: request.account_id,
        new_state: ctx.modseq.state("Blob").as_str().to_string(),
        outcome,
    };
    Ok(response.reply())
}

fn copy_one(
    ctx: &mut RequestContext<'_>,
    blobs: &Arc<dyn BlobStore>,
    request: &CopyRequest,
    creation_id: &str,
    spec: &Value,
    outcome: &mut CopyOutcome,
) {
    let Some(source_id) = spec.get("id").and_then(Value::as_str) else {
        outcome
            .not_created
            .insert(creation_id.to_string(), ObjectError::invalid_property("id"));
        return;
    };
    let Ok(blob_id) = BlobId::parse(source_id) else {
        outcome.not_created.insert(creation_id.to_string(), ObjectError::BlobNotFound);
        return;
    };
    match blobs.copy(&request.from_account_id, &request.account_id, &blob_id) {
        Ok(()) => {
            outcome.created.insert(creation_id.to_string(), json!({"id": source_id}));
            outcome.source_ids_copied.push(source_id.to_string());
            ctx.creation_ids.add(creation_id.to_string(), source_id.to_string());
        }
        Err(BlobStoreError::SourceNotFound) => {
            outcome.not_created.insert(creation_id.to_string(), ObjectError::BlobNotFound);
        }
        Err(e) => {
            outcome
                .not_created
                .insert(creation_id.to_string(), ObjectError::invalid_property(e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::InMemoryBlobStore;
    use jmap_core::Account;
    use jmap_mailbox_cache::{LockMode, MailboxHandle, MailboxStore};
    use jmap_rights_cache::{Right, Rights, RightsSource};
    use jmap_state::ModseqTable;
    use std::collections::BTreeMap;

    struct NoMailboxes;
    impl MailboxStore for NoMailboxes {
        fn open(&self, name: &str, mode: LockMode) -> Result<MailboxHandle, MethodError> {
            Ok(MailboxHandle {
                name: name.to_string(),
                mode,
                lock_id: 0,
            })
        }
        fn commit(&self, _handle: &MailboxHandle) -> Result<(), MethodError> {
            Ok(())
        }
    }

    struct NoRights;
    impl RightsSource for NoRights {
        fn rights_for(&self, _mailbox: &str) -> Rights {
            Rights::of([Right::Lookup, Right::Read])
        }
    }

    fn accounts() -> BTreeMap<String, Account> {
        let mut m = BTreeMap::new();
        m.insert(
            "a1".to_string(),
            Account {
                id: "a1".to_string(),
                name: "Primary".to_string(),
                is_personal: true,
                is_read_only: false,
                account_capabilities: BTreeMap::new(),
            },
        );
        m.insert(
            "a2".to_string(),
            Account {
                id: "a2".to_string(),
                name: "Secondary".to_string(),
                is_personal: false,
                is_read_only: false,
                account_capabilities: BTreeMap::new(),
            },
        );
        m
    }

    #[test]
    fn blob_get_returns_size_for_an_uploaded_blob() {
        let store = NoMailboxes;
        let rights = NoRights;
        let accts = accounts();
        let modseq = ModseqTable::new();
        let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
        let id = blobs.put("a1", b"hello world").unwrap();
        let mut ctx = RequestContext::new(&store, &rights, &accts, &modseq, BTreeMap::new(), "t1");

        let args = json!({"accountId": "a1", "ids": [id.as_str()]});
        let reply = blob_get(&mut ctx, args, &blobs).unwrap();
        assert_eq!(reply["list"][0]["size"], 11);
        assert_eq!(reply["notFound"], json!([]));
    }

    #[test]
    fn blob_get_reports_unknown_ids_as_not_found() {
        let store = NoMailboxes;
        let rights = NoRights;
        let accts = accounts();
        let modseq = ModseqTable::new();
        let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
        let mut ctx = RequestContext::new(&store, &rights, &accts, &modseq, BTreeMap::new(), "t1");

        let args = json!({"accountId": "a1", "ids": ["Gnonexistentnonexistentnonexistentnone1"]});
        let reply = blob_get(&mut ctx, args, &blobs).unwrap();
        assert_eq!(reply["list"], json!([]));
        assert_eq!(reply["notFound"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn blob_get_unknown_account_is_account_not_found() {
        let store = NoMailboxes;
        let rights = NoRights;
        let accts = accounts();
        let modseq = ModseqTable::new();
        let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
        let mut ctx = RequestContext::new(&store, &rights, &accts, &modseq, BTreeMap::new(), "t1");

        let args = json!({"accountId": "bogus", "ids": []});
        let err = blob_get(&mut ctx, args, &blobs).unwrap_err();
        assert_eq!(err, MethodError::AccountNotFound);
    }

    #[test]
    fn blob_copy_with_one_failure_leaves_the_others_created_and_skips_destroy() {
        let store = NoMailboxes;
        let rights = NoRights;
        let accts = accounts();
        let modseq = ModseqTable::new();
        let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
        let ok1 = blobs.put("a1", b"one").unwrap();
        let ok2 = blobs.put("a1", b"two").unwrap();
        let mut ctx = RequestContext::new(&store, &rights, &accts, &modseq, BTreeMap::new(), "t1");

        let args = json!({
            "fromAccountId": "a1",
            "accountId": "a2",
            "create": {
                "k1": {"id": ok1.as_str()},
                "k2": {"id": ok2.as_str()},
                "k3": {"id": "Gmissingmissingmissingmissingmissingmiss"},
            },
            "onSuccessDestroyOriginal": true,
        });
        let reply = blob_copy(&mut ctx, args, &blobs).unwrap();
        assert_eq!(reply["created"].as_object().unwrap().len(), 2);
        assert_eq!(reply["notCreated"].as_object().unwrap().len(), 1);

        // Destroy was skipped (not all copies succeeded): the originals
        // that did copy successfully are still readable in the source
        // account.
        assert!(blobs.get("a1", &ok1).unwrap().is_some());
        assert!(blobs.get("a1", &ok2).unwrap().is_some());
    }

    #[test]
    fn blob_copy_all_success_with_destroy_flag_removes_the_sources() {
        let store = NoMailboxes;
        let rights = NoRights;
        let accts = accounts();
        let modseq = ModseqTable::new();
        let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
        let id = blobs.put("a1", b"single").unwrap();
        let mut ctx = RequestContext::new(&store, &rights, &accts, &modseq, BTreeMap::new(), "t1");

        let args = json!({
            "fromAccountId": "a1",
            "accountId": "a2",
            "create": {"k1": {"id": id.as_str()}},
            "onSuccessDestroyOriginal": true,
        });
        let reply = blob_copy(&mut ctx, args, &blobs).unwrap();
        assert_eq!(reply["created"].as_object().unwrap().len(), 1);
        assert_eq!(reply["notCreated"], Value::Null);

        assert!(blobs.get("a1", &id).unwrap().is_none());
        assert!(blobs.get("a2", &id).unwrap().is_some());
    }

    #[test]
    fn blob_copy_registers_each_created_id_in_the_creation_id_table() {
        let store = NoMailboxes;
        let rights = NoRights;
        let accts = accounts();
        let modseq = ModseqTable::new();
        let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
        let id = blobs.put("a1", b"single").unwrap();
        let mut ctx = RequestContext::new(&store, &rights, &accts, &modseq, BTreeMap::new(), "t1");

        let args = json!({
            "fromAccountId": "a1",
            "accountId": "a2",
            "create": {"k1": {"id": id.as_str()}},
            "onSuccessDestroyOriginal": false,
        });
        blob_copy(&mut ctx, args, &blobs).unwrap();

        assert_eq!(ctx.creation_ids.lookup("k1"), Some(id.as_str()));
    }
}
