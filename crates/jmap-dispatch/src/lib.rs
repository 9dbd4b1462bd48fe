// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The JMAP request dispatcher.
//!
//! [`dispatch`] turns one parsed [`Request`] envelope into a [`Response`],
//! implementing the core specification's six-step sequence: a size gate,
//! envelope validation and capability negotiation, a call-count gate,
//! per-request context allocation, a per-call loop (name lookup,
//! capability check, back-reference resolution, creation-id substitution,
//! handler invocation, and deferred sub-call draining), and teardown.
//!
//! This crate does not itself know how to frame HTTP requests or parse
//! method arguments — `jmap-protocol` and `jmap-parser` own those. It only
//! owns the control flow that turns a batch of calls into a batch of
//! responses in the right order, with the right error at each tier.

use jmap_capability::CapabilityTable;
use jmap_core::{Account, BackReference, MethodCall, MethodResponse, Request, Response};
use jmap_creation_ids::CreationIdTable;
use jmap_error::{MethodError, TopLevelError, method_error_response};
use jmap_limits::Limits;
use jmap_mailbox_cache::{MailboxCache, MailboxStore};
use jmap_registry::MethodRegistry;
use jmap_rights_cache::{RightsCache, RightsSource};
use jmap_state::ModseqTable;
use jmap_telemetry::RequestTimers;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Instant;
use tracing::{debug, info_span, warn};

/// Everything a method handler can touch while servicing one request:
/// the open-mailbox cache, the rights memoization table, the creation-id
/// table, the account directory, the shared per-type modseq table, and a
/// queue of sub-calls the handler wants the dispatcher to run next.
///
/// Built once per request by [`dispatch`] and torn down at the end of it.
pub struct RequestContext<'s> {
    /// Per-request cache of open mailbox handles.
    pub mailbox: MailboxCache<'s>,
    /// Per-request memoization of ACL rights lookups.
    pub rights: RightsCache,
    rights_source: &'s dyn RightsSource,
    /// Client-supplied and server-assigned creation ids for this request.
    pub creation_ids: CreationIdTable,
    accounts: &'s BTreeMap<String, Account>,
    /// Shared per-type modification-sequence counters.
    pub modseq: &'s ModseqTable,
    deferred: VecDeque<MethodCall>,
    timers: RequestTimers,
}

impl<'s> RequestContext<'s> {
    /// Build a fresh context for one request, tagged with `request_id` for
    /// the `tracing` span its [`RequestTimers`] carries.
    #[must_use]
    pub fn new(
        mailbox_store: &'s dyn MailboxStore,
        rights_source: &'s dyn RightsSource,
        accounts: &'s BTreeMap<String, Account>,
        modseq: &'s ModseqTable,
        created_ids: BTreeMap<String, String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            mailbox: MailboxCache::new(mailbox_store),
            rights: RightsCache::new(),
            rights_source,
            creation_ids: CreationIdTable::seeded(created_ids),
            accounts,
            modseq,
            deferred: VecDeque::new(),
            timers: RequestTimers::start(request_id),
        }
    }

    /// Look up an account the caller may address, by id.
    #[must_use]
    pub fn account(&self, account_id: &str) -> Option<&Account> {
        self.accounts.get(account_id)
    }

    /// The rights source this context was built with, for handlers that
    /// need to pass it through to [`RightsCache::rights`] directly.
    #[must_use]
    pub fn rights_source(&self) -> &'s dyn RightsSource {
        self.rights_source
    }

    /// Queue `call` to run immediately after the method call currently
    /// executing finishes, and before the next call in the original
    /// request — the §4.1 "deferred sub-call" mechanism used by e.g.
    /// `Foo/copy`'s `onSuccessDestroyOriginal`.
    pub fn schedule_sub_call(&mut self, call: MethodCall) {
        self.deferred.push_back(call);
    }

    fn pop_deferred(&mut self) -> Option<MethodCall> {
        self.deferred.pop_front()
    }

    /// Consume the context, committing every cached mailbox handle and
    /// returning the final creation-id snapshot for the response envelope.
    ///
    /// Mailbox commit failures are logged and otherwise swallowed: the
    /// method responses are already final by the time teardown runs, and
    /// a best-effort commit matches [`MailboxCache::teardown`]'s own
    /// contract.
    fn teardown(self) -> BTreeMap<String, String> {
        if let Err(e) = self.mailbox.teardown() {
            warn!(error = ?e, "mailbox teardown reported a commit failure");
        }
        self.timers.finish();
        self.creation_ids.snapshot()
    }
}

/// Dispatch one Request envelope to completion.
///
/// `wire_size` is the serialized byte length of the envelope as received,
/// used for the size gate; callers that already parsed the body (rather
/// than holding the raw bytes) can pass `request`'s re-serialized length.
/// `session_state` is the Session resource's current state token, echoed
/// back unchanged in the response per §3.3.
///
/// # Errors
///
/// Returns [`TopLevelError`] when the whole envelope is rejected: an
/// oversized body, an unrecognized `using` capability, an empty `using`
/// or `methodCalls` array, or too many method calls. A per-call failure
/// never reaches here — it is folded into that call's `["error", ...]`
/// response instead.
pub fn dispatch(
    request: Request,
    wire_size: u64,
    session_state: impl Into<String>,
    limits: &Limits,
    capabilities: &CapabilityTable,
    registry: &MethodRegistry<RequestContext<'_>>,
    mut ctx: RequestContext<'_>,
) -> Result<Response, TopLevelError> {
    let _span = info_span!("jmap_request", method_calls = request.method_calls.len()).entered();

    limits.check_request_size(wire_size)?;

    if request.using.is_empty() {
        return Err(TopLevelError::NotRequest {
            detail: Some("`using` must be a non-empty array".to_string()),
        });
    }
    if request.method_calls.is_empty() {
        return Err(TopLevelError::NotRequest {
            detail: Some("`methodCalls` must be a non-empty array".to_string()),
        });
    }
    let using = capabilities.negotiate(request.using.iter())?;

    limits.check_call_count(request.method_calls.len() as u64)?;

    if let Some(seed) = &request.created_ids {
        for (creation_id, server_id) in seed {
            ctx.creation_ids.add(creation_id.clone(), server_id.clone());
        }
    }

    let mut method_responses = Vec::new();
    for call in request.method_calls {
        time_one_call(call, &using, registry, &mut ctx, &mut method_responses);
        while let Some(sub_call) = ctx.pop_deferred() {
            time_one_call(sub_call, &using, registry, &mut ctx, &mut method_responses);
        }
    }

    let created_ids = ctx.teardown();

    Ok(Response {
        method_responses,
        created_ids,
        session_state: session_state.into(),
    })
}

/// Time and process one method call, recording its duration against
/// `ctx`'s [`RequestTimers`]. `call.name()` is captured up front since
/// [`process_call`] consumes `call`.
fn time_one_call(
    call: MethodCall,
    using: &BTreeSet<String>,
    registry: &MethodRegistry<RequestContext<'_>>,
    ctx: &mut RequestContext<'_>,
    out: &mut Vec<MethodResponse>,
) {
    let name = call.name().to_string();
    let start = Instant::now();
    process_call(call, using, registry, ctx, out);
    ctx.timers.record_call(&name, start.elapsed().as_millis() as u64);
}

/// Process one method call (original or deferred) to completion, pushing
/// exactly one [`MethodResponse`] onto `out`.
fn process_call(
    call: MethodCall,
    using: &BTreeSet<String>,
    registry: &MethodRegistry<RequestContext<'_>>,
    ctx: &mut RequestContext<'_>,
    out: &mut Vec<MethodResponse>,
) {
    let name = call.name().to_string();
    let client_id = call.client_id().to_string();
    let account_id = call.arguments().get("accountId").and_then(Value::as_str).map(str::to_string);
    let _span = info_span!("jmap_method_call", method = %name, client_id = %client_id, account_id).entered();

    if !registry.contains(&name) {
        debug!("unknown method");
        out.push(error_response(MethodError::UnknownMethod, &client_id));
        return;
    }

    if !capability_is_authorized(registry, &name, using) {
        debug!("method not advertised by any capability in `using`");
        out.push(error_response(MethodError::MethodNotFound, &client_id));
        return;
    }

    let resolved_args = match resolve_back_references(call.arguments().clone(), out) {
        Ok(args) => args,
        Err(e) => {
            out.push(error_response(e, &client_id));
            return;
        }
    };
    let resolved_args = ctx.creation_ids.substitute_in(resolved_args);

    let result = registry
        .dispatch(&name, ctx, resolved_args)
        .expect("presence already checked above");

    match result {
        Ok(payload) => out.push(MethodResponse::ok(name, payload, client_id)),
        Err(e) => out.push(error_response(e, &client_id)),
    }
}

fn capability_is_authorized(registry: &MethodRegistry<RequestContext<'_>>, name: &str, using: &BTreeSet<String>) -> bool {
    registry.capability_of(name).is_some_and(|cap| using.contains(cap))
}

fn error_response(error: MethodError, client_id: &str) -> MethodResponse {
    let triple = method_error_response(&error, client_id);
    MethodResponse::error(triple[1].clone(), client_id.to_string())
}

/// Walk `args`' top-level properties, replacing every `#`-prefixed key
/// with its stripped name and a value resolved from an earlier response
/// in `already_emitted` matching the back-reference's `resultOf`/`name`.
///
/// Non-object `args` (malformed, but not this function's job to reject)
/// pass through unchanged; handler-level argument parsing will reject it.
fn resolve_back_references(args: Value, already_emitted: &[MethodResponse]) -> Result<Value, MethodError> {
    let Value::Object(obj) = args else {
        return Ok(args);
    };

    let mut out = serde_json::Map::new();
    for (key, value) in obj {
        if jmap_core::is_back_reference_key(&key) {
            let back_ref: BackReference =
                serde_json::from_value(value).map_err(|_| MethodError::InvalidResultReference)?;
            let resolved = resolve_one_back_reference(&back_ref, already_emitted)?;
            out.insert(jmap_core::strip_back_reference_prefix(&key).to_string(), resolved);
        } else {
            out.insert(key, value);
        }
    }
    Ok(Value::Object(out))
}

fn resolve_one_back_reference(back_ref: &BackReference, already_emitted: &[MethodResponse]) -> Result<Value, MethodError> {
    let matching = already_emitted
        .iter()
        .find(|response| response.2 == back_ref.result_of && response.0 == back_ref.name)
        .ok_or(MethodError::InvalidResultReference)?;
    matching
        .1
        .pointer(&back_ref.path)
        .cloned()
        .ok_or(MethodError::InvalidResultReference)
}
