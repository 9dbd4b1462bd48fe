// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The process-wide method registry.
//!
//! Each protocol module (mail, contacts, calendars, submission, core) calls
//! [`MethodRegistry::register`] once per method at process start. Once
//! every module has registered, the server calls [`MethodRegistry::freeze`],
//! which hands back an `Arc` shared by every request; there is no API to
//! mutate a frozen registry.
//!
//! The registry is generic over the request context type `Ctx` a handler
//! receives, so this crate carries no dependency on the dispatcher that
//! defines it.

use jmap_error::MethodError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-method flags declared at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MethodFlags(u8);

impl MethodFlags {
    /// No flags set.
    pub const NONE: MethodFlags = MethodFlags(0);

    /// The handler does not mutate account-scoped state, so the
    /// dispatcher may open a shared (read-only) conversational state for
    /// it instead of an exclusive handle.
    pub const SHARED_CSTATE: MethodFlags = MethodFlags(1 << 0);

    /// `true` if every bit set in `other` is also set in `self`.
    #[must_use]
    pub fn contains(self, other: MethodFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for MethodFlags {
    type Output = MethodFlags;
    fn bitor(self, rhs: MethodFlags) -> MethodFlags {
        MethodFlags(self.0 | rhs.0)
    }
}

/// The result of invoking a registered method handler: a JSON payload, or
/// a structured method-level error.
pub type MethodResult = Result<Value, MethodError>;

/// A registered method's implementation. Implemented automatically for
/// any matching closure or function pointer via the blanket impl below.
pub trait MethodHandler<Ctx>: Send + Sync {
    /// Handle one method call's already-back-reference-resolved
    /// arguments against the request context.
    fn call(&self, ctx: &mut Ctx, args: Value) -> MethodResult;
}

impl<Ctx, F> MethodHandler<Ctx> for F
where
    F: Fn(&mut Ctx, Value) -> MethodResult + Send + Sync,
{
    fn call(&self, ctx: &mut Ctx, args: Value) -> MethodResult {
        self(ctx, args)
    }
}

struct MethodEntry<Ctx> {
    capability: String,
    flags: MethodFlags,
    handler: Arc<dyn MethodHandler<Ctx>>,
}

/// A name-to-handler table. Build it up with [`MethodRegistry::register`]
/// during startup, then call [`MethodRegistry::freeze`] once; every
/// request dispatch afterwards only reads from the returned `Arc`.
pub struct MethodRegistry<Ctx> {
    methods: BTreeMap<String, MethodEntry<Ctx>>,
    frozen: bool,
}

impl<Ctx> Default for MethodRegistry<Ctx> {
    fn default() -> Self {
        Self {
            methods: BTreeMap::new(),
            frozen: false,
        }
    }
}

impl<Ctx> MethodRegistry<Ctx> {
    /// An empty, mutable registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` under `capability_uri` with the given `flags`.
    ///
    /// # Panics
    ///
    /// Panics if called after [`MethodRegistry::freeze`] — registration is
    /// a startup-only operation, and calling it late is a programming
    /// error in the protocol module, not a runtime condition to recover
    /// from.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        capability_uri: impl Into<String>,
        flags: MethodFlags,
        handler: impl MethodHandler<Ctx> + 'static,
    ) {
        assert!(!self.frozen, "cannot register a method on a frozen registry");
        self.methods.insert(
            name.into(),
            MethodEntry {
                capability: capability_uri.into(),
                flags,
                handler: Arc::new(handler),
            },
        );
    }

    /// Freeze the registry, consuming it, and return a shared handle every
    /// request dispatch can clone cheaply.
    #[must_use]
    pub fn freeze(mut self) -> Arc<Self> {
        self.frozen = true;
        Arc::new(self)
    }

    /// The capability URI that declares `name`, if registered.
    #[must_use]
    pub fn capability_of(&self, name: &str) -> Option<&str> {
        self.methods.get(name).map(|e| e.capability.as_str())
    }

    /// The flags `name` was registered with, if registered.
    #[must_use]
    pub fn flags_of(&self, name: &str) -> Option<MethodFlags> {
        self.methods.get(name).map(|e| e.flags)
    }

    /// `true` if a method is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Every registered method name, in sorted order.
    #[must_use]
    pub fn method_names(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }

    /// Invoke the handler registered under `name`, if any.
    ///
    /// Returns `None` for an unregistered name so the dispatcher can
    /// distinguish "no such method" from a handler-level error.
    pub fn dispatch(&self, name: &str, ctx: &mut Ctx, args: Value) -> Option<MethodResult> {
        self.methods.get(name).map(|e| e.handler.call(ctx, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Ctx {
        echoed: u32,
    }

    fn echo(ctx: &mut Ctx, args: Value) -> MethodResult {
        ctx.echoed += 1;
        Ok(args)
    }

    #[test]
    fn register_then_dispatch_invokes_the_handler() {
        let mut registry: MethodRegistry<Ctx> = MethodRegistry::new();
        registry.register("Core/echo", "urn:ietf:params:jmap:core", MethodFlags::NONE, echo);
        let registry = registry.freeze();

        let mut ctx = Ctx { echoed: 0 };
        let result = registry.dispatch("Core/echo", &mut ctx, json!({"a": 1})).unwrap();
        assert_eq!(result.unwrap(), json!({"a": 1}));
        assert_eq!(ctx.echoed, 1);
    }

    #[test]
    fn dispatching_an_unknown_method_returns_none() {
        let registry: MethodRegistry<Ctx> = MethodRegistry::new().freeze();
        let mut ctx = Ctx { echoed: 0 };
        assert!(registry.dispatch("Nope/nope", &mut ctx, json!({})).is_none());
    }

    #[test]
    fn capability_and_flags_are_recorded() {
        let mut registry: MethodRegistry<Ctx> = MethodRegistry::new();
        registry.register(
            "Core/echo",
            "urn:ietf:params:jmap:core",
            MethodFlags::SHARED_CSTATE,
            echo,
        );
        assert_eq!(registry.capability_of("Core/echo"), Some("urn:ietf:params:jmap:core"));
        assert!(registry.flags_of("Core/echo").unwrap().contains(MethodFlags::SHARED_CSTATE));
    }

    #[test]
    #[should_panic(expected = "frozen")]
    fn registering_after_freeze_panics() {
        let mut registry: MethodRegistry<Ctx> = MethodRegistry::new();
        registry.register("Core/echo", "urn:ietf:params:jmap:core", MethodFlags::NONE, echo);
        registry.frozen = true;
        registry.register("Core/echo", "urn:ietf:params:jmap:core", MethodFlags::NONE, echo);
    }

    #[test]
    fn method_names_lists_every_registered_method_sorted() {
        let mut registry: MethodRegistry<Ctx> = MethodRegistry::new();
        registry.register("Z/z", "urn:z", MethodFlags::NONE, echo);
        registry.register("A/a", "urn:a", MethodFlags::NONE, echo);
        assert_eq!(registry.method_names(), vec!["A/a", "Z/z"]);
    }
}
