// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Capability-URI bookkeeping for the JMAP dispatcher.
//!
//! A capability is an advertised feature identifier (e.g.
//! `urn:ietf:params:jmap:mail`). The dispatcher needs two things from this
//! crate: a process-wide table of which capability URI each method name
//! belongs to, and a negotiation check of whether a request's `using` array
//! actually authorizes calling that method — per §4.1 step 5b of the core
//! specification.

use jmap_error::TopLevelError;
use std::collections::{BTreeMap, BTreeSet};

/// The well-known capability URIs this workspace is aware of. Vendor
/// extensions (e.g. quota) are represented as plain strings elsewhere and
/// do not need a variant here.
pub mod uri {
    /// `urn:ietf:params:jmap:core`
    pub const CORE: &str = "urn:ietf:params:jmap:core";
    /// `urn:ietf:params:jmap:mail`
    pub const MAIL: &str = "urn:ietf:params:jmap:mail";
    /// `urn:ietf:params:jmap:submission`
    pub const SUBMISSION: &str = "urn:ietf:params:jmap:submission";
    /// `urn:ietf:params:jmap:vacationresponse`
    pub const VACATION_RESPONSE: &str = "urn:ietf:params:jmap:vacationresponse";
    /// `urn:ietf:params:jmap:contacts`
    pub const CONTACTS: &str = "urn:ietf:params:jmap:contacts";
    /// `urn:ietf:params:jmap:calendars`
    pub const CALENDARS: &str = "urn:ietf:params:jmap:calendars";
    /// `urn:ietf:params:jmap:websocket`
    pub const WEBSOCKET: &str = "urn:ietf:params:jmap:websocket";
    /// `http://cyrusimap.org/ns/quota` — vendor extension.
    pub const QUOTA: &str = "http://cyrusimap.org/ns/quota";
}

/// A table from method name to the capability URI that declares it.
///
/// Populated once at process start by each protocol module (mail, contacts,
/// calendars, submission, core) alongside `jmap-registry`'s handler table;
/// the two tables are always built together but kept separate so that
/// capability negotiation (pure string-set logic) has no dependency on the
/// registry's handler trait objects.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    method_capability: BTreeMap<String, String>,
    advertised: BTreeSet<String>,
}

impl CapabilityTable {
    /// An empty table with no capabilities advertised yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `capability_uri` is advertised by this server, with no
    /// methods registered under it yet.
    pub fn advertise(&mut self, capability_uri: impl Into<String>) {
        self.advertised.insert(capability_uri.into());
    }

    /// Associate `method_name` with `capability_uri`, advertising the
    /// capability if it was not already.
    pub fn declare_method(&mut self, method_name: impl Into<String>, capability_uri: impl Into<String>) {
        let capability_uri = capability_uri.into();
        self.advertised.insert(capability_uri.clone());
        self.method_capability.insert(method_name.into(), capability_uri);
    }

    /// The capability URI that owns `method_name`, if registered.
    #[must_use]
    pub fn capability_of(&self, method_name: &str) -> Option<&str> {
        self.method_capability.get(method_name).map(String::as_str)
    }

    /// All capability URIs this server advertises, registered methods or not.
    #[must_use]
    pub fn advertised(&self) -> &BTreeSet<String> {
        &self.advertised
    }

    /// Validate a request's `using` array: every entry must be one of the
    /// advertised capabilities. Returns the set on success so callers don't
    /// need to re-walk the `Vec`.
    ///
    /// # Errors
    ///
    /// Returns [`TopLevelError::UnknownCapability`] naming the first
    /// unrecognized URI.
    pub fn negotiate<'a, I>(&self, using: I) -> Result<BTreeSet<String>, TopLevelError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut set = BTreeSet::new();
        for uri in using {
            if !self.advertised.contains(uri) {
                return Err(TopLevelError::unknown_capability(uri.clone()));
            }
            set.insert(uri.clone());
        }
        Ok(set)
    }

    /// Returns `true` if `method_name`'s declaring capability is present in
    /// `using` — the §4.1 step 5b check. A method with no declared
    /// capability (i.e. unregistered) is never found here.
    #[must_use]
    pub fn method_is_authorized(&self, method_name: &str, using: &BTreeSet<String>) -> bool {
        self.capability_of(method_name)
            .is_some_and(|cap| using.contains(cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> CapabilityTable {
        let mut t = CapabilityTable::new();
        t.declare_method("Core/echo", uri::CORE);
        t.declare_method("Blob/get", uri::CORE);
        t.declare_method("Email/get", uri::MAIL);
        t
    }

    #[test]
    fn negotiate_accepts_advertised_capabilities_only() {
        let t = sample_table();
        let using = vec![uri::CORE.to_string(), uri::MAIL.to_string()];
        assert!(t.negotiate(using.iter()).is_ok());
    }

    #[test]
    fn negotiate_rejects_unknown_capability() {
        let t = sample_table();
        let using = vec!["urn:x:bogus".to_string()];
        let err = t.negotiate(using.iter()).unwrap_err();
        assert_eq!(
            err,
            TopLevelError::unknown_capability("urn:x:bogus".to_string())
        );
    }

    #[test]
    fn method_is_authorized_requires_capability_in_using() {
        let t = sample_table();
        let mut using = BTreeSet::new();
        using.insert(uri::CORE.to_string());
        assert!(t.method_is_authorized("Core/echo", &using));
        assert!(!t.method_is_authorized("Email/get", &using));
        assert!(!t.method_is_authorized("Unknown/method", &using));
    }
}
