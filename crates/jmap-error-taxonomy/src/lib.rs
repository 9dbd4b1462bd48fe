// SPDX-License-Identifier: MIT OR Apache-2.0
//! This crate has no public API of its own. It exists to hold the deep
//! conformance suite in `tests/taxonomy_tests.rs` that exercises
//! `jmap-error`'s wire shapes as an external consumer would.
