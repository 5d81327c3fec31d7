//! # arbor-policy
//!
//! The policy resolver: computes which funcsets and functions a branch or a
//! user can see, by combining branch whitelist inheritance with
//! nearest-definition-wins role lookup.
//!
//! This crate is pure computation over [`arbor_store`] documents — it never
//! mutates or persists anything.

pub mod resolver;

pub use resolver::{effective_funcsets, nearest_role, user_function_ids, user_funcsets};

// ── Tests ─────────────────────────────────────────────────────────────────────
