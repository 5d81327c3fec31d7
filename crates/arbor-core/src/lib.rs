//! # arbor-core
//!
//! The domain layer of the arbor authorization server: every operation a
//! transport can invoke lives here, as a method on [`keeper::DataKeeper`].
//!
//! ## Overview
//!
//! - [`keeper`] — the [`keeper::DataKeeper`]: owns the loaded documents and
//!   the agent registry, persists after every mutation, and is shared behind
//!   one mutex ([`keeper::SharedKeeper`]).
//! - [`branches`] — branch tree structure, roles, position slots,
//!   whitelists, review queries.
//! - [`catalog`] — funcsets and the function catalogue.
//! - [`people`] — registration, authorization, hire/fire.
//! - [`resolve`] — read-only policy exposures (what a user or branch sees).
//! - [`agents`] — agent registration over the SQLite registry.
//! - [`config`] — server configuration.
//!
//! Every operation returns [`arbor_contracts::OpResult`]; failures carry a
//! reason from the fixed vocabulary plus operation-specific details.

pub mod agents;
pub mod branches;
pub mod catalog;
pub mod config;
pub mod keeper;
pub mod people;
pub mod resolve;

pub use agents::{AgentDetails, AgentSpec, ROOT_SENTINEL};
pub use branches::{
    BranchVacancies, PositionCounts, PositionView, RoleAt, StaffingCount, StaffingReport,
    WhitelistView,
};
pub use catalog::{ChangeStatus, FuncsetDetails, FunctionChange};
pub use config::{ConfigError, ServerConfig, DEFAULT_SESSION_MAX};
pub use keeper::{DataKeeper, OpenError, SharedKeeper, AGENTS_FILE, CATALOG_FILE, ORG_FILE};
pub use people::{FiredFrom, RegistrationDetails, SecretStamp};

// ── Tests ─────────────────────────────────────────────────────────────────────
