//! The data keeper: single owner of the loaded documents and the agent
//! registry, through which every domain operation runs.
//!
//! The keeper holds the whole state in memory and persists the affected
//! document synchronously at the end of every mutation, so a crash never
//! loses an acknowledged change. Concurrent callers share the keeper behind
//! one mutex ([`SharedKeeper`]) — the documents are small and operations are
//! short, so a single lock is the whole concurrency story.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::info;

use arbor_agents::{AgentRegistry, RegistryError};
use arbor_contracts::{OpError, OpResult, Reason};
use arbor_store::{Branch, CatalogDocument, DocumentFile, OrgDocument, Person, StoreError};

use crate::config::ServerConfig;

/// File names inside the data directory.
pub const ORG_FILE: &str = "universe.xml";
pub const CATALOG_FILE: &str = "catalogues.xml";
pub const AGENTS_FILE: &str = "agents.db";

/// Startup failures. Any of these is fatal — the keeper never serves from
/// partially loaded state.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// The in-memory state of the server plus its persistence handles.
pub struct DataKeeper {
    pub(crate) org: OrgDocument,
    pub(crate) catalog: CatalogDocument,
    org_file: DocumentFile,
    catalog_file: DocumentFile,
    pub(crate) agents: AgentRegistry,
    pub(crate) default_session_max: u32,
}

/// The keeper as shared by a transport layer: one lock over everything.
pub type SharedKeeper = Arc<Mutex<DataKeeper>>;

impl DataKeeper {
    /// Load both documents and open the agent registry.
    pub fn open(config: &ServerConfig) -> Result<Self, OpenError> {
        let org_file = DocumentFile::new(config.data_dir.join(ORG_FILE));
        let catalog_file = DocumentFile::new(config.data_dir.join(CATALOG_FILE));
        let org = OrgDocument::load(&org_file)?;
        let catalog = CatalogDocument::load(&catalog_file)?;
        let agents = AgentRegistry::open(&config.data_dir.join(AGENTS_FILE))?;
        info!(data_dir = %config.data_dir.display(), "data keeper ready");
        Ok(Self {
            org,
            catalog,
            org_file,
            catalog_file,
            agents,
            default_session_max: config.default_session_max,
        })
    }

    pub fn into_shared(self) -> SharedKeeper {
        Arc::new(Mutex::new(self))
    }

    pub fn org(&self) -> &OrgDocument {
        &self.org
    }

    pub fn catalog(&self) -> &CatalogDocument {
        &self.catalog
    }

    /// Current time as unix seconds.
    pub(crate) fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    pub(crate) fn persist_org(&self) -> OpResult<()> {
        self.org.save(&self.org_file).map_err(db_error)
    }

    pub(crate) fn persist_catalog(&self) -> OpResult<()> {
        self.catalog.save(&self.catalog_file).map_err(db_error)
    }

    /// Sanitized lookup of an existing branch.
    pub(crate) fn branch_checked(&self, id: &str, what: &str) -> OpResult<&Branch> {
        arbor_contracts::require_ident(id, what)?;
        self.org.tree.branch(id).ok_or_else(|| branch_unknown(id))
    }

    /// Mutable variant of [`branch_checked`](Self::branch_checked).
    pub(crate) fn branch_mut_checked(&mut self, id: &str, what: &str) -> OpResult<&mut Branch> {
        arbor_contracts::require_ident(id, what)?;
        self.org.tree.branch_mut(id).ok_or_else(|| branch_unknown(id))
    }

    /// Sanitized lookup of a registered operator.
    pub(crate) fn operator_checked(&self, op_id: &str) -> OpResult<&Person> {
        arbor_contracts::require_ident(op_id, "op_id")?;
        self.org.person(op_id).ok_or_else(|| {
            OpError::new(
                Reason::OpUnknown,
                format!("Operator {op_id:?} is not registered"),
            )
            .detail("bad_value", Value::String(op_id.to_string()))
        })
    }

    /// The branch the operator manages from (their employing branch).
    /// Operators employed nowhere have no standing over any branch.
    pub(crate) fn operator_branch(&self, op_id: &str) -> OpResult<String> {
        self.operator_checked(op_id)?;
        self.org
            .tree
            .employment_of(op_id)
            .map(|(branch, _)| branch)
            .ok_or_else(|| {
                OpError::new(
                    Reason::ForbiddenForOp,
                    format!("Operator {op_id:?} is not employed anywhere"),
                )
            })
    }
}

/// Internal storage failures surface as one opaque reason.
pub(crate) fn db_error(err: impl std::fmt::Display) -> OpError {
    OpError::new(Reason::DatabaseError, err.to_string())
}

pub(crate) fn branch_unknown(id: &str) -> OpError {
    OpError::new(Reason::BranchUnknown, format!("Branch {id:?} is unknown"))
        .detail("bad_value", Value::String(id.to_string()))
}

pub(crate) fn user_unknown(id: &str) -> OpError {
    OpError::new(Reason::UserUnknown, format!("User {id:?} is not registered"))
        .detail("bad_value", Value::String(id.to_string()))
}

pub(crate) fn funcset_unknown(id: &str) -> OpError {
    OpError::new(Reason::FuncsetUnknown, format!("Funcset {id:?} is not defined"))
        .detail("bad_value", Value::String(id.to_string()))
}

pub(crate) fn function_unknown(id: &str) -> OpError {
    OpError::new(
        Reason::FunctionUnknown,
        format!("Function {id:?} is not in the catalogue"),
    )
    .detail("bad_value", Value::String(id.to_string()))
}

pub(crate) fn agent_unknown(id: &str) -> OpError {
    OpError::new(Reason::AgentUnknown, format!("Agent {id:?} is not registered"))
        .detail("bad_value", Value::String(id.to_string()))
}

pub(crate) fn role_unknown(branch: &str, role: &str) -> OpError {
    OpError::new(
        Reason::RoleUnknown,
        format!("Role {role:?} is not defined in branch {branch:?}"),
    )
    .detail("bad_value", Value::String(role.to_string()))
}
