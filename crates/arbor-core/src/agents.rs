//! Agent bookkeeping over the SQLite registry, with the tree-side rules:
//! agents belong to existing branches, and a relocation may only move an
//! agent downward within its current branch's subtree.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use arbor_agents::AgentRecord;
use arbor_contracts::{require_ident, split_tags, OpError, OpResult, Reason};

use crate::keeper::{agent_unknown, branch_unknown, db_error, DataKeeper};

/// Callers may name the first root branch without knowing its id.
pub const ROOT_SENTINEL: &str = "*ROOT*";

/// Descriptive payload accompanying a registration.
#[derive(Debug, Clone, Default)]
pub struct AgentSpec {
    pub descr: String,
    pub location: String,
    /// Comma-joined tag set; normalized on the way in.
    pub tags: String,
    /// Free-form XML fragment; must be well-formed.
    pub extra: String,
}

/// A full agent record as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentDetails {
    pub agent_id: String,
    pub branch: String,
    pub descr: String,
    pub location: String,
    /// Canonical comma-joined tag set.
    pub tags: String,
    pub extra: String,
}

/// Reject `extra` payloads that are not a well-formed XML fragment. The
/// fragment is checked wrapped in a synthetic root, so multiple top-level
/// elements and bare text are both fine.
pub(crate) fn validate_xml_fragment(extra: &str) -> OpResult<()> {
    if extra.is_empty() {
        return Ok(());
    }
    let wrapped = format!("<extra>{extra}</extra>");
    let mut reader = quick_xml::Reader::from_str(&wrapped);
    reader.config_mut().check_end_names = true;
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Eof) => return Ok(()),
            Ok(_) => {}
            Err(err) => {
                return Err(OpError::new(
                    Reason::WrongFormat,
                    format!("extra is not well-formed XML: {err}"),
                ));
            }
        }
    }
}

impl DataKeeper {
    /// Resolve the `*ROOT*` sentinel to the first root branch.
    fn resolve_branch_sentinel(&self, branch: &str) -> OpResult<String> {
        if branch == ROOT_SENTINEL {
            self.org
                .tree
                .first_root()
                .map(str::to_string)
                .ok_or_else(|| OpError::new(Reason::BranchUnknown, "No root branch exists"))
        } else {
            Ok(branch.to_string())
        }
    }

    /// Register an agent in a branch, or — with `move_existing` — relocate a
    /// registered agent, replacing its whole record. Relocation targets must
    /// lie in the subtree of the agent's current branch.
    pub fn register_agent(
        &mut self,
        branch: &str,
        agent: &str,
        move_existing: bool,
        spec: &AgentSpec,
    ) -> OpResult<()> {
        require_ident(agent, "agent_id")?;
        let branch = self.resolve_branch_sentinel(branch)?;
        require_ident(&branch, "branch_id")?;
        validate_xml_fragment(&spec.extra)?;

        let current = self.agents.get(agent, false).map_err(db_error)?;
        if move_existing {
            let Some(current) = current else {
                return Err(OpError::new(
                    Reason::AgentUnknown,
                    format!("Agent {agent:?} is not registered, nothing to move"),
                )
                .detail("bad_value", Value::String(agent.to_string())));
            };
            if !self.org.tree.contains(&current.branch) {
                return Err(db_error(format!(
                    "agent {agent:?} is anchored to unknown branch {:?}",
                    current.branch
                )));
            }
            if !self.org.tree.in_subtree(&current.branch, &branch) {
                return Err(OpError::new(
                    Reason::NotInSet,
                    format!(
                        "Branch {branch:?} is not in the subtree of {:?}",
                        current.branch
                    ),
                )
                .detail("bad_value", Value::String(branch.clone())));
            }
            self.agents.delete(agent).map_err(db_error)?;
        } else {
            if let Some(current) = current {
                return Err(OpError::new(
                    Reason::AlreadyExists,
                    format!(
                        "Agent {agent:?} is already registered in branch {:?}",
                        current.branch
                    ),
                )
                .detail("bad_value", Value::String(agent.to_string())));
            }
            if !self.org.tree.contains(&branch) {
                return Err(branch_unknown(&branch));
            }
        }

        let tags: Vec<String> = split_tags(&spec.tags).into_iter().collect();
        self.agents
            .add(&AgentRecord {
                id: agent.to_string(),
                branch: branch.clone(),
                descr: spec.descr.clone(),
                location: spec.location.clone(),
                extra: spec.extra.clone(),
                tags,
            })
            .map_err(db_error)?;
        info!(agent, branch = %branch, moved = move_existing, "agent registered");
        Ok(())
    }

    /// Drop an agent and its tags.
    pub fn unregister_agent(&mut self, agent: &str) -> OpResult<()> {
        require_ident(agent, "agent_id")?;
        if !self.agents.delete(agent).map_err(db_error)? {
            return Err(agent_unknown(agent));
        }
        info!(agent, "agent unregistered");
        Ok(())
    }

    pub fn agent_details(&self, agent: &str) -> OpResult<AgentDetails> {
        require_ident(agent, "agent_id")?;
        let record = self
            .agents
            .get(agent, true)
            .map_err(db_error)?
            .ok_or_else(|| agent_unknown(agent))?;
        Ok(AgentDetails {
            agent_id: record.id,
            branch: record.branch,
            descr: record.descr,
            location: record.location,
            tags: record.tags.join(","),
            extra: record.extra,
        })
    }

    /// Every registered agent id, sorted.
    pub fn list_agent_ids(&self) -> OpResult<Vec<String>> {
        let mut ids = self.agents.all_agent_ids().map_err(db_error)?;
        ids.sort();
        Ok(ids)
    }

    /// The branches strictly below an agent's owning branch, preorder.
    pub fn agent_subbranches(&self, agent: &str) -> OpResult<Vec<String>> {
        require_ident(agent, "agent_id")?;
        let branch = self
            .agents
            .branch_of(agent)
            .map_err(db_error)?
            .ok_or_else(|| agent_unknown(agent))?;
        Ok(self
            .org
            .tree
            .subtree_ids(&branch)
            .into_iter()
            .filter(|b| *b != branch)
            .collect())
    }

    /// Agent ids owned by a branch (or, with no branch given, by the root
    /// branches), including subtree owners with `with_subsidiaries`. Sorted.
    pub fn list_agents(&self, branch: Option<&str>, with_subsidiaries: bool) -> OpResult<Vec<String>> {
        Ok(self
            .located_agents(branch, with_subsidiaries)?
            .into_iter()
            .map(|(agent, _)| agent)
            .collect())
    }

    /// Like [`list_agents`](Self::list_agents), with each agent's owning
    /// branch alongside.
    pub fn list_agents_located(
        &self,
        branch: Option<&str>,
        with_subsidiaries: bool,
    ) -> OpResult<Vec<(String, String)>> {
        self.located_agents(branch, with_subsidiaries)
    }

    fn located_agents(
        &self,
        branch: Option<&str>,
        with_subsidiaries: bool,
    ) -> OpResult<Vec<(String, String)>> {
        let seeds: Vec<String> = match branch {
            None => self.org.tree.roots().to_vec(),
            Some(b) => {
                require_ident(b, "branch_id")?;
                vec![b.to_string()]
            }
        };
        let mut branches: Vec<String> = Vec::new();
        for seed in seeds {
            if with_subsidiaries {
                branches.extend(self.org.tree.subtree_ids(&seed));
            } else if self.org.tree.contains(&seed) {
                branches.push(seed);
            }
        }
        let mut pairs = self.agents.by_branches(&branches).map_err(db_error)?;
        pairs.sort();
        Ok(pairs)
    }
}
