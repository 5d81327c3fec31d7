//! Operations on the branch tree: structure, roles, position slots and
//! whitelists, plus the review queries over them.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use arbor_contracts::{require_ident, require_safe, OpError, OpResult, Reason};
use arbor_store::{Branch, Role, Slot, WhiteList};

use crate::keeper::{db_error, role_unknown, DataKeeper};

/// Slot statistics for one role name at one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionCounts {
    pub branch: String,
    pub pos: String,
    pub total: usize,
    pub vacant: usize,
}

/// One branch whitelist as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhitelistView {
    pub branch: String,
    pub funcsets: Vec<String>,
    pub propagate_parent_flag: bool,
}

/// A role name together with the branch whose definition is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleAt {
    pub role: String,
    pub branch: String,
}

/// One branch with its currently vacant position names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchVacancies {
    pub branch: String,
    pub vacancies: Vec<String>,
}

/// One position slot in a review listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionView {
    pub pos: String,
    pub branch: String,
    pub vacant: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffingCount {
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffingReport {
    pub branch_filter: String,
    pub only_vacant: bool,
    pub report: Vec<StaffingCount>,
}

impl DataKeeper {
    // ── Tree structure ────────────────────────────────────────────────────────

    /// Create an empty sub-branch under an existing branch. Branch ids are
    /// globally unique, not merely unique among siblings.
    pub fn create_sub_branch(&mut self, parent: &str, sub: &str) -> OpResult<()> {
        self.branch_checked(parent, "branch_id")?;
        require_ident(sub, "sub_branch_id")?;
        if self.org.tree.contains(sub) {
            return Err(OpError::new(
                Reason::AlreadyExists,
                format!("Branch {sub:?} already exists"),
            )
            .detail("bad_value", Value::String(sub.to_string())));
        }
        self.org
            .tree
            .attach(Some(parent), Branch::empty(sub))
            .map_err(db_error)?;
        info!(parent, sub, "sub-branch created");
        self.persist_org()
    }

    /// Delete a branch and its whole subtree. Roots are permanent, and a
    /// subtree with anyone employed in it cannot go — the failure carries the
    /// occupants under `fire_them`.
    pub fn delete_branch(&mut self, branch: &str) -> OpResult<()> {
        let node = self.branch_checked(branch, "branch_id")?;
        if node.parent.is_none() {
            return Err(OpError::new(
                Reason::NotAllowed,
                format!("Root branch {branch:?} cannot be deleted"),
            )
            .detail("bad_value", Value::String(branch.to_string())));
        }
        let occupants = self.org.tree.subtree_occupants(branch);
        if !occupants.is_empty() {
            return Err(OpError::new(
                Reason::UserEmployed,
                format!("Branch {branch:?} or its sub-branches still employ users"),
            )
            .detail(
                "fire_them",
                Value::Array(occupants.into_iter().map(Value::String).collect()),
            ));
        }
        self.org.tree.remove_subtree(branch).map_err(db_error)?;
        info!(branch, "branch deleted");
        self.persist_org()
    }

    /// Every branch id, preorder.
    pub fn list_branches(&self) -> Vec<String> {
        self.org.tree.preorder()
    }

    /// Sorted descendants of a branch (the branch itself excluded), or every
    /// branch in the tree when no starting branch is given.
    pub fn branch_descendants(&self, branch: Option<&str>) -> OpResult<Vec<String>> {
        let mut out = match branch {
            None => self.org.tree.preorder(),
            Some(id) => {
                self.branch_checked(id, "branch_id")?;
                self.org
                    .tree
                    .subtree_ids(id)
                    .into_iter()
                    .filter(|b| b != id)
                    .collect()
            }
        };
        out.sort();
        Ok(out)
    }

    // ── Roles ─────────────────────────────────────────────────────────────────

    /// Define a role at a branch. The duties may name funcsets that do not
    /// exist (yet) — stale references simply resolve to nothing.
    pub fn create_role(&mut self, branch: &str, role: &str, funcsets: &[String]) -> OpResult<()> {
        require_ident(role, "role")?;
        for fs in funcsets {
            require_ident(fs, "funcset_id")?;
        }
        let node = self.branch_mut_checked(branch, "branch_id")?;
        if node.role(role).is_some() {
            return Err(OpError::new(
                Reason::AlreadyExists,
                format!("Role {role:?} is already defined in branch {branch:?}"),
            )
            .detail("bad_value", Value::String(role.to_string())));
        }
        node.roles.push(Role {
            name: role.to_string(),
            funcsets: funcsets.to_vec(),
        });
        self.persist_org()
    }

    /// Remove a role definition from the branch where it is defined.
    pub fn delete_role(&mut self, branch: &str, role: &str) -> OpResult<()> {
        require_ident(role, "role")?;
        let branch_id = branch.to_string();
        let node = self.branch_mut_checked(branch, "branch_id")?;
        let idx = node
            .roles
            .iter()
            .position(|r| r.name == role)
            .ok_or_else(|| role_unknown(&branch_id, role))?;
        node.roles.remove(idx);
        self.persist_org()
    }

    /// The duties of a role as defined directly at `branch`, in definition
    /// order.
    pub fn role_funcsets(&self, branch: &str, role: &str) -> OpResult<Vec<String>> {
        require_ident(role, "role")?;
        let node = self.branch_checked(branch, "branch_id")?;
        let def = node.role(role).ok_or_else(|| role_unknown(branch, role))?;
        Ok(def.funcsets.clone())
    }

    pub fn role_funcset_add(&mut self, branch: &str, role: &str, funcset: &str) -> OpResult<()> {
        require_ident(role, "role")?;
        require_ident(funcset, "funcset_id")?;
        let branch_id = branch.to_string();
        let node = self.branch_mut_checked(branch, "branch_id")?;
        let def = node
            .role_mut(role)
            .ok_or_else(|| role_unknown(&branch_id, role))?;
        if def.funcsets.iter().any(|f| f == funcset) {
            return Err(OpError::new(
                Reason::AlreadyExists,
                format!("Funcset {funcset:?} is already a duty of role {role:?}"),
            )
            .detail("bad_value", Value::String(funcset.to_string())));
        }
        def.funcsets.push(funcset.to_string());
        self.persist_org()
    }

    pub fn role_funcset_remove(&mut self, branch: &str, role: &str, funcset: &str) -> OpResult<()> {
        require_ident(role, "role")?;
        require_ident(funcset, "funcset_id")?;
        let branch_id = branch.to_string();
        let node = self.branch_mut_checked(branch, "branch_id")?;
        let def = node
            .role_mut(role)
            .ok_or_else(|| role_unknown(&branch_id, role))?;
        let idx = def.funcsets.iter().position(|f| f == funcset).ok_or_else(|| {
            OpError::new(
                Reason::NotInSet,
                format!("Funcset {funcset:?} is not a duty of role {role:?}"),
            )
            .detail("bad_value", Value::String(funcset.to_string()))
        })?;
        def.funcsets.remove(idx);
        self.persist_org()
    }

    /// Role names visible at a branch: those defined directly, or — with
    /// `with_inherited` — everything along the chain to the root. Sorted,
    /// de-duplicated.
    pub fn list_branch_roles(&self, branch: &str, with_inherited: bool) -> OpResult<Vec<String>> {
        let node = self.branch_checked(branch, "branch_id")?;
        let mut names: Vec<String> = if with_inherited {
            self.org
                .tree
                .ancestor_or_self(branch)
                .iter()
                .filter_map(|bid| self.org.tree.branch(bid))
                .flat_map(|n| n.roles.iter().map(|r| r.name.clone()))
                .collect()
        } else {
            node.roles.iter().map(|r| r.name.clone()).collect()
        };
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Like [`list_branch_roles`](Self::list_branch_roles), but each role
    /// comes with the branch whose definition is authoritative as seen from
    /// `branch` (nearest definition wins).
    pub fn list_branch_roles_located(
        &self,
        branch: &str,
        with_inherited: bool,
    ) -> OpResult<Vec<RoleAt>> {
        let names = self.list_branch_roles(branch, with_inherited)?;
        Ok(names
            .into_iter()
            .filter_map(|name| {
                arbor_policy::nearest_role(&self.org.tree, branch, &name).map(|(at, _)| RoleAt {
                    role: name,
                    branch: at.to_string(),
                })
            })
            .collect())
    }

    /// Role names usable at a branch (its own plus everything inherited).
    /// Unknown branches quietly resolve to nothing.
    pub fn enabled_roles(&self, branch: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .org
            .tree
            .ancestor_or_self(branch)
            .iter()
            .filter_map(|bid| self.org.tree.branch(bid))
            .flat_map(|n| n.roles.iter().map(|r| r.name.clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    // ── Position slots ────────────────────────────────────────────────────────

    /// Add one vacant slot for a role name at a branch.
    pub fn create_position(&mut self, branch: &str, pos: &str) -> OpResult<PositionCounts> {
        require_ident(pos, "pos")?;
        let branch_id = branch.to_string();
        let node = self.branch_mut_checked(branch, "branch_id")?;
        node.employees.push(Slot {
            pos: pos.to_string(),
            person: None,
        });
        let (total, vacant) = node.slot_counts(pos);
        let counts = PositionCounts {
            branch: branch_id,
            pos: pos.to_string(),
            total,
            vacant,
        };
        self.persist_org()?;
        Ok(counts)
    }

    /// Remove one vacant slot for a role name. Occupied slots never go this
    /// way — fire the person first.
    pub fn delete_position(&mut self, branch: &str, pos: &str) -> OpResult<PositionCounts> {
        require_ident(pos, "pos")?;
        let branch_id = branch.to_string();
        let node = self.branch_mut_checked(branch, "branch_id")?;
        let idx = node
            .employees
            .iter()
            .rposition(|s| s.pos == pos && s.is_vacant())
            .ok_or_else(|| {
                OpError::new(
                    Reason::NotInSet,
                    format!("No vacant position {pos:?} in branch {branch_id:?}"),
                )
                .detail("bad_value", Value::String(pos.to_string()))
            })?;
        node.employees.remove(idx);
        let (total, vacant) = node.slot_counts(pos);
        let counts = PositionCounts {
            branch: branch_id,
            pos: pos.to_string(),
            total,
            vacant,
        };
        self.persist_org()?;
        Ok(counts)
    }

    /// Names of roles with at least one vacant slot directly at `branch`,
    /// sorted, de-duplicated. Unknown branches resolve to nothing.
    pub fn vacant_positions(&self, branch: &str) -> Vec<String> {
        let Some(node) = self.org.tree.branch(branch) else {
            return Vec::new();
        };
        let mut out: Vec<String> = node
            .employees
            .iter()
            .filter(|s| s.is_vacant())
            .map(|s| s.pos.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    // ── Whitelists ────────────────────────────────────────────────────────────

    pub fn whitelist(&self, branch: &str) -> OpResult<WhitelistView> {
        let node = self.branch_checked(branch, "branch_id")?;
        let mut funcsets = node.whitelist.funcsets.clone();
        funcsets.sort();
        Ok(WhitelistView {
            branch: node.id.clone(),
            funcsets,
            propagate_parent_flag: node.whitelist.propagate,
        })
    }

    /// Replace a branch whitelist wholesale. With `propagate` set the
    /// explicit list is stored but has no effect until the flag is cleared.
    pub fn set_whitelist(
        &mut self,
        branch: &str,
        propagate: bool,
        funcsets: &[String],
    ) -> OpResult<()> {
        for fs in funcsets {
            require_ident(fs, "funcset_id")?;
        }
        let node = self.branch_mut_checked(branch, "branch_id")?;
        node.whitelist = WhiteList {
            propagate,
            funcsets: funcsets.to_vec(),
        };
        self.persist_org()
    }

    // ── Review queries ────────────────────────────────────────────────────────

    /// Vacancies per branch. With a position name given, only branches
    /// carrying slots for that role are listed and only its vacancies are
    /// counted in.
    pub fn review_branches(&self, pos: Option<&str>) -> OpResult<Vec<BranchVacancies>> {
        if let Some(p) = pos {
            require_ident(p, "pos")?;
        }
        let mut out = Vec::new();
        for bid in self.org.tree.preorder() {
            let Some(node) = self.org.tree.branch(&bid) else {
                continue;
            };
            if let Some(p) = pos {
                if !node.employees.iter().any(|s| s.pos == p) {
                    continue;
                }
            }
            let vacancies = node
                .employees
                .iter()
                .filter(|s| s.is_vacant() && pos.map_or(true, |p| s.pos == p))
                .map(|s| s.pos.clone())
                .collect();
            out.push(BranchVacancies {
                branch: bid,
                vacancies,
            });
        }
        Ok(out)
    }

    /// Every position slot, over the whole tree or one branch. An unknown
    /// branch yields an empty listing, matching the other review queries.
    pub fn review_positions(&self, branch: Option<&str>) -> OpResult<Vec<PositionView>> {
        if let Some(b) = branch {
            require_safe(b, "branch_id")?;
        }
        let ids = match branch {
            None => self.org.tree.preorder(),
            Some(b) if self.org.tree.contains(b) => vec![b.to_string()],
            Some(_) => Vec::new(),
        };
        let mut out = Vec::new();
        for bid in ids {
            let Some(node) = self.org.tree.branch(&bid) else {
                continue;
            };
            for slot in &node.employees {
                out.push(PositionView {
                    pos: slot.pos.clone(),
                    branch: bid.clone(),
                    vacant: slot.is_vacant(),
                });
            }
        }
        Ok(out)
    }

    /// Slot counts per branch, optionally split per role and restricted to
    /// vacant slots. Branches without matching slots are left out.
    pub fn staffing_report(
        &self,
        branch: Option<&str>,
        per_role: bool,
        only_vacant: bool,
    ) -> OpResult<StaffingReport> {
        let ids = match branch {
            None => self.org.tree.preorder(),
            Some(b) => {
                self.branch_checked(b, "branch_id")?;
                vec![b.to_string()]
            }
        };
        let mut report = Vec::new();
        for bid in ids {
            let Some(node) = self.org.tree.branch(&bid) else {
                continue;
            };
            let slots: Vec<&Slot> = node
                .employees
                .iter()
                .filter(|s| !only_vacant || s.is_vacant())
                .collect();
            if slots.is_empty() {
                continue;
            }
            if per_role {
                let mut names: Vec<String> = slots.iter().map(|s| s.pos.clone()).collect();
                names.sort();
                names.dedup();
                for pos in names {
                    let count = slots.iter().filter(|s| s.pos == pos).count();
                    report.push(StaffingCount {
                        branch: bid.clone(),
                        role: Some(pos),
                        count,
                    });
                }
            } else {
                report.push(StaffingCount {
                    branch: bid.clone(),
                    role: None,
                    count: slots.len(),
                });
            }
        }
        Ok(StaffingReport {
            branch_filter: branch.unwrap_or("*ALL*").to_string(),
            only_vacant,
            report,
        })
    }

    /// Ids of people employed at a branch, or anywhere in its subtree with
    /// `with_subs`. Document order.
    pub fn branch_employees(&self, branch: &str, with_subs: bool) -> OpResult<Vec<String>> {
        self.branch_checked(branch, "branch_id")?;
        let ids = if with_subs {
            self.org.tree.subtree_ids(branch)
        } else {
            vec![branch.to_string()]
        };
        Ok(ids
            .iter()
            .filter_map(|bid| self.org.tree.branch(bid))
            .flat_map(|n| n.employees.iter())
            .filter_map(|s| s.person.clone())
            .collect())
    }
}
