//! The organization document: people register plus the branch forest.
//!
//! Branches form a tree with parent back-references, which a naive object
//! model would turn into a cyclic graph. The tree is therefore kept as an
//! arena: a flat map from branch id to node, where each node stores its
//! parent key and the ordered list of child keys. A separate
//! funcset-id → owning-branch index makes the global funcset uniqueness
//! check a map lookup instead of a tree walk.
//!
//! Structural mutations (attaching and removing branches, defining and
//! deleting funcsets) go through [`OrgTree`] methods so the arena and the
//! funcset index never drift apart. Everything else on a node (whitelist,
//! roles, employee slots) is plain data reachable through `branch_mut`.

use std::collections::BTreeMap;

use crate::persist::{DocumentFile, StoreError};
use crate::xml;

/// One credential-change audit record on a person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeStamp {
    pub by: String,
    pub at: i64,
}

/// A credentialed identity, possibly employed in one branch.
///
/// Timestamps are unix seconds. The secret is compared as stored — there is
/// no hashing in this system (a documented property, not an accident).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub id: String,
    pub secret: String,
    pub psw_changed_at: i64,
    pub failures: u32,
    pub expire_at: Option<i64>,
    pub readable_name: String,
    pub session_max: Option<u32>,
    pub created_by: String,
    pub created_at: Option<i64>,
    pub last_error: Option<i64>,
    pub last_auth_success: Option<i64>,
    pub changes: Vec<ChangeStamp>,
}

/// A role defined at a branch: a name plus funcset references ("duties").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub funcsets: Vec<String>,
}

/// One position slot: a role name, vacant or occupied by exactly one person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub pos: String,
    pub person: Option<String>,
}

impl Slot {
    pub fn is_vacant(&self) -> bool {
        self.person.is_none()
    }
}

/// A funcset definition: globally unique id, optional readable name, member
/// function ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Funcset {
    pub id: String,
    pub name: Option<String>,
    pub functions: Vec<String>,
}

/// The per-branch inheritance policy: when `propagate` is set the parent's
/// whole effective set is inherited and the explicit list is ignored;
/// otherwise only the intersection with the explicit list comes through.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WhiteList {
    pub propagate: bool,
    pub funcsets: Vec<String>,
}

/// One node of the branch forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub id: String,
    /// Parent branch id; `None` for a root. Managed by [`OrgTree`].
    pub parent: Option<String>,
    /// Child branch ids in document order. Managed by [`OrgTree`].
    pub children: Vec<String>,
    pub whitelist: WhiteList,
    pub employees: Vec<Slot>,
    pub roles: Vec<Role>,
    pub deffuncsets: Vec<Funcset>,
}

impl Branch {
    /// A fresh branch: empty whitelist with propagation off, no slots,
    /// roles, funcsets or children.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            children: Vec::new(),
            whitelist: WhiteList::default(),
            employees: Vec::new(),
            roles: Vec::new(),
            deffuncsets: Vec::new(),
        }
    }

    /// The role directly defined at this branch under `name`, if any.
    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn role_mut(&mut self, name: &str) -> Option<&mut Role> {
        self.roles.iter_mut().find(|r| r.name == name)
    }

    /// (total, vacant) slot counts for one role name at this branch.
    pub fn slot_counts(&self, pos: &str) -> (usize, usize) {
        let total = self.employees.iter().filter(|s| s.pos == pos).count();
        let vacant = self
            .employees
            .iter()
            .filter(|s| s.pos == pos && s.is_vacant())
            .count();
        (total, vacant)
    }
}

/// Errors raised while building or mutating the arena.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("duplicate branch id {0:?} in document")]
    DuplicateBranch(String),
    #[error("duplicate funcset id {0:?} in document")]
    DuplicateFuncset(String),
    #[error("branch {0:?} is not in the tree")]
    NoSuchBranch(String),
}

/// The branch forest as an arena, with a funcset ownership index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrgTree {
    nodes: BTreeMap<String, Branch>,
    roots: Vec<String>,
    funcset_owner: BTreeMap<String, String>,
}

impl OrgTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn branch(&self, id: &str) -> Option<&Branch> {
        self.nodes.get(id)
    }

    /// Mutable access to one node's data. Structural fields (`parent`,
    /// `children`, `deffuncsets` membership) are managed by the tree; use
    /// [`attach`](Self::attach), [`remove_subtree`](Self::remove_subtree),
    /// [`define_funcset`](Self::define_funcset) and
    /// [`delete_funcset`](Self::delete_funcset) for those.
    pub fn branch_mut(&mut self, id: &str) -> Option<&mut Branch> {
        self.nodes.get_mut(id)
    }

    /// Root branch ids in document order.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// The first root in document order, if the forest is not empty.
    pub fn first_root(&self) -> Option<&str> {
        self.roots.first().map(String::as_str)
    }

    /// Attach `branch` under `parent` (or as a new root when `parent` is
    /// `None`). The branch id and every funcset it defines must be unused
    /// anywhere in the tree.
    pub fn attach(&mut self, parent: Option<&str>, mut branch: Branch) -> Result<(), TreeError> {
        if self.nodes.contains_key(&branch.id) {
            return Err(TreeError::DuplicateBranch(branch.id));
        }
        for fs in &branch.deffuncsets {
            if self.funcset_owner.contains_key(&fs.id) {
                return Err(TreeError::DuplicateFuncset(fs.id.clone()));
            }
        }
        match parent {
            Some(pid) => {
                let parent_node = self
                    .nodes
                    .get_mut(pid)
                    .ok_or_else(|| TreeError::NoSuchBranch(pid.to_string()))?;
                parent_node.children.push(branch.id.clone());
                branch.parent = Some(pid.to_string());
            }
            None => {
                self.roots.push(branch.id.clone());
                branch.parent = None;
            }
        }
        for fs in &branch.deffuncsets {
            self.funcset_owner.insert(fs.id.clone(), branch.id.clone());
        }
        branch.children = Vec::new();
        self.nodes.insert(branch.id.clone(), branch);
        Ok(())
    }

    /// Remove the branch and its whole subtree, unindexing every funcset
    /// defined anywhere below it. Roots can be removed here — the business
    /// rule forbidding that lives a level up.
    pub fn remove_subtree(&mut self, id: &str) -> Result<(), TreeError> {
        if !self.nodes.contains_key(id) {
            return Err(TreeError::NoSuchBranch(id.to_string()));
        }
        let doomed = self.subtree_ids(id);
        let parent = self.nodes[id].parent.clone();
        match parent {
            Some(pid) => {
                if let Some(p) = self.nodes.get_mut(&pid) {
                    p.children.retain(|c| c != id);
                }
            }
            None => self.roots.retain(|r| r != id),
        }
        for bid in doomed {
            if let Some(node) = self.nodes.remove(&bid) {
                for fs in &node.deffuncsets {
                    self.funcset_owner.remove(&fs.id);
                }
            }
        }
        Ok(())
    }

    /// Define `funcset` at `branch_id`. Fails if the funcset id is already
    /// defined anywhere in the tree.
    pub fn define_funcset(&mut self, branch_id: &str, funcset: Funcset) -> Result<(), TreeError> {
        if self.funcset_owner.contains_key(&funcset.id) {
            return Err(TreeError::DuplicateFuncset(funcset.id));
        }
        let node = self
            .nodes
            .get_mut(branch_id)
            .ok_or_else(|| TreeError::NoSuchBranch(branch_id.to_string()))?;
        self.funcset_owner
            .insert(funcset.id.clone(), branch_id.to_string());
        node.deffuncsets.push(funcset);
        Ok(())
    }

    /// Delete a funcset definition wherever it lives; returns the removed
    /// definition or `None` if the id is unknown.
    pub fn delete_funcset(&mut self, funcset_id: &str) -> Option<Funcset> {
        let owner = self.funcset_owner.remove(funcset_id)?;
        let node = self.nodes.get_mut(&owner)?;
        let idx = node.deffuncsets.iter().position(|f| f.id == funcset_id)?;
        Some(node.deffuncsets.remove(idx))
    }

    /// The branch id owning `funcset_id`, if the funcset is defined.
    pub fn funcset_owner(&self, funcset_id: &str) -> Option<&str> {
        self.funcset_owner.get(funcset_id).map(String::as_str)
    }

    pub fn funcset(&self, funcset_id: &str) -> Option<&Funcset> {
        let owner = self.funcset_owner.get(funcset_id)?;
        self.nodes
            .get(owner)?
            .deffuncsets
            .iter()
            .find(|f| f.id == funcset_id)
    }

    pub fn funcset_mut(&mut self, funcset_id: &str) -> Option<&mut Funcset> {
        let owner = self.funcset_owner.get(funcset_id)?.clone();
        self.nodes
            .get_mut(&owner)?
            .deffuncsets
            .iter_mut()
            .find(|f| f.id == funcset_id)
    }

    /// All funcset ids defined anywhere, sorted.
    pub fn funcset_ids(&self) -> Vec<String> {
        self.funcset_owner.keys().cloned().collect()
    }

    /// Every branch id, preorder, in document order.
    pub fn preorder(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for root in &self.roots {
            self.walk(root, &mut out);
        }
        out
    }

    fn walk(&self, id: &str, out: &mut Vec<String>) {
        out.push(id.to_string());
        if let Some(node) = self.nodes.get(id) {
            for child in &node.children {
                self.walk(child, out);
            }
        }
    }

    /// Branch ids of the subtree rooted at `id` (self first, preorder).
    /// Empty if `id` is unknown.
    pub fn subtree_ids(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        if self.nodes.contains_key(id) {
            self.walk(id, &mut out);
        }
        out
    }

    /// The chain from `id` up to its root, `id` itself first.
    pub fn ancestor_or_self(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut cursor = self.nodes.get(id);
        while let Some(node) = cursor {
            out.push(node.id.clone());
            cursor = node.parent.as_deref().and_then(|p| self.nodes.get(p));
        }
        out
    }

    /// True when `descendant` lies in the subtree rooted at `root`
    /// (descendant-or-self).
    pub fn in_subtree(&self, root: &str, descendant: &str) -> bool {
        let mut cursor = self.nodes.get(descendant);
        while let Some(node) = cursor {
            if node.id == root {
                return true;
            }
            cursor = node.parent.as_deref().and_then(|p| self.nodes.get(p));
        }
        false
    }

    /// Where `person` is employed: `(branch id, position name)` of the first
    /// occupied slot in document order, or `None` if unemployed.
    pub fn employment_of(&self, person: &str) -> Option<(String, String)> {
        for bid in self.preorder() {
            let node = &self.nodes[&bid];
            if let Some(slot) = node
                .employees
                .iter()
                .find(|s| s.person.as_deref() == Some(person))
            {
                return Some((bid.clone(), slot.pos.clone()));
            }
        }
        None
    }

    /// Sorted, de-duplicated occupant ids of every slot in the subtree.
    pub fn subtree_occupants(&self, id: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .subtree_ids(id)
            .iter()
            .flat_map(|bid| self.nodes[bid].employees.iter())
            .filter_map(|s| s.person.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

/// The whole organization document: people register plus branch forest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrgDocument {
    /// People in register order (new records are appended).
    pub people: Vec<Person>,
    pub tree: OrgTree,
}

impl OrgDocument {
    pub fn person(&self, id: &str) -> Option<&Person> {
        self.people.iter().find(|p| p.id == id)
    }

    pub fn person_mut(&mut self, id: &str) -> Option<&mut Person> {
        self.people.iter_mut().find(|p| p.id == id)
    }

    /// Remove a person record; true if it existed.
    pub fn remove_person(&mut self, id: &str) -> bool {
        let before = self.people.len();
        self.people.retain(|p| p.id != id);
        self.people.len() != before
    }

    /// Load and parse the document from disk. Any read or parse failure is
    /// fatal to the caller — there is no partially loaded state.
    pub fn load(file: &DocumentFile) -> Result<Self, StoreError> {
        let text = file.load_text()?;
        let doc = xml::parse_org(&text)?;
        tracing::info!(path = %file.path().display(), people = doc.people.len(), "organization document loaded");
        Ok(doc)
    }

    /// Serialize and atomically persist the full document.
    pub fn save(&self, file: &DocumentFile) -> Result<(), StoreError> {
        let text = xml::write_org(self)?;
        file.save_text(&text)
    }
}
