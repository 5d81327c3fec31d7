//! Read-only exposures of the policy resolver: what a user or a branch can
//! see, projected onto ids, properties or full reviews.

use std::collections::{BTreeMap, BTreeSet};

use arbor_contracts::{require_ident, OpResult};
use arbor_policy::{effective_funcsets, user_funcsets, user_function_ids};

use crate::catalog::{parse_prop, parse_props, review_one};
use crate::keeper::{user_unknown, DataKeeper};

impl DataKeeper {
    /// Branches where the user occupies a slot, preorder. Normally at most
    /// one; stale documents with multiple employments list them all.
    pub fn user_branches(&self, user: &str) -> Vec<String> {
        self.org
            .tree
            .preorder()
            .into_iter()
            .filter(|bid| {
                self.org
                    .tree
                    .branch(bid)
                    .is_some_and(|n| n.employees.iter().any(|s| s.person.as_deref() == Some(user)))
            })
            .collect()
    }

    /// Position names the user holds, sorted, de-duplicated.
    pub fn user_positions(&self, user: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .org
            .tree
            .preorder()
            .iter()
            .filter_map(|bid| self.org.tree.branch(bid))
            .flat_map(|n| n.employees.iter())
            .filter(|s| s.person.as_deref() == Some(user))
            .map(|s| s.pos.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// The effective funcsets of a branch, sorted. Unknown branches resolve
    /// to nothing.
    pub fn branch_effective_funcsets(&self, branch: &str) -> Vec<String> {
        effective_funcsets(&self.org.tree, branch)
            .into_iter()
            .collect()
    }

    /// Every funcset id defined anywhere in the tree, sorted.
    pub fn funcset_ids(&self) -> Vec<String> {
        self.org.tree.funcset_ids()
    }

    /// The funcsets a registered user can act through, sorted. Unemployed
    /// users get an empty list, not a failure.
    pub fn user_funcsets_list(&self, user: &str) -> OpResult<Vec<String>> {
        require_ident(user, "user_id")?;
        if self.org.person(user).is_none() {
            return Err(user_unknown(user));
        }
        Ok(user_funcsets(&self.org.tree, user).into_iter().collect())
    }

    /// Distinct values of one property over the user's allowed functions,
    /// sorted.
    pub fn user_functions_list(&self, user: &str, prop: &str) -> OpResult<Vec<String>> {
        require_ident(user, "user_id")?;
        if self.org.person(user).is_none() {
            return Err(user_unknown(user));
        }
        let p = parse_prop(prop)?;
        let values: BTreeSet<String> = user_function_ids(&self.org.tree, &self.catalog, user)
            .iter()
            .filter_map(|fid| self.catalog.function(fid))
            .filter_map(|def| p.extract(def))
            .collect();
        Ok(values.into_iter().collect())
    }

    /// The user's allowed functions projected onto a comma-joined property
    /// list (`*ALL*` for everything), one map per function.
    pub fn user_functions_review(
        &self,
        user: &str,
        props: &str,
    ) -> OpResult<Vec<BTreeMap<String, String>>> {
        require_ident(user, "user_id")?;
        if self.org.person(user).is_none() {
            return Err(user_unknown(user));
        }
        let props = parse_props(props)?;
        let mut out = Vec::new();
        for fid in user_function_ids(&self.org.tree, &self.catalog, user) {
            if let Some(def) = self.catalog.function(&fid) {
                out.push(review_one(def, &props));
            }
        }
        Ok(out)
    }

    /// The branches below the user's employing branches: direct children, or
    /// the whole subtrees with `all_levels`. The employing branches
    /// themselves are included unless `exclude_own`. Sorted.
    pub fn user_subbranches(
        &self,
        user: &str,
        all_levels: bool,
        exclude_own: bool,
    ) -> OpResult<Vec<String>> {
        require_ident(user, "user_id")?;
        if self.org.person(user).is_none() {
            return Err(user_unknown(user));
        }
        let mut out: BTreeSet<String> = BTreeSet::new();
        for bid in self.user_branches(user) {
            if !exclude_own {
                out.insert(bid.clone());
            }
            if all_levels {
                out.extend(
                    self.org
                        .tree
                        .subtree_ids(&bid)
                        .into_iter()
                        .filter(|b| *b != bid),
                );
            } else if let Some(node) = self.org.tree.branch(&bid) {
                out.extend(node.children.iter().cloned());
            }
        }
        Ok(out.into_iter().collect())
    }
}
