//! The resolution algorithms: branch funcset inheritance and
//! nearest-definition-wins role lookup.
//!
//! Inheritance rule, per branch:
//!
//! ```text
//! effective(branch) =
//!     own_deffuncsets(branch)
//!     ∪ ( no parent                → {}
//!       ; whitelist.propagate      → effective(parent)
//!       ; otherwise                → effective(parent) ∩ whitelist.explicit )
//! ```
//!
//! A branch's own definitions are always visible regardless of its
//! whitelist; the propagate flag grants the parent's whole effective set and
//! makes the explicit list irrelevant.

use std::collections::BTreeSet;

use tracing::{debug, error};

use arbor_store::{CatalogDocument, OrgTree, Role};

/// The funcsets a branch can see: its own definitions plus whatever its
/// whitelist lets through from the parent's effective set.
///
/// An unknown branch id resolves to the empty set.
pub fn effective_funcsets(tree: &OrgTree, branch_id: &str) -> BTreeSet<String> {
    let Some(branch) = tree.branch(branch_id) else {
        return BTreeSet::new();
    };

    let own: BTreeSet<String> = branch.deffuncsets.iter().map(|f| f.id.clone()).collect();

    let Some(parent) = branch.parent.as_deref() else {
        debug!(branch = branch_id, ?own, "root branch, nothing inherited");
        return own;
    };

    let inherited = effective_funcsets(tree, parent);
    let visible: BTreeSet<String> = if branch.whitelist.propagate {
        inherited
    } else {
        let explicit: BTreeSet<String> = branch.whitelist.funcsets.iter().cloned().collect();
        inherited.intersection(&explicit).cloned().collect()
    };

    let effective: BTreeSet<String> = own.union(&visible).cloned().collect();
    debug!(branch = branch_id, ?effective, "branch funcsets resolved");
    effective
}

/// The authoritative definition of a role name as seen from `branch_id`:
/// walk from the branch toward the root and stop at the first branch that
/// defines the name. Farther definitions are shadowed entirely, never
/// merged. Returns the defining branch id together with the role.
pub fn nearest_role<'t>(tree: &'t OrgTree, branch_id: &str, name: &str) -> Option<(&'t str, &'t Role)> {
    for bid in tree.ancestor_or_self(branch_id) {
        let Some(node) = tree.branch(&bid) else {
            continue;
        };
        if let Some(role) = node.role(name) {
            debug!(role = name, defined_at = %node.id, seen_from = branch_id, "role resolved");
            return Some((node.id.as_str(), role));
        }
    }
    None
}

/// The effective funcsets of a user: the employing branch's effective set
/// intersected with the duties of the user's role (resolved
/// nearest-definition-wins). Unemployed users resolve to the empty set, as
/// does a position whose role is defined nowhere on the ancestor chain —
/// the latter is a data error worth shouting about, not a failure result.
pub fn user_funcsets(tree: &OrgTree, user_id: &str) -> BTreeSet<String> {
    let Some((branch_id, pos)) = tree.employment_of(user_id) else {
        return BTreeSet::new();
    };

    let visible = effective_funcsets(tree, &branch_id);

    let Some((_, role)) = nearest_role(tree, &branch_id, &pos) else {
        error!(
            position = %pos,
            branch = %branch_id,
            "position used without a role definition, please fix the database"
        );
        return BTreeSet::new();
    };

    let duties: BTreeSet<String> = role.funcsets.iter().cloned().collect();
    let result: BTreeSet<String> = visible.intersection(&duties).cloned().collect();
    debug!(user = user_id, ?visible, ?duties, ?result, "user funcsets resolved");
    result
}

/// The function ids a user may call: the union of the member functions of
/// the user's effective funcsets, kept to ids actually present in the
/// catalog. Stale references are dropped silently.
pub fn user_function_ids(
    tree: &OrgTree,
    catalog: &CatalogDocument,
    user_id: &str,
) -> BTreeSet<String> {
    let mut allowed: BTreeSet<String> = BTreeSet::new();
    for fs_id in user_funcsets(tree, user_id) {
        if let Some(fs) = tree.funcset(&fs_id) {
            allowed.extend(fs.functions.iter().cloned());
        }
    }
    let known: BTreeSet<String> = catalog.ids().into_iter().collect();
    allowed.intersection(&known).cloned().collect()
}
