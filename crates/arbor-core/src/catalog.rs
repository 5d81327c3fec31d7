//! Operations on funcsets and the function catalogue.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use arbor_contracts::{
    join_tags, require_ident, require_safe, split_tags, OpError, OpResult, Reason, TagSetOp,
};
use arbor_store::{FuncProp, Funcset, FunctionDef};

use crate::keeper::{db_error, funcset_unknown, function_unknown, DataKeeper};

/// A funcset definition as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuncsetDetails {
    pub funcset_id: String,
    pub branch: String,
    /// The readable name; empty when none was given.
    pub name: String,
    pub functions: Vec<String>,
}

/// What a catalogue write did to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Appended,
    Replaced,
    Deleted,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Appended => "APPENDED",
            ChangeStatus::Replaced => "REPLACED",
            ChangeStatus::Deleted => "DELETED",
        }
    }
}

/// Outcome of a catalogue write, with the displaced record when one existed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionChange {
    pub function_id: String,
    pub status: ChangeStatus,
    pub previous: Option<FunctionDef>,
}

/// Parse one external property name.
pub(crate) fn parse_prop(name: &str) -> OpResult<FuncProp> {
    FuncProp::parse(name).ok_or_else(|| {
        OpError::new(
            Reason::PropUnknown,
            format!("Unknown function property: {name:?}"),
        )
        .detail("bad_value", Value::String(name.to_string()))
    })
}

/// Parse a comma-joined property list; `*ALL*` selects every property.
pub(crate) fn parse_props(list: &str) -> OpResult<Vec<FuncProp>> {
    if list == "*ALL*" {
        return Ok(FuncProp::ALL.to_vec());
    }
    let mut out = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        out.push(parse_prop(name)?);
    }
    if out.is_empty() {
        return Err(OpError::missing("props"));
    }
    Ok(out)
}

/// Project one function record onto the requested properties. Properties the
/// record does not carry are omitted from its map.
pub(crate) fn review_one(def: &FunctionDef, props: &[FuncProp]) -> BTreeMap<String, String> {
    props
        .iter()
        .filter_map(|p| p.extract(def).map(|v| (p.as_str().to_string(), v)))
        .collect()
}

impl DataKeeper {
    // ── Funcsets ──────────────────────────────────────────────────────────────

    /// Define an empty funcset at a branch. Funcset ids are globally unique
    /// across the whole tree.
    pub fn funcset_create(
        &mut self,
        branch: &str,
        funcset: &str,
        name: Option<&str>,
    ) -> OpResult<()> {
        require_ident(funcset, "funcset_id")?;
        if let Some(n) = name {
            require_safe(n, "readable_name")?;
        }
        self.branch_checked(branch, "branch_id")?;
        if let Some(owner) = self.org.tree.funcset_owner(funcset) {
            return Err(OpError::new(
                Reason::AlreadyExists,
                format!("Funcset {funcset:?} is already defined in branch {owner:?}"),
            )
            .detail("bad_value", Value::String(funcset.to_string())));
        }
        self.org
            .tree
            .define_funcset(
                branch,
                Funcset {
                    id: funcset.to_string(),
                    name: name.map(str::to_string),
                    functions: Vec::new(),
                },
            )
            .map_err(db_error)?;
        info!(branch, funcset, "funcset defined");
        self.persist_org()
    }

    /// Remove a funcset definition wherever it lives. References from roles
    /// and whitelists are left in place and resolve to nothing afterwards.
    pub fn funcset_delete(&mut self, funcset: &str) -> OpResult<()> {
        require_ident(funcset, "funcset_id")?;
        if self.org.tree.delete_funcset(funcset).is_none() {
            return Err(funcset_unknown(funcset));
        }
        info!(funcset, "funcset deleted");
        self.persist_org()
    }

    pub fn funcset_details(&self, funcset: &str) -> OpResult<FuncsetDetails> {
        require_ident(funcset, "funcset_id")?;
        let owner = self
            .org
            .tree
            .funcset_owner(funcset)
            .ok_or_else(|| funcset_unknown(funcset))?
            .to_string();
        let def = self
            .org
            .tree
            .funcset(funcset)
            .ok_or_else(|| funcset_unknown(funcset))?;
        Ok(FuncsetDetails {
            funcset_id: def.id.clone(),
            branch: owner,
            name: def.name.clone().unwrap_or_default(),
            functions: def.functions.clone(),
        })
    }

    /// Add a function id to a funcset's member list. The id does not have to
    /// be catalogued; uncatalogued members stay in the list and resolve to
    /// nothing.
    pub fn funcset_func_add(&mut self, funcset: &str, function: &str) -> OpResult<()> {
        require_ident(funcset, "funcset_id")?;
        require_ident(function, "function_id")?;
        let def = self
            .org
            .tree
            .funcset_mut(funcset)
            .ok_or_else(|| funcset_unknown(funcset))?;
        if def.functions.iter().any(|f| f == function) {
            return Err(OpError::new(
                Reason::AlreadyExists,
                format!("Function {function:?} is already in funcset {funcset:?}"),
            )
            .detail("bad_value", Value::String(function.to_string())));
        }
        def.functions.push(function.to_string());
        self.persist_org()
    }

    /// Drop a function reference from a funcset. Works for stale references
    /// too — the member list is what is edited, not the catalogue.
    pub fn funcset_func_remove(&mut self, funcset: &str, function: &str) -> OpResult<()> {
        require_ident(funcset, "funcset_id")?;
        require_ident(function, "function_id")?;
        let def = self
            .org
            .tree
            .funcset_mut(funcset)
            .ok_or_else(|| funcset_unknown(funcset))?;
        let idx = def.functions.iter().position(|f| f == function).ok_or_else(|| {
            OpError::new(
                Reason::NotInSet,
                format!("Function {function:?} is not in funcset {funcset:?}"),
            )
            .detail("bad_value", Value::String(function.to_string()))
        })?;
        def.functions.remove(idx);
        self.persist_org()
    }

    // ── Functions ─────────────────────────────────────────────────────────────

    /// Insert or replace one catalogue record. Replacement keeps the
    /// record's slot so the document order stays reproducible. Tags are
    /// normalized on the way in.
    pub fn put_function(&mut self, def: FunctionDef) -> OpResult<FunctionChange> {
        if def.id.is_empty() {
            return Err(OpError::new(
                Reason::WrongData,
                "Function definition does not carry an id",
            ));
        }
        require_safe(&def.id, "function id")?;
        let mut def = def;
        if let Some(tags) = &def.tags {
            def.tags = Some(arbor_contracts::normalize_tags(tags));
        }
        let change = match self.catalog.position(&def.id) {
            Some(idx) => {
                let previous = std::mem::replace(&mut self.catalog.functions[idx], def.clone());
                FunctionChange {
                    function_id: def.id.clone(),
                    status: ChangeStatus::Replaced,
                    previous: Some(previous),
                }
            }
            None => {
                self.catalog.functions.push(def.clone());
                FunctionChange {
                    function_id: def.id.clone(),
                    status: ChangeStatus::Appended,
                    previous: None,
                }
            }
        };
        info!(function = %def.id, status = change.status.as_str(), "catalogue updated");
        self.persist_catalog()?;
        Ok(change)
    }

    /// Remove one catalogue record. Funcset members referencing it become
    /// stale and resolve to nothing.
    pub fn delete_function(&mut self, function: &str) -> OpResult<FunctionChange> {
        require_ident(function, "function_id")?;
        let idx = self
            .catalog
            .position(function)
            .ok_or_else(|| function_unknown(function))?;
        let previous = self.catalog.functions.remove(idx);
        info!(function, "function removed from catalogue");
        self.persist_catalog()?;
        Ok(FunctionChange {
            function_id: function.to_string(),
            status: ChangeStatus::Deleted,
            previous: Some(previous),
        })
    }

    pub fn get_function(&self, function: &str) -> OpResult<&FunctionDef> {
        require_ident(function, "function_id")?;
        self.catalog
            .function(function)
            .ok_or_else(|| function_unknown(function))
    }

    /// Distinct values of one property over the whole catalogue, sorted.
    /// Records without the property are skipped.
    pub fn list_function_values(&self, prop: &str) -> OpResult<Vec<String>> {
        let p = parse_prop(prop)?;
        let values: BTreeSet<String> = self
            .catalog
            .functions
            .iter()
            .filter_map(|f| p.extract(f))
            .collect();
        Ok(values.into_iter().collect())
    }

    /// Project one catalogued function onto a comma-joined property list
    /// (`*ALL*` for everything).
    pub fn review_function(
        &self,
        function: &str,
        props: &str,
    ) -> OpResult<BTreeMap<String, String>> {
        require_ident(function, "function_id")?;
        let props = parse_props(props)?;
        let def = self
            .catalog
            .function(function)
            .ok_or_else(|| function_unknown(function))?;
        Ok(review_one(def, &props))
    }

    /// Project every catalogued function onto a property list, in catalogue
    /// order.
    pub fn review_all_functions(&self, props: &str) -> OpResult<Vec<BTreeMap<String, String>>> {
        let props = parse_props(props)?;
        Ok(self
            .catalog
            .functions
            .iter()
            .map(|def| review_one(def, &props))
            .collect())
    }

    /// Combine a function's stored tag set with a supplied one using one of
    /// the four set methods. With `read_only` the combined set is computed
    /// and returned but nothing is stored; `SET` in particular replaces
    /// nothing in that mode and comes back empty. Returns the canonical
    /// comma-joined result.
    pub fn modify_function_tags(
        &mut self,
        function: &str,
        method: &str,
        tags: &str,
        read_only: bool,
    ) -> OpResult<String> {
        require_ident(function, "function_id")?;
        if method.is_empty() {
            return Err(OpError::missing("method"));
        }
        let op: TagSetOp = method.parse()?;
        let supplied = split_tags(tags);
        let current = split_tags(
            self.catalog
                .function(function)
                .ok_or_else(|| function_unknown(function))?
                .tags
                .as_deref()
                .unwrap_or(""),
        );
        let joined = if read_only && op == TagSetOp::Set {
            String::new()
        } else {
            join_tags(&op.apply(&current, &supplied))
        };
        if !read_only {
            if let Some(def) = self.catalog.function_mut(function) {
                def.tags = if joined.is_empty() {
                    None
                } else {
                    Some(joined.clone())
                };
            }
            self.persist_catalog()?;
        }
        Ok(joined)
    }
}
