//! XML shapes of the persisted documents and their conversion to and from
//! the in-memory model.
//!
//! The on-disk schema is a stable contract: `universe.xml` carries the
//! people register and the nested branch forest, `catalogues.xml` the
//! function records. Nesting is the disk representation only — loading
//! flattens branches into the [`OrgTree`] arena, saving rebuilds the nested
//! form from the arena in document order, so a load/save round trip
//! reproduces the structure it read.

use serde::{Deserialize, Serialize};

use crate::catalog::{CallDef, CatalogDocument, FunctionDef};
use crate::org::{
    Branch, ChangeStamp, Funcset, OrgDocument, OrgTree, Person, Role, Slot, TreeError, WhiteList,
};

/// Errors turning document text into the model or back.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("cannot parse document: {0}")]
    Parse(#[from] quick_xml::DeError),
    #[error("cannot serialize document: {0}")]
    Serialize(#[from] quick_xml::SeError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

// ── universe.xml shapes ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "universe")]
struct UniverseXml {
    registers: RegistersXml,
    branches: BranchesXml,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistersXml {
    people_register: PeopleRegisterXml,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PeopleRegisterXml {
    #[serde(rename = "person", default)]
    people: Vec<PersonXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersonXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@secret")]
    secret: String,
    #[serde(rename = "@pswChangedAt")]
    psw_changed_at: i64,
    #[serde(rename = "@failures", default)]
    failures: u32,
    #[serde(rename = "@expireAt", default, skip_serializing_if = "Option::is_none")]
    expire_at: Option<i64>,
    #[serde(rename = "@readableName", default)]
    readable_name: String,
    #[serde(rename = "@sessionMax", default, skip_serializing_if = "Option::is_none")]
    session_max: Option<u32>,
    #[serde(rename = "@createdBy", default)]
    created_by: String,
    #[serde(rename = "@createdAt", default, skip_serializing_if = "Option::is_none")]
    created_at: Option<i64>,
    #[serde(rename = "@last_error", default, skip_serializing_if = "Option::is_none")]
    last_error: Option<i64>,
    #[serde(
        rename = "@last_auth_success",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    last_auth_success: Option<i64>,
    #[serde(rename = "changed", default)]
    changes: Vec<ChangedXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChangedXml {
    #[serde(rename = "@by")]
    by: String,
    #[serde(rename = "@at")]
    at: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BranchesXml {
    #[serde(rename = "branch", default)]
    branches: Vec<BranchXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BranchXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(default)]
    func_white_list: WhiteListXml,
    #[serde(default)]
    employees: EmployeesXml,
    #[serde(default)]
    roles: RolesXml,
    #[serde(default)]
    deffuncsets: DeffuncsetsXml,
    #[serde(default)]
    branches: BranchesXml,
}

fn no() -> String {
    "no".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WhiteListXml {
    #[serde(rename = "@propagateParent", default = "no")]
    propagate_parent: String,
    #[serde(rename = "funcset", default)]
    funcsets: Vec<IdRefXml>,
}

impl Default for WhiteListXml {
    fn default() -> Self {
        Self {
            propagate_parent: no(),
            funcsets: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IdRefXml {
    #[serde(rename = "@id")]
    id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EmployeesXml {
    #[serde(rename = "employee", default)]
    slots: Vec<EmployeeXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EmployeeXml {
    #[serde(rename = "@pos")]
    pos: String,
    #[serde(rename = "@person", default, skip_serializing_if = "Option::is_none")]
    person: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RolesXml {
    #[serde(rename = "role", default)]
    roles: Vec<RoleXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RoleXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "funcset", default)]
    funcsets: Vec<IdRefXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DeffuncsetsXml {
    #[serde(rename = "funcset", default)]
    funcsets: Vec<FuncsetXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FuncsetXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name", default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "func", default)]
    functions: Vec<IdRefXml>,
}

// ── catalogues.xml shapes ─────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "catalogues")]
struct CataloguesXml {
    functions_catalogue: FunctionsCatalogueXml,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FunctionsCatalogueXml {
    #[serde(rename = "function", default)]
    functions: Vec<FunctionXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name", default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "@title", default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(rename = "@descr", default, skip_serializing_if = "Option::is_none")]
    descr: Option<String>,
    #[serde(rename = "@tags", default, skip_serializing_if = "Option::is_none")]
    tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    call: Option<CallXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CallXml {
    #[serde(rename = "@method", default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<BodyXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BodyXml {
    #[serde(rename = "@content-type", default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
}

// ── universe conversions ──────────────────────────────────────────────────────

fn person_from_xml(p: PersonXml) -> Person {
    Person {
        id: p.id,
        secret: p.secret,
        psw_changed_at: p.psw_changed_at,
        failures: p.failures,
        expire_at: p.expire_at,
        readable_name: p.readable_name,
        session_max: p.session_max,
        created_by: p.created_by,
        created_at: p.created_at,
        last_error: p.last_error,
        last_auth_success: p.last_auth_success,
        changes: p
            .changes
            .into_iter()
            .map(|c| ChangeStamp { by: c.by, at: c.at })
            .collect(),
    }
}

fn person_to_xml(p: &Person) -> PersonXml {
    PersonXml {
        id: p.id.clone(),
        secret: p.secret.clone(),
        psw_changed_at: p.psw_changed_at,
        failures: p.failures,
        expire_at: p.expire_at,
        readable_name: p.readable_name.clone(),
        session_max: p.session_max,
        created_by: p.created_by.clone(),
        created_at: p.created_at,
        last_error: p.last_error,
        last_auth_success: p.last_auth_success,
        changes: p
            .changes
            .iter()
            .map(|c| ChangedXml {
                by: c.by.clone(),
                at: c.at,
            })
            .collect(),
    }
}

/// Flatten one nested branch (and recursively its children) into the arena.
fn attach_branch(tree: &mut OrgTree, parent: Option<&str>, b: BranchXml) -> Result<(), TreeError> {
    let node = Branch {
        id: b.id.clone(),
        parent: None,
        children: Vec::new(),
        whitelist: WhiteList {
            propagate: b.func_white_list.propagate_parent == "yes",
            funcsets: b.func_white_list.funcsets.into_iter().map(|r| r.id).collect(),
        },
        employees: b
            .employees
            .slots
            .into_iter()
            .map(|e| Slot {
                pos: e.pos,
                person: e.person,
            })
            .collect(),
        roles: b
            .roles
            .roles
            .into_iter()
            .map(|r| Role {
                name: r.name,
                funcsets: r.funcsets.into_iter().map(|f| f.id).collect(),
            })
            .collect(),
        deffuncsets: b
            .deffuncsets
            .funcsets
            .into_iter()
            .map(|f| Funcset {
                id: f.id,
                name: f.name,
                functions: f.functions.into_iter().map(|x| x.id).collect(),
            })
            .collect(),
    };
    let id = node.id.clone();
    tree.attach(parent, node)?;
    for child in b.branches.branches {
        attach_branch(tree, Some(&id), child)?;
    }
    Ok(())
}

/// Rebuild one nested branch element from the arena. Child keys without a
/// node (which the arena never produces) are skipped.
fn branch_to_xml(tree: &OrgTree, id: &str) -> Option<BranchXml> {
    let node = tree.branch(id)?;
    Some(BranchXml {
        id: node.id.clone(),
        func_white_list: WhiteListXml {
            propagate_parent: if node.whitelist.propagate { "yes" } else { "no" }.to_string(),
            funcsets: node
                .whitelist
                .funcsets
                .iter()
                .map(|f| IdRefXml { id: f.clone() })
                .collect(),
        },
        employees: EmployeesXml {
            slots: node
                .employees
                .iter()
                .map(|s| EmployeeXml {
                    pos: s.pos.clone(),
                    person: s.person.clone(),
                })
                .collect(),
        },
        roles: RolesXml {
            roles: node
                .roles
                .iter()
                .map(|r| RoleXml {
                    name: r.name.clone(),
                    funcsets: r
                        .funcsets
                        .iter()
                        .map(|f| IdRefXml { id: f.clone() })
                        .collect(),
                })
                .collect(),
        },
        deffuncsets: DeffuncsetsXml {
            funcsets: node
                .deffuncsets
                .iter()
                .map(|f| FuncsetXml {
                    id: f.id.clone(),
                    name: f.name.clone(),
                    functions: f
                        .functions
                        .iter()
                        .map(|x| IdRefXml { id: x.clone() })
                        .collect(),
                })
                .collect(),
        },
        branches: BranchesXml {
            branches: node
                .children
                .iter()
                .filter_map(|c| branch_to_xml(tree, c))
                .collect(),
        },
    })
}

/// Parse `universe.xml` text into an [`OrgDocument`].
pub fn parse_org(text: &str) -> Result<OrgDocument, DocumentError> {
    let raw: UniverseXml = quick_xml::de::from_str(text)?;
    let mut tree = OrgTree::new();
    for b in raw.branches.branches {
        attach_branch(&mut tree, None, b)?;
    }
    Ok(OrgDocument {
        people: raw
            .registers
            .people_register
            .people
            .into_iter()
            .map(person_from_xml)
            .collect(),
        tree,
    })
}

/// Serialize an [`OrgDocument`] to `universe.xml` text.
pub fn write_org(doc: &OrgDocument) -> Result<String, DocumentError> {
    let raw = UniverseXml {
        registers: RegistersXml {
            people_register: PeopleRegisterXml {
                people: doc.people.iter().map(person_to_xml).collect(),
            },
        },
        branches: BranchesXml {
            branches: doc
                .tree
                .roots()
                .iter()
                .filter_map(|r| branch_to_xml(&doc.tree, r))
                .collect(),
        },
    };
    to_indented_xml(&raw)
}

// ── catalog conversions ───────────────────────────────────────────────────────

/// Parse `catalogues.xml` text into a [`CatalogDocument`].
pub fn parse_catalog(text: &str) -> Result<CatalogDocument, DocumentError> {
    let raw: CataloguesXml = quick_xml::de::from_str(text)?;
    Ok(CatalogDocument {
        functions: raw
            .functions_catalogue
            .functions
            .into_iter()
            .map(|f| FunctionDef {
                id: f.id,
                name: f.name,
                title: f.title,
                descr: f.descr,
                tags: f.tags,
                call: f.call.map(|c| CallDef {
                    url: c.url,
                    method: c.method,
                    content_type: c.body.and_then(|b| b.content_type),
                }),
            })
            .collect(),
    })
}

/// Serialize a [`CatalogDocument`] to `catalogues.xml` text.
pub fn write_catalog(doc: &CatalogDocument) -> Result<String, DocumentError> {
    let raw = CataloguesXml {
        functions_catalogue: FunctionsCatalogueXml {
            functions: doc
                .functions
                .iter()
                .map(|f| FunctionXml {
                    id: f.id.clone(),
                    name: f.name.clone(),
                    title: f.title.clone(),
                    descr: f.descr.clone(),
                    tags: f.tags.clone(),
                    call: f.call.as_ref().map(|c| CallXml {
                        method: c.method.clone(),
                        url: c.url.clone(),
                        body: c.content_type.as_ref().map(|ct| BodyXml {
                            content_type: Some(ct.clone()),
                        }),
                    }),
                })
                .collect(),
        },
    };
    to_indented_xml(&raw)
}

fn to_indented_xml<T: Serialize>(value: &T) -> Result<String, DocumentError> {
    let mut out = String::new();
    let mut ser = quick_xml::se::Serializer::new(&mut out);
    ser.indent(' ', 2);
    value.serialize(ser)?;
    out.push('\n');
    Ok(out)
}
