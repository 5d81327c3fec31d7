//! The people register: credentials, registration details, authorization,
//! and the hire/fire pair tying people to position slots.

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use arbor_contracts::{require_ident, require_safe, OpError, OpResult, Reason};
use arbor_policy::{user_funcsets, user_function_ids};
use arbor_store::{ChangeStamp, FuncProp, Person};

use crate::keeper::{db_error, user_unknown, DataKeeper};

/// Seconds per day; secret lifetimes arrive as (fractional) days.
const DAY_SECONDS: f64 = 86_400.0;

/// Timestamps attached to a credential write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretStamp {
    pub secret_changed: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_expiration: Option<i64>,
}

/// A registration record as exposed to callers, optionally enriched with
/// application-specific extras.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationDetails {
    pub user_id: String,
    pub readable_name: String,
    pub secret_changed: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_expiration: Option<i64>,
    pub session_max: u32,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// `(by, at)` audit entries, oldest first.
    pub change_history: Vec<(String, i64)>,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

/// Where a fired person used to work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiredFrom {
    pub branch: String,
    pub pos: String,
}

impl DataKeeper {
    // ── Registration ──────────────────────────────────────────────────────────

    /// Register a new person. The secret is stored and compared verbatim;
    /// `ttl_days` (fractional days) sets an expiry, absent means the secret
    /// never expires.
    pub fn create_user(
        &mut self,
        user: &str,
        secret: &str,
        operator: &str,
        ttl_days: Option<f64>,
        readable_name: &str,
        session_max: Option<u32>,
    ) -> OpResult<SecretStamp> {
        if user.is_empty() || secret.is_empty() || operator.is_empty() {
            return Err(OpError::new(
                Reason::WrongFormat,
                "Required arguments not given: user_id, secret and op_id are all mandatory",
            ));
        }
        require_safe(user, "user_id")?;
        require_safe(readable_name, "readable_name")?;
        if self.org.person(user).is_some() {
            return Err(OpError::new(
                Reason::AlreadyExists,
                format!("User {user:?} is already registered"),
            )
            .detail("bad_value", Value::String(user.to_string())));
        }
        self.operator_checked(operator)?;

        let now = Self::now();
        let expire_at = ttl_days.map(|days| now + (days * DAY_SECONDS) as i64);
        self.org.people.push(Person {
            id: user.to_string(),
            secret: secret.to_string(),
            psw_changed_at: now,
            failures: 0,
            expire_at,
            readable_name: readable_name.to_string(),
            session_max: Some(session_max.unwrap_or(self.default_session_max)),
            created_by: operator.to_string(),
            created_at: Some(now),
            last_error: None,
            last_auth_success: None,
            changes: Vec::new(),
        });
        info!(user, operator, "user registered");
        self.persist_org()?;
        Ok(SecretStamp {
            secret_changed: now,
            secret_expiration: expire_at,
        })
    }

    /// Replace a person's secret (and optionally name and session cap),
    /// resetting the failure counter and appending an audit entry.
    pub fn change_user(
        &mut self,
        user: &str,
        secret: &str,
        operator: &str,
        ttl_days: Option<f64>,
        readable_name: Option<&str>,
        session_max: Option<u32>,
    ) -> OpResult<SecretStamp> {
        if user.is_empty() || secret.is_empty() || operator.is_empty() {
            return Err(OpError::new(
                Reason::WrongFormat,
                "Required arguments not given: user_id, secret and op_id are all mandatory",
            ));
        }
        require_safe(user, "user_id")?;
        if let Some(name) = readable_name {
            require_safe(name, "readable_name")?;
        }
        if self.org.person(user).is_none() {
            return Err(user_unknown(user));
        }
        self.operator_checked(operator)?;

        let now = Self::now();
        let expire_at = ttl_days.map(|days| now + (days * DAY_SECONDS) as i64);
        let person = self.org.person_mut(user).ok_or_else(|| user_unknown(user))?;
        person.secret = secret.to_string();
        person.psw_changed_at = now;
        person.failures = 0;
        person.expire_at = expire_at;
        if let Some(name) = readable_name {
            person.readable_name = name.to_string();
        }
        if session_max.is_some() {
            person.session_max = session_max;
        }
        person.changes.push(ChangeStamp {
            by: operator.to_string(),
            at: now,
        });
        info!(user, operator, "credentials changed");
        self.persist_org()?;
        Ok(SecretStamp {
            secret_changed: now,
            secret_expiration: expire_at,
        })
    }

    /// Remove a person from the register. Employed people must be fired
    /// first; the operator is validated before the target is even looked at.
    pub fn delete_user(&mut self, user: &str, operator: &str) -> OpResult<()> {
        self.operator_checked(operator)?;
        require_ident(user, "user_id")?;
        if self.org.person(user).is_none() {
            return Err(user_unknown(user));
        }
        if let Some((branch, pos)) = self.org.tree.employment_of(user) {
            return Err(OpError::new(
                Reason::UserEmployed,
                format!("User {user:?} holds position {pos:?} in branch {branch:?}, fire first"),
            ));
        }
        self.org.remove_person(user);
        info!(user, operator, "user deleted");
        self.persist_org()
    }

    /// Registered user ids, in register order.
    pub fn list_users(&self) -> Vec<String> {
        self.org.people.iter().map(|p| p.id.clone()).collect()
    }

    /// The registration record of a user, never including the secret. With
    /// an application name given, the record is enriched with what that
    /// application needs on login.
    pub fn registration_details(
        &self,
        user: &str,
        app: Option<&str>,
    ) -> OpResult<RegistrationDetails> {
        require_ident(user, "user_id")?;
        let person = self.org.person(user).ok_or_else(|| user_unknown(user))?;
        let mut details = RegistrationDetails {
            user_id: person.id.clone(),
            readable_name: person.readable_name.clone(),
            secret_changed: person.psw_changed_at,
            secret_expiration: person.expire_at,
            session_max: person.session_max.unwrap_or(self.default_session_max),
            created_by: person.created_by.clone(),
            created_at: person.created_at,
            change_history: person.changes.iter().map(|c| (c.by.clone(), c.at)).collect(),
            extras: Map::new(),
        };
        if let Some(app) = app {
            require_safe(app, "app")?;
            self.enrich_for_app(&mut details, app, user)?;
        }
        Ok(details)
    }

    /// Application login profiles. Unknown application names get the plain
    /// record plus the `for_application` echo and nothing else.
    fn enrich_for_app(
        &self,
        details: &mut RegistrationDetails,
        app: &str,
        user: &str,
    ) -> OpResult<()> {
        details
            .extras
            .insert("for_application".into(), Value::String(app.to_string()));
        match app {
            "gAP" => {
                let branches = self.user_branches(user);
                let positions = self.user_positions(user);
                let funcsets: Vec<String> =
                    user_funcsets(&self.org.tree, user).into_iter().collect();
                let mut functions = Vec::new();
                for fid in user_function_ids(&self.org.tree, &self.catalog, user) {
                    if let Some(def) = self.catalog.function(&fid) {
                        functions.push(json!({
                            "id": fid,
                            "callpath": FuncProp::CallPath.extract(def).unwrap_or_default(),
                            "method": FuncProp::Method.extract(def).unwrap_or_default(),
                        }));
                    }
                }
                let agents = match branches.first() {
                    Some(branch) => self.list_agents(Some(branch), true)?,
                    None => Vec::new(),
                };
                details.extras.insert("branches".into(), json!(branches));
                details.extras.insert("positions".into(), json!(positions));
                details.extras.insert("func_groups".into(), json!(funcsets));
                details.extras.insert("functions".into(), Value::Array(functions));
                details.extras.insert("agents".into(), json!(agents));
            }
            "thePage" => {
                let mut funcsets = Map::new();
                for fs_id in user_funcsets(&self.org.tree, user) {
                    let Some(fs) = self.org.tree.funcset(&fs_id) else {
                        continue;
                    };
                    let members: Vec<Value> = fs
                        .functions
                        .iter()
                        .map(|fid| match self.catalog.function(fid) {
                            Some(def) => json!({
                                "id": fid,
                                "name": def.name.clone().unwrap_or_default(),
                                "title": def.title.clone().unwrap_or_default(),
                            }),
                            // Stale member reference: visible, marked.
                            None => json!({
                                "id": fid,
                                "name": format!("UNDESCRIBED {fid}"),
                                "title": format!("UNDESCRIBED {fid}"),
                            }),
                        })
                        .collect();
                    funcsets.insert(
                        fs_id.clone(),
                        json!({
                            "name": fs.name.clone().unwrap_or_default(),
                            "functions": members,
                        }),
                    );
                }
                details.extras.insert("funcsets".into(), Value::Object(funcsets));
            }
            other => {
                debug!(app = other, "no enrichment profile for application");
            }
        }
        Ok(())
    }

    // ── Authorization ─────────────────────────────────────────────────────────

    /// Check a user's secret. A mismatch or an expired secret bumps the
    /// failure counter and stamps `last_error`; success resets the counter
    /// and stamps `last_auth_success`. Both outcomes persist immediately, so
    /// the counter survives restarts.
    pub fn authorize(
        &mut self,
        user: &str,
        secret: &str,
        app: Option<&str>,
    ) -> OpResult<RegistrationDetails> {
        if secret.is_empty() {
            return Err(OpError::missing("secret"));
        }
        let details = self.registration_details(user, app)?;
        let now = Self::now();
        let person = self.org.person_mut(user).ok_or_else(|| user_unknown(user))?;

        if person.secret != secret {
            person.failures += 1;
            person.last_error = Some(now);
            let failures = person.failures;
            self.persist_org()?;
            return Err(OpError::new(
                Reason::WrongSecret,
                format!("Wrong secret given for user {user:?}"),
            )
            .detail("failures", Value::from(failures)));
        }
        if let Some(expire) = person.expire_at {
            if expire < now {
                person.failures += 1;
                person.last_error = Some(now);
                let failures = person.failures;
                self.persist_org()?;
                return Err(OpError::new(
                    Reason::SecretExpired,
                    format!("Secret of user {user:?} has expired"),
                )
                .detail("secret_expiration", Value::from(expire))
                .detail("failures", Value::from(failures)));
            }
        }
        person.failures = 0;
        person.last_auth_success = Some(now);
        self.persist_org()?;
        debug!(user, "authorized");
        Ok(details)
    }

    // ── Employment ────────────────────────────────────────────────────────────

    /// Put a registered, currently unemployed person into a vacant slot.
    /// The operator must manage the target branch, i.e. be employed at it or
    /// at one of its ancestors. The vacancy is checked before the operator's
    /// standing.
    pub fn hire_employee(
        &mut self,
        user: &str,
        branch: &str,
        pos: &str,
        operator: &str,
    ) -> OpResult<()> {
        require_ident(user, "user_id")?;
        require_ident(pos, "pos")?;
        if self.org.person(user).is_none() {
            return Err(user_unknown(user));
        }
        if let Some((cur_branch, cur_pos)) = self.org.tree.employment_of(user) {
            return Err(OpError::new(
                Reason::AlreadyEmployed,
                format!("User {user:?} already holds position {cur_pos:?} in branch {cur_branch:?}"),
            ));
        }
        let node = self.branch_checked(branch, "branch_id")?;
        let (_, vacant) = node.slot_counts(pos);
        if vacant == 0 {
            return Err(OpError::new(
                Reason::NoVacantPositions,
                format!("No vacant positions {pos:?} in branch {branch:?}"),
            ));
        }
        let op_branch = self.operator_branch(operator)?;
        if !self.org.tree.in_subtree(&op_branch, branch) {
            return Err(OpError::new(
                Reason::ForbiddenForOp,
                format!("Branch {branch:?} is not managed by operator {operator:?}"),
            ));
        }
        let node = self
            .org
            .tree
            .branch_mut(branch)
            .ok_or_else(|| crate::keeper::branch_unknown(branch))?;
        if let Some(slot) = node.employees.iter_mut().find(|s| s.pos == pos && s.is_vacant()) {
            slot.person = Some(user.to_string());
        }
        info!(user, branch, pos, operator, "employee hired");
        self.persist_org()
    }

    /// Vacate the slot a person occupies. The operator must manage the
    /// employing branch. People occupying a slot without a register entry
    /// (stale data) can still be fired.
    pub fn fire_employee(&mut self, user: &str, operator: &str) -> OpResult<FiredFrom> {
        require_ident(user, "user_id")?;
        let Some((branch, pos)) = self.org.tree.employment_of(user) else {
            return Err(OpError::new(
                Reason::AlreadyUnemployed,
                format!("User {user:?} is not employed"),
            ));
        };
        let op_branch = self.operator_branch(operator)?;
        if !self.org.tree.in_subtree(&op_branch, &branch) {
            return Err(OpError::new(
                Reason::ForbiddenForOp,
                format!("Branch {branch:?} is not managed by operator {operator:?}"),
            ));
        }
        let node = self
            .org
            .tree
            .branch_mut(&branch)
            .ok_or_else(|| db_error(format!("employing branch {branch:?} vanished")))?;
        if let Some(slot) = node
            .employees
            .iter_mut()
            .find(|s| s.person.as_deref() == Some(user))
        {
            slot.person = None;
        }
        info!(user, branch = %branch, pos = %pos, operator, "employee fired");
        self.persist_org()?;
        Ok(FiredFrom { branch, pos })
    }
}
