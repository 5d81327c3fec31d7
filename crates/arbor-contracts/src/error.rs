//! Structured operation outcomes for the arbor domain layer.
//!
//! Every domain operation returns `OpResult<T>`. A failure is never an
//! uncaught fault: it is an [`OpError`] carrying a [`Reason`] from the fixed
//! vocabulary, a human-readable warning, and optional extra fields
//! (`bad_value`, `fire_them`, `failures`, …) that the transport layer
//! serializes verbatim.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

/// The fixed failure vocabulary shared by every operation.
///
/// The wire form is the SCREAMING-KEBAB string (`"WRONG-FORMAT"`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reason {
    #[serde(rename = "WRONG-FORMAT")]
    WrongFormat,
    #[serde(rename = "WRONG-DATA")]
    WrongData,
    #[serde(rename = "USER-UNKNOWN")]
    UserUnknown,
    #[serde(rename = "WRONG-SECRET")]
    WrongSecret,
    #[serde(rename = "SECRET-EXPIRED")]
    SecretExpired,
    #[serde(rename = "ALREADY-EXISTS")]
    AlreadyExists,
    #[serde(rename = "USER-EMPLOYED")]
    UserEmployed,
    #[serde(rename = "ALREADY-UNEMPLOYED")]
    AlreadyUnemployed,
    #[serde(rename = "ALREADY-EMPLOYED")]
    AlreadyEmployed,
    #[serde(rename = "NO-VACANT-POSITIONS")]
    NoVacantPositions,
    #[serde(rename = "FUNCTION-UNKNOWN")]
    FunctionUnknown,
    #[serde(rename = "FUNCSET-UNKNOWN")]
    FuncsetUnknown,
    #[serde(rename = "ROLE-UNKNOWN")]
    RoleUnknown,
    #[serde(rename = "PROP-UNKNOWN")]
    PropUnknown,
    #[serde(rename = "BRANCH-UNKNOWN")]
    BranchUnknown,
    #[serde(rename = "AGENT-UNKNOWN")]
    AgentUnknown,
    #[serde(rename = "NOT-IN-SET")]
    NotInSet,
    #[serde(rename = "NOT-ALLOWED")]
    NotAllowed,
    #[serde(rename = "DATABASE-ERROR")]
    DatabaseError,
    #[serde(rename = "OP-UNKNOWN")]
    OpUnknown,
    #[serde(rename = "OP-UNAUTHORIZED")]
    OpUnauthorized,
    #[serde(rename = "OPERATOR-UNKNOWN")]
    OperatorUnknown,
    #[serde(rename = "FORBIDDEN-FOR-OP")]
    ForbiddenForOp,
}

impl Reason {
    /// The wire representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::WrongFormat => "WRONG-FORMAT",
            Reason::WrongData => "WRONG-DATA",
            Reason::UserUnknown => "USER-UNKNOWN",
            Reason::WrongSecret => "WRONG-SECRET",
            Reason::SecretExpired => "SECRET-EXPIRED",
            Reason::AlreadyExists => "ALREADY-EXISTS",
            Reason::UserEmployed => "USER-EMPLOYED",
            Reason::AlreadyUnemployed => "ALREADY-UNEMPLOYED",
            Reason::AlreadyEmployed => "ALREADY-EMPLOYED",
            Reason::NoVacantPositions => "NO-VACANT-POSITIONS",
            Reason::FunctionUnknown => "FUNCTION-UNKNOWN",
            Reason::FuncsetUnknown => "FUNCSET-UNKNOWN",
            Reason::RoleUnknown => "ROLE-UNKNOWN",
            Reason::PropUnknown => "PROP-UNKNOWN",
            Reason::BranchUnknown => "BRANCH-UNKNOWN",
            Reason::AgentUnknown => "AGENT-UNKNOWN",
            Reason::NotInSet => "NOT-IN-SET",
            Reason::NotAllowed => "NOT-ALLOWED",
            Reason::DatabaseError => "DATABASE-ERROR",
            Reason::OpUnknown => "OP-UNKNOWN",
            Reason::OpUnauthorized => "OP-UNAUTHORIZED",
            Reason::OperatorUnknown => "OPERATOR-UNKNOWN",
            Reason::ForbiddenForOp => "FORBIDDEN-FOR-OP",
        }
    }

    /// The HTTP status a transport layer should send for this code.
    pub fn http_status(&self) -> u16 {
        status_for_reason(self.as_str())
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a reason string to an HTTP status code.
///
/// Strings absent from the table keep the success status: the transport
/// sends them as 200. `ALREADY-EMPLOYED` and `NO-VACANT-POSITIONS` are
/// deliberately absent — they have always travelled as 200 and callers
/// depend on that.
pub fn status_for_reason(reason: &str) -> u16 {
    match reason {
        "WRONG-FORMAT" | "WRONG-DATA" => 400,
        "USER-UNKNOWN" | "OP-UNKNOWN" | "OP-UNAUTHORIZED" | "OPERATOR-UNKNOWN" => 401,
        "WRONG-SECRET" | "SECRET-EXPIRED" | "ALREADY-EXISTS" | "USER-EMPLOYED"
        | "ALREADY-UNEMPLOYED" | "FORBIDDEN-FOR-OP" => 403,
        "FUNCTION-UNKNOWN" | "FUNCSET-UNKNOWN" | "ROLE-UNKNOWN" | "PROP-UNKNOWN"
        | "BRANCH-UNKNOWN" | "AGENT-UNKNOWN" | "NOT-IN-SET" => 404,
        "NOT-ALLOWED" => 405,
        "DATABASE-ERROR" => 500,
        _ => 200,
    }
}

/// A structured domain failure.
///
/// Construction logs the warning once, so call sites do not have to.
#[derive(Debug, Clone, Error)]
#[error("{reason}: {message}")]
pub struct OpError {
    pub reason: Reason,
    pub message: String,
    /// Operation-specific extra fields, flattened into the API payload.
    pub details: Map<String, Value>,
}

impl OpError {
    pub fn new(reason: Reason, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(reason = reason.as_str(), %message, "operation failed");
        Self {
            reason,
            message,
            details: Map::new(),
        }
    }

    /// Attach one extra field to the failure payload.
    pub fn detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    /// `WRONG-FORMAT` for a missing required argument.
    pub fn missing(what: &str) -> Self {
        Self::new(
            Reason::WrongFormat,
            format!("Required argument not given: {what}"),
        )
    }

    /// The JSON object the transport layer sends for this failure:
    /// `{result: false, reason, warning, ...details}`.
    pub fn to_api(&self) -> Value {
        let mut map = Map::new();
        map.insert("result".into(), Value::Bool(false));
        map.insert("reason".into(), Value::String(self.reason.as_str().into()));
        map.insert("warning".into(), Value::String(self.message.clone()));
        for (k, v) in &self.details {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}

/// Convenience alias used throughout the arbor crates.
pub type OpResult<T> = Result<T, OpError>;
