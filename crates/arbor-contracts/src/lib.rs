//! # arbor-contracts
//!
//! Shared vocabulary for the arbor authorization server.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate — only the failure vocabulary, the structured operation error,
//! the identifier sanitizer, and tag-set normalization.

pub mod error;
pub mod ident;
pub mod tags;

pub use error::{status_for_reason, OpError, OpResult, Reason};
pub use ident::{is_safe_ident, require_ident, require_safe, MAX_IDENT_CHARS};
pub use tags::{join_tags, normalize_tags, split_tags, TagSetOp};

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    // ── Identifier sanitizer ──────────────────────────────────────────────────

    #[test]
    fn safe_ident_accepts_the_allowed_class() {
        for ok in [
            "b1",
            "branch-7",
            "mail.user@example",
            "name with space",
            "plus+suffix",
            "under_score",
            "Ünïcode Büro 42",
            "",
        ] {
            assert!(is_safe_ident(ok), "{ok:?} must be accepted");
        }
    }

    #[test]
    fn safe_ident_rejects_query_metacharacters() {
        for bad in [
            "a'b",
            "x\"y",
            "a/b",
            "a[b]",
            "a=b",
            "a,b",
            "a;b",
            "a*b",
            "a\nb",
        ] {
            assert!(!is_safe_ident(bad), "{bad:?} must be rejected");
        }
    }

    #[test]
    fn safe_ident_enforces_the_length_cap() {
        let at_cap = "x".repeat(MAX_IDENT_CHARS);
        let over_cap = "x".repeat(MAX_IDENT_CHARS + 1);
        assert!(is_safe_ident(&at_cap));
        assert!(!is_safe_ident(&over_cap));
    }

    #[test]
    fn require_ident_distinguishes_empty_from_unsafe() {
        let empty = require_ident("", "branch").unwrap_err();
        assert_eq!(empty.reason, Reason::WrongFormat);
        assert!(empty.message.contains("Required argument not given"));

        let unsafe_id = require_ident("a'--", "branch").unwrap_err();
        assert_eq!(unsafe_id.reason, Reason::WrongFormat);
        assert!(unsafe_id.message.contains("Unsafe characters"));
    }

    // ── Tag sets ──────────────────────────────────────────────────────────────

    #[test]
    fn tags_normalize_sorted_unique_without_blanks() {
        assert_eq!(normalize_tags("a,b,,a"), "a,b");
        assert_eq!(normalize_tags(" c , b ,a,"), "a,b,c");
        assert_eq!(normalize_tags(""), "");
        assert_eq!(normalize_tags(" , ,"), "");
    }

    #[test]
    fn tag_set_ops_behave_as_set_algebra() {
        let current = split_tags("a,b,c");
        let operand = split_tags("b,c,d");

        assert_eq!(join_tags(&TagSetOp::Set.apply(&current, &operand)), "b,c,d");
        assert_eq!(join_tags(&TagSetOp::Or.apply(&current, &operand)), "a,b,c,d");
        assert_eq!(join_tags(&TagSetOp::And.apply(&current, &operand)), "b,c");
        assert_eq!(join_tags(&TagSetOp::Minus.apply(&current, &operand)), "a");
    }

    #[test]
    fn tag_set_op_parses_only_the_four_names() {
        assert_eq!(TagSetOp::from_str("SET").unwrap(), TagSetOp::Set);
        assert_eq!(TagSetOp::from_str("OR").unwrap(), TagSetOp::Or);
        assert_eq!(TagSetOp::from_str("AND").unwrap(), TagSetOp::And);
        assert_eq!(TagSetOp::from_str("MINUS").unwrap(), TagSetOp::Minus);

        let err = TagSetOp::from_str("XOR").unwrap_err();
        assert_eq!(err.reason, Reason::WrongFormat);
        assert_eq!(
            err.details.get("wrong_value"),
            Some(&serde_json::Value::String("XOR".into()))
        );
    }

    // ── Reason codes and transport mapping ────────────────────────────────────

    #[test]
    fn reason_status_table() {
        assert_eq!(Reason::WrongFormat.http_status(), 400);
        assert_eq!(Reason::WrongData.http_status(), 400);
        assert_eq!(Reason::UserUnknown.http_status(), 401);
        assert_eq!(Reason::OpUnknown.http_status(), 401);
        assert_eq!(Reason::OperatorUnknown.http_status(), 401);
        assert_eq!(Reason::WrongSecret.http_status(), 403);
        assert_eq!(Reason::SecretExpired.http_status(), 403);
        assert_eq!(Reason::AlreadyExists.http_status(), 403);
        assert_eq!(Reason::UserEmployed.http_status(), 403);
        assert_eq!(Reason::ForbiddenForOp.http_status(), 403);
        assert_eq!(Reason::FuncsetUnknown.http_status(), 404);
        assert_eq!(Reason::NotInSet.http_status(), 404);
        assert_eq!(Reason::NotAllowed.http_status(), 405);
        assert_eq!(Reason::DatabaseError.http_status(), 500);
    }

    /// Codes outside the table travel as success status — an observed wire
    /// behavior callers rely on, not an oversight.
    #[test]
    fn unmapped_reasons_default_to_success_status() {
        assert_eq!(status_for_reason("ALREADY-EMPLOYED"), 200);
        assert_eq!(status_for_reason("NO-VACANT-POSITIONS"), 200);
        assert_eq!(status_for_reason("SOMETHING-NEW"), 200);
    }

    #[test]
    fn reason_serializes_as_wire_string() {
        let json = serde_json::to_string(&Reason::ForbiddenForOp).unwrap();
        assert_eq!(json, "\"FORBIDDEN-FOR-OP\"");
        let back: Reason = serde_json::from_str("\"NOT-IN-SET\"").unwrap();
        assert_eq!(back, Reason::NotInSet);
    }

    // ── OpError payloads ──────────────────────────────────────────────────────

    #[test]
    fn op_error_api_payload_flattens_details() {
        let err = OpError::new(Reason::UserEmployed, "Branch 'b2' still has employees")
            .detail("fire_them", serde_json::json!(["u1", "u2"]));
        let api = err.to_api();

        assert_eq!(api["result"], serde_json::json!(false));
        assert_eq!(api["reason"], serde_json::json!("USER-EMPLOYED"));
        assert_eq!(api["warning"], serde_json::json!("Branch 'b2' still has employees"));
        assert_eq!(api["fire_them"], serde_json::json!(["u1", "u2"]));
    }
}
