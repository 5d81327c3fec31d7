//! Identifier hygiene at operation boundaries.
//!
//! Historically identifiers were spliced into path-query expressions over
//! the document tree, so anything outside a narrow character class could
//! redirect a lookup to an unintended node. Lookups are indexed maps now,
//! but the character-class gate stays: every externally supplied identifier
//! (branch id, funcset id, function id, role name, user id, operator id,
//! position name) is checked here before it reaches the store.

use crate::error::{OpError, Reason};

/// Maximum accepted identifier length, in characters.
pub const MAX_IDENT_CHARS: usize = 256;

/// True if `value` consists only of letters, digits, `_ - . @ +` and spaces,
/// and is at most [`MAX_IDENT_CHARS`] characters long. The empty string is
/// safe (emptiness is a separate check, see [`require_ident`]).
pub fn is_safe_ident(value: &str) -> bool {
    let mut chars = 0usize;
    for c in value.chars() {
        chars += 1;
        if chars > MAX_IDENT_CHARS {
            return false;
        }
        if !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '@' | '+' | ' ')) {
            return false;
        }
    }
    true
}

/// Reject unsafe characters in `value`; `what` names the parameter for the
/// error message. Empty values pass — combine with [`require_ident`] for
/// mandatory parameters.
pub fn require_safe(value: &str, what: &str) -> Result<(), OpError> {
    if is_safe_ident(value) {
        Ok(())
    } else {
        Err(OpError::new(
            Reason::WrongFormat,
            format!("Unsafe characters in {what}: {value:?}"),
        ))
    }
}

/// Require a non-empty, safe identifier.
pub fn require_ident(value: &str, what: &str) -> Result<(), OpError> {
    if value.is_empty() {
        return Err(OpError::missing(what));
    }
    require_safe(value, what)
}
