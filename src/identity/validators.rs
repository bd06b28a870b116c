//! Input validators for registration
//!
//! Identity documents are normalised (trimmed, upper-cased) before matching,
//! and the document kind is inferred from whichever pattern matches.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::ValidationError;
use crate::models::IdentityDocument;

// =============================================================================
// PATTERNS
// =============================================================================

/// National identification number, e.g. `00F7STR2`
static NIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}[A-Z]\d[A-Z]{3}\d$").unwrap());

/// Passport number, e.g. `SLR124311` or `ER361085`
static PASSPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2,3}\d{6}$").unwrap());

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());

const PHONE_PREFIX: &str = "+232";
const PHONE_LENGTH: usize = 12;

// =============================================================================
// VALIDATORS
// =============================================================================

pub fn parse_identity_document(raw: &str) -> Result<IdentityDocument, ValidationError> {
    let value = raw.trim().to_ascii_uppercase();
    if NIN_RE.is_match(&value) {
        return Ok(IdentityDocument::Nin(value));
    }
    if PASSPORT_RE.is_match(&value) {
        return Ok(IdentityDocument::Passport(value));
    }
    Err(ValidationError::new(
        "identity_number",
        "Enter a valid NIN (e.g. 00F7STR2) or passport number (e.g. SLR124311)",
    ))
}

/// Phone numbers are `+232` followed by eight digits.
pub fn validate_phone(raw: &str) -> Result<String, ValidationError> {
    let value = raw.trim();
    if !value.starts_with(PHONE_PREFIX) {
        return Err(ValidationError::new(
            "phone_number",
            "Phone number must start with +232",
        ));
    }
    if value.len() != PHONE_LENGTH || !value[1..].chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new(
            "phone_number",
            "Phone number must follow +232XXXXXXXX format",
        ));
    }
    Ok(value.to_string())
}

pub fn validate_email(raw: &str) -> Result<String, ValidationError> {
    let value = raw.trim().to_ascii_lowercase();
    if EMAIL_RE.is_match(&value) {
        Ok(value)
    } else {
        Err(ValidationError::new("email", "Enter a valid email address"))
    }
}

pub fn require_name(field: &str, raw: &str) -> Result<String, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::new(field, "This field may not be blank"));
    }
    if value.chars().count() > 150 {
        return Err(ValidationError::new(field, "Ensure this field has at most 150 characters"));
    }
    Ok(value.to_string())
}

/// Canonical `+232` form of a phone number typed at login.
///
/// Accepts the local `0XX XXX XXX` form and `00232`/`232` prefixes; anything
/// else comes back with separators stripped and is matched as typed.
pub fn normalize_login_phone(raw: &str) -> String {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    if let Some(rest) = compact.strip_prefix("00232") {
        return format!("{}{}", PHONE_PREFIX, rest);
    }
    if compact.starts_with("232") {
        return format!("+{}", compact);
    }
    match compact.strip_prefix('0') {
        Some(rest) if rest.len() == PHONE_LENGTH - PHONE_PREFIX.len() => {
            format!("{}{}", PHONE_PREFIX, rest)
        }
        _ => compact,
    }
}
