//! Scope vocabulary and `scope` parameter parsing

use crate::oauth::error::OAuthError;

/// Every scope this server knows about.
pub const SUPPORTED_SCOPES: &[&str] = &[
    "read",
    "write",
    "email",
    "profile",
    "offline_access",
    "openid",
];

pub fn is_supported_scope(scope: &str) -> bool {
    SUPPORTED_SCOPES.contains(&scope)
}

/// Check a list of scopes against the vocabulary, rejecting duplicates.
pub fn validate_scopes(scopes: &[String]) -> Result<(), OAuthError> {
    for (i, scope) in scopes.iter().enumerate() {
        if !is_supported_scope(scope) {
            return Err(OAuthError::invalid_scope(format!("Unknown scope: {}", scope)));
        }
        if scopes[..i].contains(scope) {
            return Err(OAuthError::invalid_scope(format!("Duplicate scope: {}", scope)));
        }
    }
    Ok(())
}

/// Parse a space-delimited `scope` parameter, preserving request order.
///
/// The result is non-empty, contains only supported scopes, and has no duplicates.
pub fn parse_scope(scope: &str) -> Result<Vec<String>, OAuthError> {
    // RFC 6749 Section 3.3 delimits with single spaces; tolerate runs of them
    let scopes: Vec<String> = scope
        .split(' ')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if scopes.is_empty() {
        return Err(OAuthError::invalid_scope("scope is required"));
    }

    validate_scopes(&scopes)?;
    Ok(scopes)
}
