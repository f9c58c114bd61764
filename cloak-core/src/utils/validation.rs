//! Input validation constants and utilities

use std::sync::OnceLock;

use regex::Regex;

/// Maximum lengths for various fields
pub const MAX_USERNAME_LENGTH: usize = 80;
pub const MAX_MESSAGE_LENGTH: usize = 10000;

fn username_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z0-9_.\-]+$").ok())
        .as_ref()
}

/// Canonical form used for every identity comparison and cache key
pub fn normalize_username(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Validate a username, returning its normalized form
pub fn validate_username(name: &str) -> Result<String, String> {
    let normalized = normalize_username(name);

    if normalized.is_empty() {
        return Err("Username cannot be empty".to_string());
    }
    if normalized.chars().count() > MAX_USERNAME_LENGTH {
        return Err(format!(
            "Username too long (max {} characters)",
            MAX_USERNAME_LENGTH
        ));
    }
    // Fails closed if the pattern is unavailable
    if !username_pattern().is_some_and(|p| p.is_match(&normalized)) {
        return Err(
            "Username can only contain letters, digits, '.', '_' and '-'".to_string(),
        );
    }
    Ok(normalized)
}
