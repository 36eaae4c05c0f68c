//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{PermissionsError, PermissionsResult};

const MAX_ROLE_NAME_LEN: usize = 64;
const MAX_USER_NAME_LEN: usize = 256;

/// Control, format and unassigned code points never allowed in a name
fn disallowed_chars() -> Option<&'static Regex> {
    static DISALLOWED: OnceLock<Option<Regex>> = OnceLock::new();
    DISALLOWED.get_or_init(|| Regex::new(r"\p{C}").ok()).as_ref()
}

fn has_disallowed_chars(value: &str) -> bool {
    match disallowed_chars() {
        Some(regex) => regex.is_match(value),
        None => value.chars().any(char::is_control),
    }
}

/// Validate a role name and return it trimmed
pub fn validate_role_name(name: &str) -> Result<&str, String> {
    let name = name.trim();

    if name.is_empty() {
        return Err("Role name is required".to_string());
    }

    if name.chars().count() > MAX_ROLE_NAME_LEN {
        return Err(format!(
            "Role name must be at most {} characters long",
            MAX_ROLE_NAME_LEN
        ));
    }

    if has_disallowed_chars(name) {
        return Err("Role name cannot contain control characters".to_string());
    }

    Ok(name)
}

/// Validate a user account name and return it trimmed
pub fn validate_user_name(user_name: &str) -> Result<&str, String> {
    let user_name = user_name.trim();

    if user_name.is_empty() {
        return Err("User name is required".to_string());
    }

    if user_name.len() > MAX_USER_NAME_LEN {
        return Err(format!(
            "User name must be at most {} bytes long",
            MAX_USER_NAME_LEN
        ));
    }

    if has_disallowed_chars(user_name) {
        return Err("User name cannot contain control characters".to_string());
    }

    Ok(user_name)
}

pub(crate) fn role_name(name: &str) -> PermissionsResult<&str> {
    validate_role_name(name).map_err(PermissionsError::InvalidInput)
}

pub(crate) fn user_name(user_name: &str) -> PermissionsResult<&str> {
    validate_user_name(user_name).map_err(PermissionsError::InvalidInput)
}
