use crate::utils::error::{PortalError, Result};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Upper bound for any single step timeout.
pub const MAX_TIMEOUT_SECONDS: u64 = 600;

fn invalid(field: &str, value: impl ToString, reason: &str) -> PortalError {
    PortalError::InvalidConfigValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// A file the process reads or writes: non-empty, no NUL bytes, not a directory path.
pub fn validate_file_path(field: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(invalid(field, path, "path cannot be empty"));
    }
    if path.contains('\0') {
        return Err(invalid(field, path.escape_debug(), "path contains NUL bytes"));
    }
    if path.ends_with('/') || path.ends_with(std::path::MAIN_SEPARATOR) {
        return Err(invalid(field, path, "path names a directory, not a file"));
    }
    Ok(())
}

/// Step timeouts: at least one second, at most [`MAX_TIMEOUT_SECONDS`].
pub fn validate_timeout_seconds(field: &str, seconds: u64) -> Result<()> {
    match seconds {
        0 => Err(invalid(field, seconds, "timeout must be at least 1 second")),
        s if s > MAX_TIMEOUT_SECONDS => {
            Err(invalid(field, seconds, "timeout must be at most 600 seconds"))
        }
        _ => Ok(()),
    }
}

/// Environment variable names: ASCII letters, digits and underscores, not starting with a digit.
pub fn validate_env_var_name(field_name: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(invalid(field_name, name, "not a valid environment variable name"))
    }
}
