//! Strict `$VAR` pre-expansion
//!
//! Optionally runs before token discovery. Strict mode: a referenced
//! environment variable that is unset or set-but-empty fails the whole
//! operation. Names starting with a digit are not treated as variables and
//! pass through untouched.

use crate::errors::{ConfigManagerError, Result};
use std::fmt;

/// Lookup failure inside the expansion context
#[derive(Debug)]
struct VarLookupError {
    message: String,
}

impl fmt::Display for VarLookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Expand every `$VAR` / `${VAR}` reference in `input` from the environment
pub fn expand(input: &str) -> Result<String> {
    shellexpand::env_with_context(input, strict_context)
        .map(|expanded| expanded.into_owned())
        .map_err(|err| ConfigManagerError::env_subst(err.to_string()))
}

fn strict_context(var: &str) -> std::result::Result<Option<String>, VarLookupError> {
    if var.starts_with(|c: char| c.is_ascii_digit()) {
        // positional-style references are left as literal text
        return Ok(None);
    }
    match std::env::var(var) {
        Ok(value) if value.is_empty() => Err(VarLookupError {
            message: format!("variable {} is set but empty", var),
        }),
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(VarLookupError { message: format!("variable {} is not set", var) }),
    }
}
