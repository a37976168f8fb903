//! Allow-list validation for values that end up in shell text.
//!
//! Every user-supplied token passes through [`identifier`] or
//! [`shell_quote`] before it is interpolated into a command.

use std::borrow::Cow;

use crate::error::HandlerError;

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '@' | ':' | '/' | '-')
}

/// Accept `value` only if it is non-empty, does not look like an option and
/// consists solely of `[A-Za-z0-9._+@:/-]`.
///
/// # Errors
///
/// Returns [`HandlerError::UnsafeIdentifier`] otherwise.
pub fn identifier<'a>(what: &str, value: &'a str) -> Result<&'a str, HandlerError> {
    if value.is_empty() || value.starts_with('-') || !value.chars().all(is_safe_char) {
        return Err(HandlerError::UnsafeIdentifier {
            what: what.to_string(),
            value: value.to_string(),
        });
    }
    Ok(value)
}

/// Validate every entry of `values` with [`identifier`].
///
/// # Errors
///
/// Returns the first rejection.
pub fn identifiers(what: &str, values: &[String]) -> Result<(), HandlerError> {
    values.iter().try_for_each(|v| identifier(what, v).map(|_| ()))
}

/// Quote `value` for POSIX `sh`. Values made only of safe characters are
/// returned unchanged.
#[must_use]
pub fn shell_quote(value: &str) -> Cow<'_, str> {
    if !value.is_empty() && value.chars().all(is_safe_char) {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("'{}'", value.replace('\'', r"'\''")))
    }
}

/// Parse a 3 or 4 digit octal permission string.
///
/// # Errors
///
/// Returns [`HandlerError::InvalidParameter`] for anything else.
pub fn permissions(value: &str) -> Result<u32, HandlerError> {
    let valid = (3..=4).contains(&value.len()) && value.chars().all(|c| ('0'..='7').contains(&c));
    if !valid {
        return Err(HandlerError::InvalidParameter {
            param: "permissions".to_string(),
            value: value.to_string(),
            reason: "expected 3 or 4 octal digits".to_string(),
        });
    }
    u32::from_str_radix(value, 8).map_err(|e| HandlerError::InvalidParameter {
        param: "permissions".to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Loose URL check: non-empty, not an option, no whitespace or control
/// characters. The value is still quoted before use.
///
/// # Errors
///
/// Returns [`HandlerError::UnsafeIdentifier`] otherwise.
pub fn url<'a>(what: &str, value: &'a str) -> Result<&'a str, HandlerError> {
    if value.is_empty()
        || value.starts_with('-')
        || value.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(HandlerError::UnsafeIdentifier {
            what: what.to_string(),
            value: value.to_string(),
        });
    }
    Ok(value)
}
