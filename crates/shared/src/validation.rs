use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

static EMAIL_SHAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\S+@\S+\.\S+").ok());

/// Loose shape check, `\S+@\S+\.\S+` anywhere in the input.
pub fn is_plausible_email(address: &str) -> bool {
    EMAIL_SHAPE
        .as_ref()
        .is_some_and(|shape| shape.is_match(address))
}

pub fn validate_email_address(address: &str) -> Result<(), ValidationError> {
    if address.trim().is_empty() {
        return Err(ValidationError::MissingAddress);
    }
    if !is_plausible_email(address) {
        return Err(ValidationError::InvalidAddress {
            address: address.to_string(),
        });
    }
    Ok(())
}
