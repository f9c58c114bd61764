//! Input DTOs with garde validation.
//!
//! User-initiated operations are validated here before any key lookup or
//! encryption happens.

use garde::Validate;

use crate::utils::validation::{validate_username, MAX_MESSAGE_LENGTH};

/// Custom validation for message bodies
fn validate_not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("Message cannot be blank"));
    }
    Ok(())
}

/// Custom validation for an optional direct-message recipient
fn validate_recipient(value: &Option<String>, _ctx: &()) -> garde::Result {
    match value {
        Some(name) => validate_username(name).map(|_| ()).map_err(garde::Error::new),
        None => Ok(()),
    }
}

/// Input for sending a message; `recipient` set means a directed message
#[derive(Debug, Validate)]
#[garde(context(()))]
pub struct SendInput {
    #[garde(length(min = 1, max = MAX_MESSAGE_LENGTH), custom(validate_not_blank))]
    pub body: String,
    #[garde(custom(validate_recipient))]
    pub recipient: Option<String>,
}

/// Helper trait to convert garde validation errors to String
pub trait ValidateExt {
    fn validate_input(&self) -> Result<(), String>;
}

impl<T: Validate<Context = ()>> ValidateExt for T {
    fn validate_input(&self) -> Result<(), String> {
        self.validate().map_err(|e| e.to_string())
    }
}
