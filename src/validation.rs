use std::path::Path;

use colored::Colorize;
use inquire::Text;

use crate::{account::AccountRecord, error::AppError};

/// Maximum length for Git username
const MAX_USERNAME_LENGTH: usize = 100;

/// Prompts user for input until valid input is provided
pub fn prompt_until_valid<F>(prompt_message: &str, input_validation: F) -> Result<String, AppError>
where
    F: Fn(&str) -> Result<(), AppError>,
{
    loop {
        let input: String = Text::new(prompt_message).prompt()?;
        let input = input.trim().to_string();
        match input_validation(&input) {
            Ok(_) => break Ok(input),
            Err(AppError::Validation(msg)) => println!("{}", msg.red()),
            Err(e) => return Err(e),
        }
    }
}

// Validate input helper functions

/// Validates a display name, which becomes `user.name`
pub fn validate_display_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        Err(AppError::Validation("Name cannot be empty".to_string()))
    } else if name.chars().count() > MAX_USERNAME_LENGTH {
        Err(AppError::Validation(format!(
            "Name too long, max {} characters",
            MAX_USERNAME_LENGTH
        )))
    } else if name.contains(['\n', '\r']) {
        Err(AppError::Validation("Name cannot span lines".to_string()))
    } else {
        Ok(())
    }
}

/// Validates an email; anything non-empty on one line is accepted
pub fn validate_email(
    email: &str,
    existing: &[AccountRecord],
    skip_id: Option<u64>,
) -> Result<(), AppError> {
    if email.trim().is_empty() {
        Err(AppError::Validation("Email cannot be empty".to_string()))
    } else if email.contains(['\n', '\r']) {
        Err(AppError::Validation("Email cannot span lines".to_string()))
    } else if existing
        .iter()
        .any(|account| Some(account.id) != skip_id && account.email == email)
    {
        Err(AppError::Validation("Email already exists".to_string()))
    } else {
        Ok(())
    }
}

/// Validates a private key path: absolute and not owned by another account
pub fn validate_key_path(key_path: &Path, existing: &[AccountRecord]) -> Result<(), AppError> {
    if !key_path.is_absolute() {
        Err(AppError::Validation(format!(
            "Key path must be absolute: '{}'",
            key_path.display()
        )))
    } else if let Some(owner) = existing.iter().find(|account| account.key_path == key_path) {
        Err(AppError::Validation(format!(
            "Key path already used by account {}",
            owner.id
        )))
    } else {
        Ok(())
    }
}
