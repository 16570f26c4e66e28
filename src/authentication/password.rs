use crate::{error::ApiError, COMMON_PASSWORDS, DEFAULT_PASSWORD_MIN_LENGTH};

/// Strength rules applied to every new password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordRules {
    pub min_length: usize,
    pub reject_numeric: bool,
    pub reject_common: bool,
    pub reject_user_attributes: bool,
}

impl Default for PasswordRules {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_PASSWORD_MIN_LENGTH,
            reject_numeric: true,
            reject_common: true,
            reject_user_attributes: true,
        }
    }
}

impl PasswordRules {
    /// `attributes` are the user's own identifiers (username, email, names).
    /// Every violated rule is reported in a single error.
    pub fn validate(&self, password: &str, attributes: &[&str]) -> Result<(), ApiError> {
        let mut problems: Vec<String> = vec![];

        if password.chars().count() < self.min_length {
            problems.push(format!(
                "This password is too short. It must contain at least {} characters.",
                self.min_length
            ));
        }

        if self.reject_numeric && !password.is_empty() && password.chars().all(|c| c.is_ascii_digit())
        {
            problems.push(String::from("This password is entirely numeric."));
        }

        if self.reject_common {
            let lowered = password.to_lowercase();
            if COMMON_PASSWORDS.iter().any(|common| *common == lowered) {
                problems.push(String::from("This password is too common."));
            }
        }

        if self.reject_user_attributes && resembles_any(password, attributes) {
            problems.push(String::from(
                "The password is too similar to your personal information.",
            ));
        }

        match problems.is_empty() {
            true => Ok(()),
            false => Err(ApiError::Validation(problems.join(" "))),
        }
    }
}

fn resembles_any(password: &str, attributes: &[&str]) -> bool {
    let password = password.to_lowercase();

    attributes
        .iter()
        .flat_map(|attribute| {
            // emails are compared by their local part as well
            let attribute = attribute.to_lowercase();
            let local = attribute.split('@').next().unwrap_or("").to_owned();
            [attribute, local]
        })
        .filter(|attribute| attribute.chars().count() >= 3)
        .any(|attribute| password.contains(&attribute) || attribute.contains(&password))
}
