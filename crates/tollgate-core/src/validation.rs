//! Input validation for credentials

use crate::error::AuthError;

/// Maximum allowed email length
pub const MAX_EMAIL_LENGTH: usize = 254;
/// Maximum allowed password length (prevent DoS with very large passwords)
pub const MAX_PASSWORD_LENGTH: usize = 256;

/// Validate an email address and return its normalized form
///
/// Normalization trims surrounding whitespace and lowercases, so
/// `A@X.com` and `a@x.com` are the same identity.
pub fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();

    if email.is_empty() {
        return Err(AuthError::Validation("Email cannot be empty".to_string()));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(AuthError::Validation(format!(
            "Email exceeds maximum length of {} characters",
            MAX_EMAIL_LENGTH
        )));
    }
    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AuthError::Validation(
            "Email cannot contain whitespace".to_string(),
        ));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::Validation("Email is not valid".to_string()));
    };
    let domain_ok = !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..");
    if local.is_empty() || !domain_ok {
        return Err(AuthError::Validation("Email is not valid".to_string()));
    }

    Ok(email)
}

/// Validate password presence and length
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.is_empty() {
        return Err(AuthError::Validation("Password cannot be empty".to_string()));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AuthError::Validation(format!(
            "Password exceeds maximum length of {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("a@x.com").unwrap(), "a@x.com");
        assert_eq!(normalize_email("  Alice@Example.COM ").unwrap(), "alice@example.com");
    }

    #[test]
    fn test_invalid_emails() {
        for email in [
            "",
            "   ",
            "no-at-sign",
            "@x.com",
            "a@",
            "a@x",
            "a@.x.com",
            "a@x.com.",
            "a@x..com",
            "a@b@x.com",
            "a b@x.com",
        ] {
            assert!(
                matches!(normalize_email(email), Err(AuthError::Validation(_))),
                "expected {:?} to be rejected",
                email
            );
        }

        let long = format!("{}@x.com", "a".repeat(MAX_EMAIL_LENGTH));
        assert!(normalize_email(&long).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("p1").is_ok());
        assert!(validate_password("").is_err());
        assert!(validate_password(&"x".repeat(MAX_PASSWORD_LENGTH + 1)).is_err());
    }
}
