//! Auth flow settings

use std::time::Duration;

use crate::error::AuthError;

/// Default access token lifetime (30 minutes)
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(1800);
/// Default refresh token lifetime (7 days)
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(604_800);
/// Default bound on a single credential store or ledger call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Token lifetimes and store deadlines used by `AuthService`
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub store_timeout: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl AuthSettings {
    /// Check that lifetimes are usable
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.access_ttl.as_secs() < 1 || self.refresh_ttl.as_secs() < 1 {
            return Err(AuthError::Validation(
                "token TTLs must be at least one second".to_string(),
            ));
        }
        if self.access_ttl >= self.refresh_ttl {
            return Err(AuthError::Validation(
                "access token TTL must be shorter than refresh token TTL".to_string(),
            ));
        }
        if self.store_timeout.is_zero() {
            return Err(AuthError::Validation(
                "store timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AuthSettings::default().validate().is_ok());
    }

    #[test]
    fn test_access_must_be_shorter_than_refresh() {
        let settings = AuthSettings {
            access_ttl: Duration::from_secs(3600),
            refresh_ttl: Duration::from_secs(3600),
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(AuthError::Validation(_))));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let settings = AuthSettings {
            access_ttl: Duration::ZERO,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
