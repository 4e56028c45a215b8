//! RS256 token management

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::TokenError;

/// Token class carried in the `typ` claim
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token claims
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (account ID)
    pub sub: String,
    /// Token class
    pub typ: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token ID
    pub jti: String,
}

impl Claims {
    /// Parse the subject back into an account ID
    pub fn account_id(&self) -> Result<i64, TokenError> {
        self.sub.parse().map_err(|_| TokenError::Invalid)
    }
}

/// Verify-only half of the key pair
///
/// Built from the public key alone, so services that only check access
/// tokens never hold signing material.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Build a verifier from a PEM-encoded RSA public key
    pub fn from_public_pem(public_pem: &[u8]) -> Result<Self, TokenError> {
        let decoding_key = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| TokenError::Key(format!("invalid public key: {}", e)))?;

        let mut validation = Validation::new(Algorithm::RS256);
        // Expiry is checked by hand after the signature, with no leeway
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            decoding_key,
            validation,
        })
    }

    /// Load a verifier from a public key file
    pub fn from_public_key_file(path: impl AsRef<Path>) -> Result<Self, TokenError> {
        let pem = read_key_file(path.as_ref())?;
        Self::from_public_pem(&pem)
    }

    /// Verify a token and return its claims
    ///
    /// The signature is checked before any claim is looked at.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        let claims = token_data.claims;

        if claims.exp <= claims.iat {
            return Err(TokenError::Invalid);
        }
        if Utc::now().timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Verify a token and require a specific token class
    pub fn verify_as(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.typ != expected {
            debug!(
                "Rejected {} token presented as {} token",
                claims.typ, expected
            );
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }
}

/// Token manager for issuing and validating tokens
#[derive(Clone)]
pub struct TokenManager {
    encoding_key: EncodingKey,
    verifier: TokenVerifier,
}

impl TokenManager {
    /// Create a token manager from PEM-encoded RSA keys
    ///
    /// Fails if either key is unreadable or the halves do not belong together.
    pub fn from_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self, TokenError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| TokenError::Key(format!("invalid private key: {}", e)))?;
        let verifier = TokenVerifier::from_public_pem(public_pem)?;

        let manager = Self {
            encoding_key,
            verifier,
        };
        manager.check_key_pair()?;
        Ok(manager)
    }

    /// Load the key pair from PEM files
    pub fn from_key_files(
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
    ) -> Result<Self, TokenError> {
        let private_pem = read_key_file(private_key_path.as_ref())?;
        let public_pem = read_key_file(public_key_path.as_ref())?;
        let manager = Self::from_pem(&private_pem, &public_pem)?;

        info!(
            "Loaded token signing key pair from {}",
            private_key_path.as_ref().display()
        );
        Ok(manager)
    }

    /// The verify-only half, for handing to request gates
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Issue a signed token for a subject
    pub fn issue(
        &self,
        subject: i64,
        ttl: Duration,
        token_type: TokenType,
    ) -> Result<String, TokenError> {
        self.issue_at(subject, ttl, token_type, Utc::now())
    }

    /// Issue a token with an explicit issue time
    pub fn issue_at(
        &self,
        subject: i64,
        ttl: Duration,
        token_type: TokenType,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let ttl_secs = i64::try_from(ttl.as_secs())
            .map_err(|_| TokenError::Signing("TTL out of range".to_string()))?;
        if ttl_secs < 1 {
            return Err(TokenError::Signing(
                "TTL must be at least one second".to_string(),
            ));
        }

        let iat = issued_at.timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            typ: token_type,
            iat,
            exp: iat + ttl_secs,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        debug!("Issuing {} token for account {}", token_type, subject);

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify a token and return its claims
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verifier.verify(token)
    }

    /// Verify a token and require a specific token class
    pub fn verify_as(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        self.verifier.verify_as(token, expected)
    }

    fn check_key_pair(&self) -> Result<(), TokenError> {
        let sample = self.issue(0, Duration::from_secs(60), TokenType::Access)?;
        self.verifier.verify(&sample).map_err(|_| {
            TokenError::Key("public key does not match private key".to_string())
        })?;
        Ok(())
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>, TokenError> {
    std::fs::read(path)
        .map_err(|e| TokenError::Key(format!("failed to read {}: {}", path.display(), e)))
}
