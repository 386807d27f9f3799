//! # Access Tokens
//!
//! HS256 JWT access tokens signed with the configured symmetric key.

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::AuthError;
use crate::config::AuthConfig;

/// Minimum symmetric key length in bytes
pub const MIN_SECRET_KEY_SIZE: usize = 32;

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Token id
    pub jti: Uuid,
    /// Username the token was issued to
    pub sub: String,
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl TokenClaims {
    pub fn username(&self) -> &str {
        &self.sub
    }
}

#[derive(Clone)]
pub struct TokenMaker {
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for TokenMaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenMaker")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenMaker {
    pub fn new(secret_key: &str, issuer: impl Into<String>) -> Result<Self, AuthError> {
        if secret_key.len() < MIN_SECRET_KEY_SIZE {
            return Err(AuthError::Configuration(format!(
                "invalid key size: must be at least {MIN_SECRET_KEY_SIZE} characters"
            )));
        }
        Ok(Self {
            issuer: issuer.into(),
            encoding_key: EncodingKey::from_secret(secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret_key.as_bytes()),
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        Self::new(&config.token_symmetric_key, config.issuer.clone())
    }

    /// Issue a token for `username` valid for `duration`
    pub fn create_token(
        &self,
        username: &str,
        duration: Duration,
    ) -> Result<(String, TokenClaims), AuthError> {
        let duration = ChronoDuration::from_std(duration)
            .map_err(|e| AuthError::Configuration(format!("invalid token duration: {e}")))?;
        let now = Utc::now();
        let claims = TokenClaims {
            jti: Uuid::new_v4(),
            sub: username.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + duration).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        debug!(username = %username, exp = claims.exp, "Access token issued");
        Ok((token, claims))
    }

    pub fn verify_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = true;
        validation.leeway = 0;

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            warn!(error = %e, "Access token validation failed");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;
        Ok(data.claims)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn extract_bearer_token(header: &str) -> Result<&str, AuthError> {
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        (Some(_), Some(_), None) => Err(AuthError::UnsupportedScheme),
        _ => Err(AuthError::InvalidAuthFormat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_short_key_is_rejected() {
        assert!(matches!(
            TokenMaker::new("short", "simplebank"),
            Err(AuthError::Configuration(_))
        ));
    }

    #[test]
    fn test_issued_token_verifies() {
        let maker = TokenMaker::new(KEY, "simplebank").unwrap();
        let (token, issued) = maker
            .create_token("alice", Duration::from_secs(60))
            .unwrap();

        let claims = maker.verify_token(&token).unwrap();
        assert_eq!(claims, issued);
        assert_eq!(claims.username(), "alice");
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let maker = TokenMaker::new(KEY, "simplebank").unwrap();
        let (token, _) = maker.create_token("alice", Duration::ZERO).unwrap();
        std::thread::sleep(Duration::from_millis(1100));

        assert_eq!(maker.verify_token(&token), Err(AuthError::ExpiredToken));
    }

    #[test]
    fn test_token_from_other_key_is_invalid() {
        let maker = TokenMaker::new(KEY, "simplebank").unwrap();
        let other = TokenMaker::new("fedcba9876543210fedcba9876543210", "simplebank").unwrap();
        let (token, _) = other
            .create_token("alice", Duration::from_secs(60))
            .unwrap();

        assert!(matches!(
            maker.verify_token(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_bearer_extraction() {
        assert_eq!(extract_bearer_token("Bearer abc").unwrap(), "abc");
        assert_eq!(extract_bearer_token("bearer abc").unwrap(), "abc");
        assert_eq!(
            extract_bearer_token("Basic abc"),
            Err(AuthError::UnsupportedScheme)
        );
        assert_eq!(
            extract_bearer_token("Bearer"),
            Err(AuthError::InvalidAuthFormat)
        );
    }
}
