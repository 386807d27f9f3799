//! # Authentication
//!
//! Password hashing and bearer access tokens used by the request handlers.

pub mod password;
pub mod token;

pub use password::{check_password, hash_password};
pub use token::{extract_bearer_token, TokenClaims, TokenMaker};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Auth configuration error: {0}")]
    Configuration(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Incorrect password")]
    PasswordMismatch,

    #[error("Missing authorization header")]
    MissingAuthHeader,

    #[error("Invalid authorization header format")]
    InvalidAuthFormat,

    #[error("Unsupported authorization type")]
    UnsupportedScheme,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("JWT processing error: {0}")]
    Jwt(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Jwt(err.to_string())
    }
}
