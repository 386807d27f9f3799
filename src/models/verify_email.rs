use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::User;

/// How long a verification link stays valid
pub const VERIFY_EMAIL_TTL_MINUTES: i64 = 15;

/// A pending (or consumed) email verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct VerifyEmail {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub secret_code: String,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

impl VerifyEmail {
    /// Whether `secret_code` may still be redeemed at `now`
    pub fn is_redeemable(&self, secret_code: &str, now: DateTime<Utc>) -> bool {
        !self.is_used && self.secret_code == secret_code && self.expired_at > now
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVerifyEmailParams {
    pub username: String,
    pub email: String,
    pub secret_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyEmailTxParams {
    pub email_id: i64,
    pub secret_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyEmailTxResult {
    pub user: User,
    pub verify_email: VerifyEmail,
}
