//! # Mail
//!
//! The [`Mailer`] seam used by background handlers. Only a logging mailer
//! ships here; a real transport implements the same trait.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::EmailConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    /// HTML body
    pub content: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MailError {
    /// Temporary transport failure, worth retrying
    #[error("Transient mail failure: {0}")]
    Transient(String),

    /// Rejected for good (bad address, blocked sender)
    #[error("Permanent mail failure: {0}")]
    Permanent(String),
}

impl MailError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send_email(&self, email: &Email) -> Result<(), MailError>;
}

/// Writes outgoing mail to the log instead of delivering it
#[derive(Debug, Clone)]
pub struct LogMailer {
    sender: String,
}

impl LogMailer {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            sender: format!("{} <{}>", config.sender_name, config.sender_address),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_email(&self, email: &Email) -> Result<(), MailError> {
        if !email.to.contains('@') {
            return Err(MailError::permanent(format!(
                "invalid recipient address: {}",
                email.to
            )));
        }
        info!(
            from = %self.sender,
            to = %email.to,
            subject = %email.subject,
            "📧 MAIL: Email sent"
        );
        Ok(())
    }
}

/// Records every email it is asked to send; optionally fails.
///
/// Used by tests to observe handler output.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    fail_with: Mutex<Option<MailError>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail with `error` (`None` to recover)
    pub fn fail_with(&self, error: Option<MailError>) {
        *self.fail_with.lock() = error;
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_email(&self, email: &Email) -> Result<(), MailError> {
        if let Some(error) = self.fail_with.lock().clone() {
            return Err(error);
        }
        self.sent.lock().push(email.clone());
        Ok(())
    }
}
