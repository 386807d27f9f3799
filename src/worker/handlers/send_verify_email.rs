//! Sends the verification email for a freshly created user.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::EmailConfig;
use crate::database::{Store, StoreError};
use crate::mail::{Email, MailError, Mailer};
use crate::messaging::TaskEnvelope;
use crate::models::CreateVerifyEmailParams;
use crate::worker::errors::TaskError;
use crate::worker::registry::TaskHandler;

pub const TASK_SEND_VERIFY_EMAIL: &str = "task:send_verify_email";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSendVerifyEmail {
    pub username: String,
}

pub struct SendVerifyEmailHandler {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    config: EmailConfig,
}

impl SendVerifyEmailHandler {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>, config: EmailConfig) -> Self {
        Self {
            store,
            mailer,
            config,
        }
    }

    fn verify_url(&self, email_id: i64, secret_code: &str) -> String {
        format!(
            "{}?email_id={}&secret_code={}",
            self.config.verify_url_base, email_id, secret_code
        )
    }
}

#[async_trait]
impl TaskHandler for SendVerifyEmailHandler {
    async fn handle(&self, task: &TaskEnvelope) -> Result<(), TaskError> {
        let payload: PayloadSendVerifyEmail = serde_json::from_value(task.payload.clone())
            .map_err(|e| TaskError::fatal(format!("failed to unmarshal payload: {e}")))?;

        // The user row may be missing if the enqueue raced a rolled-back insert
        let user = self
            .store
            .get_user(&payload.username)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => {
                    TaskError::fatal(format!("user {} doesn't exist", payload.username))
                }
                other => TaskError::retryable(format!("failed to get user: {other}")),
            })?;

        let verify_email = self
            .store
            .create_verify_email(CreateVerifyEmailParams {
                username: user.username.clone(),
                email: user.email.clone(),
                secret_code: Uuid::new_v4().simple().to_string(),
            })
            .await
            .map_err(|e| TaskError::retryable(format!("failed to create verify email: {e}")))?;

        let link = self.verify_url(verify_email.id, &verify_email.secret_code);
        let email = Email {
            to: user.email.clone(),
            subject: "Welcome to Simple Bank".to_string(),
            content: format!(
                "Hello {},<br/>\
                 Thank you for registering with us!<br/>\
                 Please <a href=\"{link}\">click here</a> to verify your email address.<br/>",
                user.full_name
            ),
        };

        self.mailer.send_email(&email).await.map_err(|e| match e {
            MailError::Transient(_) => TaskError::retryable(e.to_string()),
            MailError::Permanent(_) => TaskError::fatal(e.to_string()),
        })?;

        info!(
            task_type = TASK_SEND_VERIFY_EMAIL,
            username = %user.username,
            email = %user.email,
            attempt = task.attempt(),
            "✅ WORKER: Verification email sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::mail::RecordingMailer;
    use crate::models::{CreateUserParams, CreateUserTxParams};
    use serde_json::json;

    async fn store_with_alice() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .create_user_tx(CreateUserTxParams::new(
                CreateUserParams {
                    username: "alice".to_string(),
                    hashed_password: "hash".to_string(),
                    full_name: "Alice Liddell".to_string(),
                    email: "alice@example.com".to_string(),
                },
                |_| async { Ok(()) },
            ))
            .await
            .unwrap();
        store
    }

    fn envelope(username: &str) -> TaskEnvelope {
        TaskEnvelope::new(
            TASK_SEND_VERIFY_EMAIL,
            json!({ "username": username }),
            "critical",
            10,
            None,
        )
    }

    #[tokio::test]
    async fn test_sends_link_and_records_secret() {
        let store = store_with_alice().await;
        let mailer = Arc::new(RecordingMailer::new());
        let handler =
            SendVerifyEmailHandler::new(store.clone(), mailer.clone(), EmailConfig::default());

        handler.handle(&envelope("alice")).await.unwrap();

        let records = store.verify_emails().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].username, "alice");

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@example.com");
        assert!(sent[0].content.contains(&format!(
            "email_id={}&secret_code={}",
            records[0].id, records[0].secret_code
        )));
    }

    #[tokio::test]
    async fn test_missing_user_is_fatal() {
        let handler = SendVerifyEmailHandler::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingMailer::new()),
            EmailConfig::default(),
        );

        let err = handler.handle(&envelope("ghost")).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_bad_payload_is_fatal() {
        let handler = SendVerifyEmailHandler::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingMailer::new()),
            EmailConfig::default(),
        );
        let task = TaskEnvelope::new(TASK_SEND_VERIFY_EMAIL, json!([1, 2]), "critical", 3, None);

        assert!(matches!(
            handler.handle(&task).await,
            Err(TaskError::Fatal { .. })
        ));
    }

    #[tokio::test]
    async fn test_mailer_failures_are_classified() {
        let store = store_with_alice().await;
        let mailer = Arc::new(RecordingMailer::new());
        let handler = SendVerifyEmailHandler::new(store, mailer.clone(), EmailConfig::default());

        mailer.fail_with(Some(MailError::transient("smtp timeout")));
        assert!(handler
            .handle(&envelope("alice"))
            .await
            .unwrap_err()
            .is_retryable());

        mailer.fail_with(Some(MailError::permanent("mailbox unavailable")));
        assert!(!handler
            .handle(&envelope("alice"))
            .await
            .unwrap_err()
            .is_retryable());
    }
}
