//! Built-in task handlers.

pub mod send_verify_email;

pub use send_verify_email::{
    PayloadSendVerifyEmail, SendVerifyEmailHandler, TASK_SEND_VERIFY_EMAIL,
};
