//! # Data Models
//!
//! Rows persisted by the store and the parameter/result types of store
//! operations.

pub mod user;
pub mod verify_email;

pub use user::{
    AfterCreateFn, CreateUserParams, CreateUserTxParams, CreateUserTxResult, UpdateUserParams,
    User,
};
pub use verify_email::{
    CreateVerifyEmailParams, VerifyEmail, VerifyEmailTxParams, VerifyEmailTxResult,
    VERIFY_EMAIL_TTL_MINUTES,
};
