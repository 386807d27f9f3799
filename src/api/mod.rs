//! # Request Surface
//!
//! [`BankService`] holds the request handlers both front-ends call into;
//! [`StatusCode`] and [`ApiError`] are what clients see when a call fails.

pub mod service;
pub mod status;
pub mod validation;

pub use service::{
    BankService, CreateUserRequest, CreateUserResponse, LoginUserRequest, LoginUserResponse,
    UpdateUserRequest, UpdateUserResponse, UserView, VerifyEmailRequest, VerifyEmailResponse,
    VERIFY_EMAIL_MAX_RETRIES, VERIFY_EMAIL_PROCESS_IN,
};
pub use status::{ApiError, ApiResult, StatusCode};
pub use validation::FieldViolation;
