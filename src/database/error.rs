//! Store error taxonomy and classification of driver errors.

use sqlx::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("unique constraint violated{}: {message}", fmt_constraint(.constraint))]
    UniqueViolation {
        constraint: Option<String>,
        message: String,
    },

    #[error("foreign key constraint violated{}: {message}", fmt_constraint(.constraint))]
    ForeignKeyViolation {
        constraint: Option<String>,
        message: String,
    },

    #[error("constraint violated{}: {message}", fmt_constraint(.constraint))]
    ConstraintViolation {
        constraint: Option<String>,
        message: String,
    },

    #[error("database connection error: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(String),
}

fn fmt_constraint(constraint: &Option<String>) -> String {
    constraint
        .as_deref()
        .map(|name| format!(" ({name})"))
        .unwrap_or_default()
}

impl StoreError {
    pub fn unique_violation(constraint: Option<&str>, message: impl Into<String>) -> Self {
        Self::UniqueViolation {
            constraint: constraint.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Map a driver error onto [`StoreError`].
///
/// Works on `sqlx`'s structured [`ErrorKind`] rather than backend-specific
/// SQLSTATE strings so the mapping holds for every sqlx backend.
pub fn classify_database_error(err: &sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db_err) => {
            let constraint = db_err.constraint().map(str::to_string);
            let message = db_err.message().to_string();
            match db_err.kind() {
                ErrorKind::UniqueViolation => StoreError::UniqueViolation {
                    constraint,
                    message,
                },
                ErrorKind::ForeignKeyViolation => StoreError::ForeignKeyViolation {
                    constraint,
                    message,
                },
                ErrorKind::NotNullViolation | ErrorKind::CheckViolation => {
                    StoreError::ConstraintViolation {
                        constraint,
                        message,
                    }
                }
                _ => StoreError::Database(message),
            }
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Connection(err.to_string()),
        other => StoreError::Database(other.to_string()),
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        classify_database_error(&err)
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Database(format!("migration failed: {err}"))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::DatabaseError;
    use std::borrow::Cow;
    use std::fmt;

    #[derive(Debug, Clone, Copy)]
    enum FakeKind {
        Unique,
        ForeignKey,
        NotNull,
        Other,
    }

    /// A backend-agnostic database error, so classification is exercised
    /// without a live connection.
    #[derive(Debug)]
    struct FakeDbError {
        kind: FakeKind,
        constraint: Option<&'static str>,
    }

    impl fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "fake database error")
        }
    }

    impl std::error::Error for FakeDbError {}

    impl DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "fake database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            None
        }

        fn constraint(&self) -> Option<&str> {
            self.constraint
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.kind {
                FakeKind::Unique => ErrorKind::UniqueViolation,
                FakeKind::ForeignKey => ErrorKind::ForeignKeyViolation,
                FakeKind::NotNull => ErrorKind::NotNullViolation,
                FakeKind::Other => ErrorKind::Other,
            }
        }
    }

    fn db_error(kind: FakeKind, constraint: Option<&'static str>) -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakeDbError { kind, constraint }))
    }

    #[test]
    fn test_classifies_structured_kinds() {
        let err = classify_database_error(&db_error(FakeKind::Unique, Some("users_pkey")));
        assert!(err.is_unique_violation());
        assert_eq!(
            err,
            StoreError::unique_violation(Some("users_pkey"), "fake database error")
        );

        assert!(matches!(
            classify_database_error(&db_error(FakeKind::ForeignKey, None)),
            StoreError::ForeignKeyViolation { .. }
        ));
        assert!(matches!(
            classify_database_error(&db_error(FakeKind::NotNull, None)),
            StoreError::ConstraintViolation { .. }
        ));
        assert!(matches!(
            classify_database_error(&db_error(FakeKind::Other, None)),
            StoreError::Database(_)
        ));
    }

    #[test]
    fn test_classifies_driver_level_errors() {
        assert_eq!(
            classify_database_error(&sqlx::Error::RowNotFound),
            StoreError::NotFound
        );
        assert!(matches!(
            classify_database_error(&sqlx::Error::PoolTimedOut),
            StoreError::Connection(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolClosed),
            StoreError::Connection(_)
        ));
    }

    #[test]
    fn test_display_includes_constraint_name() {
        let err = StoreError::unique_violation(Some("users_email_key"), "duplicate key");
        assert_eq!(
            err.to_string(),
            "unique constraint violated (users_email_key): duplicate key"
        );
        let err = StoreError::unique_violation(None, "duplicate key");
        assert_eq!(err.to_string(), "unique constraint violated: duplicate key");
    }
}
