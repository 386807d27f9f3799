//! # Database Operations
//!
//! Store abstraction, the Transactional Unit and the two store backends.
//!
//! ## Key Components
//!
//! - [`transaction`] - [`TxBackend`] and [`execute_tx`], the mutate → effect →
//!   commit primitive every multi-step write goes through
//! - [`store`] - the [`Store`] trait request and task handlers depend on
//! - [`postgres`] - [`PgStore`], the production backend
//! - [`memory`] - [`MemoryStore`], an in-process backend for tests
//! - [`connection`] - pool construction and embedded migrations
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use simplebank::database::{execute_tx, StoreError};
//!
//! # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let id: i64 = execute_tx(
//!     &pool,
//!     |tx| Box::pin(async move {
//!         let row: (i64,) = sqlx::query_as("SELECT 1::BIGINT").fetch_one(&mut **tx).await?;
//!         Ok::<_, StoreError>(row.0)
//!     }),
//!     |id| async move {
//!         println!("about to commit {id}");
//!         Ok::<(), std::io::Error>(())
//!     },
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod transaction;

pub use connection::{create_pool, run_migrations, MIGRATOR};
pub use error::{classify_database_error, StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::Store;
pub use transaction::{execute_tx, no_effect, TxBackend, TxError};
