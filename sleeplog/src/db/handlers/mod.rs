//! Repository implementations for database access.
//!
//! Each repository:
//! - Borrows a SQLx connection or transaction for its lifetime
//! - Provides strongly-typed CRUD operations
//! - Binds parameters at runtime (`query_as::<_, T>`) so the crate builds without a live database
//! - Returns row models from [`crate::db::models`]
//!
//! # Available Repositories
//!
//! - [`Users`]: User accounts
//! - [`SleepRecords`]: One owner's logged nights; constructed with the owner's id and never
//!   reaching outside it
//!
//! # Common Pattern
//!
//! ```ignore
//! use sleeplog::db::handlers::{Repository, SleepRecords};
//!
//! async fn example(pool: &sqlx::SqlitePool, user_id: i64) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!     let mut repo = SleepRecords::new(&mut tx, user_id);
//!
//!     let nights = repo.list(&Default::default()).await?;
//!
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

pub mod repository;
pub mod sleep_records;
pub mod users;

pub use repository::Repository;
pub use sleep_records::SleepRecords;
pub use users::Users;
