//! Database record models matching table schemas.
//!
//! These structs correspond to rows of the `users` and `sleep_records` tables. Repositories
//! return them from queries and accept the `*DBRequest` types for inserts and updates.
//!
//! Database models are kept separate from API models so the stored representation and the
//! wire representation can evolve independently. API models convert from these with `From`:
//!
//! ```ignore
//! use sleeplog::api::models::sleep_records::SleepRecordResponse;
//!
//! let response: SleepRecordResponse = db_record.into();
//! ```

pub mod sleep_records;
pub mod users;
