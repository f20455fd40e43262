//! HTTP request handlers for all API endpoints.
//!
//! Each handler extracts the caller with [`CurrentUser`](crate::api::models::users::CurrentUser),
//! opens a repository scoped to what that caller may see, and maps storage results onto
//! response models. Validation happens when request bodies are converted into database
//! requests, before any connection is taken from the pool.
//!
//! - [`health`]: Liveness probe
//! - [`sleep_records`]: Record CRUD, chart series and AI analysis
//! - [`users`]: Account listing and management

pub mod health;
pub mod sleep_records;
pub mod users;
