//! API request and response data models.
//!
//! These structures define the public API contract. They are distinct from the database
//! models in [`crate::db::models`] so the wire format (camelCase JSON, string dates and
//! times) can differ from the stored format.
//!
//! Incoming bodies are validated when converted into database requests with `TryFrom`, so a
//! handler that holds a `*DBRequest` knows its dates and clock readings are well formed.
//!
//! - [`sleep_records`]: Logged nights, chart series and analysis payloads
//! - [`users`]: User profiles, roles and the authenticated [`users::CurrentUser`]
//! - [`pagination`]: Offset pagination shared by list endpoints

pub mod pagination;
pub mod sleep_records;
pub mod users;
