//! Request authentication.
//!
//! The service does not manage credentials itself. A trusted reverse proxy (oauth2-proxy,
//! vouch and the like) authenticates the browser and forwards the user's email in a header;
//! [`current_user`] turns that header into a [`CurrentUser`](crate::api::models::users::CurrentUser),
//! creating the account on first sight when configured to. Single-user deployments without a
//! proxy can name a `default_user_email` instead.
//!
//! ```ignore
//! async fn handler(current_user: CurrentUser, State(state): State<AppState>) -> Result<String> {
//!     Ok(format!("Hello, {}!", current_user.name))
//! }
//! ```

pub mod current_user;
