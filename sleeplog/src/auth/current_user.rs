use crate::{
    AppState,
    api::models::users::CurrentUser,
    config::Config,
    db::{errors::DbError, handlers::Users},
    errors::{Error, Result},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::SqlitePool;
use tracing::{debug, instrument, trace};

/// Extract user from proxy header if present and valid
/// Returns:
/// - None: No proxy header present
/// - Some(Ok(user)): Valid proxy header found and user authenticated
/// - Some(Err(error)): Proxy header present but the user is unknown or the lookup failed
#[instrument(skip(parts, config, db))]
async fn try_proxy_header_auth(parts: &Parts, config: &Config, db: &SqlitePool) -> Option<Result<CurrentUser>> {
    let proxy = &config.auth.proxy_header;
    let user_email = parts
        .headers
        .get(&proxy.header_name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|email| !email.is_empty())?;

    let display_name = parts
        .headers
        .get(&proxy.name_header_name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let mut conn = match db.acquire().await {
        Ok(conn) => conn,
        Err(e) => return Some(Err(DbError::from(e).into())),
    };
    let mut user_repo = Users::new(&mut conn);

    if proxy.auto_create_users {
        return Some(match user_repo.get_or_create_by_email(user_email, display_name).await {
            Ok(user) => Ok(user.into()),
            // Two first requests raced to create the account; the other one won
            Err(DbError::UniqueViolation { .. }) => match user_repo.get_user_by_email(user_email).await {
                Ok(Some(user)) => Ok(user.into()),
                Ok(None) => Err(Error::Unauthenticated { message: None }),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        });
    }

    Some(match user_repo.get_user_by_email(user_email).await {
        Ok(Some(user)) => Ok(user.into()),
        Ok(None) => Err(Error::Unauthenticated {
            message: Some(format!("No account exists for {user_email}")),
        }),
        Err(e) => Err(e.into()),
    })
}

/// Fall back to the configured single-user account, creating it if necessary.
#[instrument(skip(config, db))]
async fn try_default_user(config: &Config, db: &SqlitePool) -> Option<Result<CurrentUser>> {
    let email = config.auth.default_user_email.as_deref()?;

    let mut conn = match db.acquire().await {
        Ok(conn) => conn,
        Err(e) => return Some(Err(DbError::from(e).into())),
    };

    Some(
        Users::new(&mut conn)
            .get_or_create_by_email(email, None)
            .await
            .map(CurrentUser::from)
            .map_err(Error::from),
    )
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // A present-but-rejected proxy header does not fall through to the default user
        match try_proxy_header_auth(parts, &state.config, &state.db).await {
            Some(Ok(user)) => {
                debug!("Found proxy header authenticated user: {}", user.id);
                return Ok(user);
            }
            Some(Err(e)) => {
                trace!("Proxy header authentication failed: {:?}", e);
                return Err(e);
            }
            None => {
                trace!("No proxy header authentication attempted");
            }
        }

        match try_default_user(&state.config, &state.db).await {
            Some(result) => result,
            None => {
                trace!("No authentication credentials found in request");
                Err(Error::Unauthenticated { message: None })
            }
        }
    }
}
