//! HTTP handlers for user accounts.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use tracing::{info, instrument};

use crate::{
    AppState,
    api::extractors::{ApiJson, ApiPath, ApiQuery},
    api::models::{
        pagination::{PaginatedResponse, Pagination},
        users::{CurrentUser, UserCreate, UserResponse, UserUpdate},
    },
    db::{
        errors::DbError,
        handlers::{Repository, Users, users::UserFilter},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{Operation, UserId, UserIdOrCurrent},
};

const USER_RESOURCE: &str = "User";

fn user_not_found(id: UserId) -> Error {
    Error::NotFound {
        resource: USER_RESOURCE.to_string(),
        id: id.to_string(),
    }
}

fn require_admin(current_user: &CurrentUser, action: Operation) -> Result<()> {
    if current_user.is_admin() {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions {
            action,
            resource: "users".to_string(),
        })
    }
}

fn require_manage(current_user: &CurrentUser, target: UserId, action: Operation) -> Result<()> {
    if current_user.can_manage(target) {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions {
            action,
            resource: format!("user {target}"),
        })
    }
}

/// List all users.
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    summary = "List users",
    description = "Paginated list of accounts in id order. Admin only.",
    params(Pagination),
    responses(
        (status = 200, description = "Page of users", body = PaginatedResponse<UserResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Sleeplog-User-Email" = []))
)]
#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    ApiQuery(pagination): ApiQuery<Pagination>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<UserResponse>>> {
    require_admin(&current_user, Operation::Read)?;

    let (skip, limit) = pagination.params();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);

    let users = repo.list(&UserFilter::new(skip, limit)).await?;
    let total_count = repo.count().await?;

    Ok(Json(PaginatedResponse::new(
        users.into_iter().map(Into::into).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Create an account ahead of its first login.
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    summary = "Create user",
    description = "Create an account with the USER role. Admin only.",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid name or email"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Sleeplog-User-Email" = []))
)]
#[instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiJson(request): ApiJson<UserCreate>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    require_admin(&current_user, Operation::Create)?;

    let request = UserCreate {
        name: request.name.trim().to_string(),
        email: request.email.trim().to_string(),
    };
    if request.name.is_empty() {
        return Err(Error::BadRequest {
            message: "Name must not be empty".to_string(),
        });
    }
    if !request.email.contains('@') {
        return Err(Error::BadRequest {
            message: format!("'{}' is not an email address", request.email),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn).create(&UserCreateDBRequest::from(request)).await?;
    info!(user_id = user.id, "User created");

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Get a user by id, or `current` for the caller.
#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Get user",
    params(("user_id" = String, Path, description = "User ID or `current`")),
    responses(
        (status = 200, description = "The user", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Sleeplog-User-Email" = []))
)]
#[instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserIdOrCurrent>,
    current_user: CurrentUser,
) -> Result<Json<UserResponse>> {
    let target = user_id.resolve(current_user.id);
    require_manage(&current_user, target, Operation::Read)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn).get_by_id(target).await?.ok_or_else(|| user_not_found(target))?;

    Ok(Json(user.into()))
}

/// Rename an account, or (as an admin) change its role.
#[utoipa::path(
    patch,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Update user",
    params(("user_id" = String, Path, description = "User ID or `current`")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid name"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Sleeplog-User-Email" = []))
)]
#[instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserIdOrCurrent>,
    current_user: CurrentUser,
    ApiJson(request): ApiJson<UserUpdate>,
) -> Result<Json<UserResponse>> {
    let target = user_id.resolve(current_user.id);
    require_manage(&current_user, target, Operation::Update)?;

    if request.role.is_some() {
        require_admin(&current_user, Operation::Update)?;
    }

    let mut db_request = UserUpdateDBRequest::from(request);
    if let Some(name) = db_request.name.as_mut() {
        *name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::BadRequest {
                message: "Name must not be empty".to_string(),
            });
        }
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    match Users::new(&mut conn).update(target, &db_request).await {
        Ok(user) => Ok(Json(user.into())),
        Err(DbError::NotFound) => Err(user_not_found(target)),
        Err(e) => Err(e.into()),
    }
}

/// Delete an account together with all of its sleep records.
#[utoipa::path(
    delete,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Delete user",
    params(("user_id" = String, Path, description = "User ID or `current`")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Sleeplog-User-Email" = []))
)]
#[instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserIdOrCurrent>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let target = user_id.resolve(current_user.id);
    require_manage(&current_user, target, Operation::Delete)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if Users::new(&mut conn).delete(target).await? {
        info!(user_id = target, "User deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(user_not_found(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::*;
    use serde_json::{Value, json};
    use sqlx::SqlitePool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_current_user(pool: SqlitePool) {
        let app = create_test_app(pool.clone());
        let user = create_test_user(&pool, "me@example.com").await;

        let response = app
            .get("/api/users/current")
            .add_header(add_auth_headers(&user).0, add_auth_headers(&user).1)
            .await;

        response.assert_status_ok();
        let body: UserResponse = response.json();
        assert_eq!(body.id, user.id);
        assert_eq!(body.email, "me@example.com");
        assert_eq!(body.role, Role::User);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_first_request_creates_account(pool: SqlitePool) {
        let app = create_test_app(pool);

        let response = app
            .get("/api/users/current")
            .add_header("x-sleeplog-user-email", "brand-new@example.com")
            .await;

        response.assert_status_ok();
        let body: UserResponse = response.json();
        assert_eq!(body.name, "brand-new");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_other_user_requires_admin(pool: SqlitePool) {
        let app = create_test_app(pool.clone());
        let user = create_test_user(&pool, "user@example.com").await;
        let other = create_test_user(&pool, "other@example.com").await;
        let admin = create_test_admin_user(&pool, "admin@example.com").await;

        let response = app
            .get(&format!("/api/users/{}", other.id))
            .add_header(add_auth_headers(&user).0, add_auth_headers(&user).1)
            .await;
        response.assert_status_forbidden();

        let response = app
            .get(&format!("/api/users/{}", other.id))
            .add_header(add_auth_headers(&admin).0, add_auth_headers(&admin).1)
            .await;
        response.assert_status_ok();

        let response = app
            .get("/api/users/9999")
            .add_header(add_auth_headers(&admin).0, add_auth_headers(&admin).1)
            .await;
        response.assert_status_not_found();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_users_is_paginated_and_admin_only(pool: SqlitePool) {
        let app = create_test_app(pool.clone());
        let admin = create_test_admin_user(&pool, "admin@example.com").await;
        let user = create_test_user(&pool, "user0@example.com").await;
        for i in 1..5 {
            create_test_user(&pool, &format!("user{i}@example.com")).await;
        }

        let response = app
            .get("/api/users")
            .add_header(add_auth_headers(&user).0, add_auth_headers(&user).1)
            .await;
        response.assert_status_forbidden();

        let response = app
            .get("/api/users")
            .add_query_param("skip", 1)
            .add_query_param("limit", 2)
            .add_header(add_auth_headers(&admin).0, add_auth_headers(&admin).1)
            .await;
        response.assert_status_ok();

        let page: Value = response.json();
        assert_eq!(page["totalCount"], 6);
        assert_eq!(page["skip"], 1);
        assert_eq!(page["limit"], 2);
        let emails: Vec<&str> = page["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["email"].as_str().unwrap())
            .collect();
        assert_eq!(emails, vec!["user0@example.com", "user1@example.com"]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_user(pool: SqlitePool) {
        let app = create_test_app(pool.clone());
        let admin = create_test_admin_user(&pool, "admin@example.com").await;

        let response = app
            .post("/api/users")
            .add_header(add_auth_headers(&admin).0, add_auth_headers(&admin).1)
            .json(&json!({"name": "  Sleepy  ", "email": "sleepy@example.com"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: UserResponse = response.json();
        assert_eq!(created.name, "Sleepy");
        assert_eq!(created.role, Role::User);

        let response = app
            .post("/api/users")
            .add_header(add_auth_headers(&admin).0, add_auth_headers(&admin).1)
            .json(&json!({"name": "Again", "email": "sleepy@example.com"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);

        let response = app
            .post("/api/users")
            .add_header(add_auth_headers(&admin).0, add_auth_headers(&admin).1)
            .json(&json!({"name": "No Email", "email": "nope"}))
            .await;
        response.assert_status_bad_request();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_self_but_not_role(pool: SqlitePool) {
        let app = create_test_app(pool.clone());
        let user = create_test_user(&pool, "rename@example.com").await;

        let response = app
            .patch("/api/users/current")
            .add_header(add_auth_headers(&user).0, add_auth_headers(&user).1)
            .json(&json!({"name": "Renamed"}))
            .await;
        response.assert_status_ok();
        let updated: UserResponse = response.json();
        assert_eq!(updated.name, "Renamed");

        let response = app
            .patch("/api/users/current")
            .add_header(add_auth_headers(&user).0, add_auth_headers(&user).1)
            .json(&json!({"role": "ADMIN"}))
            .await;
        response.assert_status_forbidden();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_admin_updates_other_user(pool: SqlitePool) {
        let app = create_test_app(pool.clone());
        let admin = create_test_admin_user(&pool, "admin@example.com").await;
        let user = create_test_user(&pool, "guest@example.com").await;

        let response = app
            .patch(&format!("/api/users/{}", user.id))
            .add_header(add_auth_headers(&admin).0, add_auth_headers(&admin).1)
            .json(&json!({"role": "GUEST"}))
            .await;
        response.assert_status_ok();
        let updated: UserResponse = response.json();
        assert_eq!(updated.role, Role::Guest);
        assert_eq!(updated.name, "guest");

        let response = app
            .patch(&format!("/api/users/{}", admin.id))
            .add_header(add_auth_headers(&user).0, add_auth_headers(&user).1)
            .json(&json!({"name": "Hijacked"}))
            .await;
        response.assert_status_forbidden();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_user_cascades_records(pool: SqlitePool) {
        let app = create_test_app(pool.clone());
        let user = create_test_user(&pool, "leaving@example.com").await;
        let other = create_test_user(&pool, "staying@example.com").await;
        create_test_record(&pool, user.id, "2024-03-01", "23:00", "07:00").await;

        let response = app
            .delete(&format!("/api/users/{}", other.id))
            .add_header(add_auth_headers(&user).0, add_auth_headers(&user).1)
            .await;
        response.assert_status_forbidden();

        let response = app
            .delete("/api/users/current")
            .add_header(add_auth_headers(&user).0, add_auth_headers(&user).1)
            .await;
        response.assert_status(StatusCode::NO_CONTENT);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sleep_records WHERE user_id = ?")
            .bind(user.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_invalid_user_path(pool: SqlitePool) {
        let app = create_test_app(pool.clone());
        let user = create_test_user(&pool, "path@example.com").await;

        let response = app
            .get("/api/users/me")
            .add_header(add_auth_headers(&user).0, add_auth_headers(&user).1)
            .await;
        response.assert_status_bad_request();
    }
}
