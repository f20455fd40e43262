//! Database repository for users.

use crate::types::UserId;
use crate::{
    api::models::users::Role,
    db::{
        errors::Result,
        handlers::repository::Repository,
        models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
};
use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::instrument;

/// Filter for listing users
#[derive(Debug, Clone)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }
}

pub struct Users<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let now = Utc::now();
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            INSERT INTO users (name, email, role, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            RETURNING *
            "#,
        )
        .bind(&request.name)
        .bind(&request.email)
        .bind(request.role)
        .bind(now)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = id), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, filter), fields(skip = filter.skip, limit = filter.limit), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let users = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users ORDER BY id LIMIT ? OFFSET ?")
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(users)
    }

    #[instrument(skip(self), fields(user_id = id), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        // sleep_records rows go with the user via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = id), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            UPDATE users
            SET
                name = COALESCE(?2, name),
                role = COALESCE(?3, role),
                updated_at = ?4
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.name.as_deref())
        .bind(request.role)
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user)
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    /// Total number of users, for pagination metadata.
    #[instrument(skip(self), err)]
    pub async fn count(&mut self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Look a user up by email, creating them with the `USER` role when missing.
    #[instrument(skip(self, email, name), err)]
    pub async fn get_or_create_by_email(&mut self, email: &str, name: Option<&str>) -> Result<UserDBResponse> {
        if let Some(user) = self.get_user_by_email(email).await? {
            return Ok(user);
        }

        // Default display name is the local part of the address
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string());

        self.create(&UserCreateDBRequest {
            name,
            email: email.to_string(),
            role: Role::User,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::repository::Repository;
    use super::*;
    use crate::api::models::users::UserCreate;
    use crate::db::errors::DbError;
    use sqlx::SqlitePool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_user(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user_create = UserCreateDBRequest::from(UserCreate {
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
        });

        let user = repo.create(&user_create).await.unwrap();
        assert_eq!(user.name, "Test User");
        assert_eq!(user.email, "test@example.com");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.created_at, user.updated_at);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_email_is_unique_violation(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let request = UserCreateDBRequest {
            name: "first".to_string(),
            email: "dup@example.com".to_string(),
            role: Role::User,
        };
        repo.create(&request).await.unwrap();

        let err = repo.create(&request).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }), "got {err:?}");
        assert!(err.mentions("users.email"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_user_by_email(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let created = repo
            .create(&UserCreateDBRequest {
                name: "email user".to_string(),
                email: "email@example.com".to_string(),
                role: Role::Guest,
            })
            .await
            .unwrap();

        let found = repo.get_user_by_email("email@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.role, Role::Guest);

        assert!(repo.get_user_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_or_create_by_email_is_idempotent(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let first = repo.get_or_create_by_email("sleepy@example.com", None).await.unwrap();
        assert_eq!(first.name, "sleepy");

        let second = repo.get_or_create_by_email("sleepy@example.com", Some("Other Name")).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "sleepy");
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_users_paginates_in_id_order(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        for i in 0..5 {
            repo.get_or_create_by_email(&format!("user{i}@example.com"), None).await.unwrap();
        }

        let page = repo.list(&UserFilter::new(1, 2)).await.unwrap();
        let emails: Vec<&str> = page.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["user1@example.com", "user2@example.com"]);
        assert_eq!(repo.count().await.unwrap(), 5);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_user_is_partial(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.get_or_create_by_email("partial@example.com", Some("Before")).await.unwrap();

        let updated = repo
            .update(
                user.id,
                &UserUpdateDBRequest {
                    name: None,
                    role: Some(Role::Admin),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Before");
        assert_eq!(updated.role, Role::Admin);
        assert!(updated.updated_at >= user.updated_at);

        let missing = repo.update(9999, &UserUpdateDBRequest::default()).await.unwrap_err();
        assert!(matches!(missing, DbError::NotFound));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_user(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.get_or_create_by_email("gone@example.com", None).await.unwrap();
        assert!(repo.delete(user.id).await.unwrap());
        assert!(!repo.delete(user.id).await.unwrap());
        assert!(repo.get_by_id(user.id).await.unwrap().is_none());
    }
}
