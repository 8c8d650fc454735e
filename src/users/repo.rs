use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use super::repo_types::{NewUser, PublicUser, User, UserPatch};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique index on username or email rejected the write.
    #[error("duplicate username or email")]
    Duplicate,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Durable record of one row per user.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// First user whose username or email matches any of the given values.
    async fn find_by_identity(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Same lookup as `find_by_id` with password hash and refresh token projected out.
    async fn find_public_by_id(&self, id: Uuid) -> Result<Option<PublicUser>, StoreError>;

    async fn create(&self, user: NewUser) -> Result<Uuid, StoreError>;

    async fn update_by_id(
        &self,
        id: Uuid,
        patch: UserPatch,
    ) -> Result<Option<PublicUser>, StoreError>;

    /// Overwrites (or clears) the stored refresh token. Returns false if the user is gone.
    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<bool, StoreError>;

    /// Replaces `current` with `next` only if `current` is still the stored value.
    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<bool, StoreError>;
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
        _ => StoreError::Backend(anyhow::Error::new(err)),
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_identity(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, full_name, password_hash, avatar, cover_image,
                   refresh_token, created_at, updated_at
            FROM users
            WHERE ($1::text IS NOT NULL AND username = $1)
               OR ($2::text IS NOT NULL AND email = $2)
            LIMIT 1
            "#,
        )
        .bind(username)
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(map_sqlx)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, full_name, password_hash, avatar, cover_image,
                   refresh_token, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(map_sqlx)
    }

    async fn find_public_by_id(&self, id: Uuid) -> Result<Option<PublicUser>, StoreError> {
        sqlx::query_as::<_, PublicUser>(
            r#"
            SELECT id, username, email, full_name, avatar, cover_image, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(map_sqlx)
    }

    async fn create(&self, user: NewUser) -> Result<Uuid, StoreError> {
        let id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO users (id, username, email, full_name, password_hash, avatar, cover_image)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(&user.avatar)
        .bind(&user.cover_image)
        .fetch_one(&self.db)
        .await
        .map_err(map_sqlx)?;
        Ok(id.0)
    }

    async fn update_by_id(
        &self,
        id: Uuid,
        patch: UserPatch,
    ) -> Result<Option<PublicUser>, StoreError> {
        sqlx::query_as::<_, PublicUser>(
            r#"
            UPDATE users
               SET full_name     = COALESCE($2, full_name),
                   email         = COALESCE($3, email),
                   avatar        = COALESCE($4, avatar),
                   cover_image   = COALESCE($5, cover_image),
                   password_hash = COALESCE($6, password_hash),
                   updated_at    = now()
             WHERE id = $1
            RETURNING id, username, email, full_name, avatar, cover_image, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(patch.full_name)
        .bind(patch.email)
        .bind(patch.avatar)
        .bind(patch.cover_image)
        .bind(patch.password_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(map_sqlx)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1"#,
        )
        .bind(id)
        .bind(token)
        .execute(&self.db)
        .await
        .map_err(map_sqlx)?;
        Ok(res.rows_affected() == 1)
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET refresh_token = $3, updated_at = now()
             WHERE id = $1 AND refresh_token = $2
            "#,
        )
        .bind(id)
        .bind(current)
        .bind(next)
        .execute(&self.db)
        .await
        .map_err(map_sqlx)?;
        Ok(res.rows_affected() == 1)
    }
}
