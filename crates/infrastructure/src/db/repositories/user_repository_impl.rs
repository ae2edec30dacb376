//! 用户仓储实现

use async_trait::async_trait;
use sqlx::{query, query_as, FromRow};
use uuid::Uuid;

use crate::db::DbPool;
use domain::{
    RepositoryError, User, UserId, UserRepository, VisibilityChoice, VisibilitySettings,
};

use super::{corrupt, map_sqlx_error};

#[derive(Debug, Clone, FromRow)]
struct DbUser {
    id: Uuid,
    username: String,
    email: String,
    slug: String,
    status_text: String,
    photo: Option<String>,
    email_visibility: String,
    status_visibility: String,
    photo_visibility: String,
    online_visibility: String,
    session_key: Option<String>,
}

impl DbUser {
    fn into_user(self) -> Result<User, RepositoryError> {
        Ok(User {
            id: UserId::new(self.id),
            username: self.username,
            email: self.email,
            slug: self.slug,
            status_text: self.status_text,
            photo: self.photo,
            visibility: VisibilitySettings {
                email: VisibilityChoice::from_code(&self.email_visibility).map_err(corrupt)?,
                status: VisibilityChoice::from_code(&self.status_visibility).map_err(corrupt)?,
                photo: VisibilityChoice::from_code(&self.photo_visibility).map_err(corrupt)?,
                online: VisibilityChoice::from_code(&self.online_visibility).map_err(corrupt)?,
            },
            session_key: self.session_key,
        })
    }
}

const SELECT_USER: &str = "SELECT id, username, email, slug, status_text, photo, \
     email_visibility, status_visibility, photo_visibility, online_visibility, session_key \
     FROM users";

pub struct PgUserRepository {
    pool: DbPool,
}

impl PgUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        query(
            "INSERT INTO users (id, username, email, slug, status_text, photo, \
             email_visibility, status_visibility, photo_visibility, online_visibility, session_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(user.id.0)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.slug)
        .bind(&user.status_text)
        .bind(&user.photo)
        .bind(user.visibility.email.code())
        .bind(user.visibility.status.code())
        .bind(user.visibility.photo.code())
        .bind(user.visibility.online.code())
        .bind(&user.session_key)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(user)
    }

    async fn update(&self, user: User) -> Result<User, RepositoryError> {
        let result = query(
            "UPDATE users SET username = $2, email = $3, slug = $4, status_text = $5, \
             photo = $6, email_visibility = $7, status_visibility = $8, photo_visibility = $9, \
             online_visibility = $10, session_key = $11 WHERE id = $1",
        )
        .bind(user.id.0)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.slug)
        .bind(&user.status_text)
        .bind(&user.photo)
        .bind(user.visibility.email.code())
        .bind(user.visibility.status.code())
        .bind(user.visibility.photo.code())
        .bind(user.visibility.online.code())
        .bind(&user.session_key)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let sql = format!("{SELECT_USER} WHERE id = $1");
        let row = query_as::<_, DbUser>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(DbUser::into_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let sql = format!("{SELECT_USER} WHERE email = $1");
        let row = query_as::<_, DbUser>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(DbUser::into_user).transpose()
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<User>, RepositoryError> {
        let sql = format!("{SELECT_USER} WHERE slug = $1");
        let row = query_as::<_, DbUser>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(DbUser::into_user).transpose()
    }

    async fn are_friends(&self, a: UserId, b: UserId) -> Result<bool, RepositoryError> {
        let found: Option<(Uuid,)> = query_as(
            "SELECT user_a FROM friendships \
             WHERE user_a = LEAST($1, $2) AND user_b = GREATEST($1, $2)",
        )
        .bind(a.0)
        .bind(b.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(found.is_some())
    }

    async fn add_friendship(&self, a: UserId, b: UserId) -> Result<(), RepositoryError> {
        query(
            "INSERT INTO friendships (user_a, user_b) \
             VALUES (LEAST($1, $2), GREATEST($1, $2)) ON CONFLICT DO NOTHING",
        )
        .bind(a.0)
        .bind(b.0)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn clear_session(&self, user: UserId) -> Result<(), RepositoryError> {
        query(
            "WITH cleared AS (\
               UPDATE users SET session_key = NULL WHERE id = $1 RETURNING id\
             ) \
             DELETE FROM sessions WHERE user_id IN (SELECT id FROM cleared)",
        )
        .bind(user.0)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        tracing::debug!(user_id = %user, "失效会话键已清除");
        Ok(())
    }
}
