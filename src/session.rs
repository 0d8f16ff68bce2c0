use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use rand::Rng;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{db::now, AppError, AppResult};

const SCHEMES: [&str; 2] = ["Token", "Bearer"];

/// The caller behind `Authorization: Token <key>` (or `Bearer <key>`).
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub username: Option<String>,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SqlitePool: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Err(AppError::Unauthorized(
                "Authentication credentials were not provided.".to_owned(),
            ));
        };
        let header = header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid token header.".to_owned()))?;
        let key = token_key(header)?;

        let db_pool = SqlitePool::from_ref(state);
        let user: Option<(i64, String, Option<String>)> = sqlx::query_as(
            "SELECT u.id,u.email,u.username FROM tokens t JOIN users u ON u.id=t.user_id WHERE t.key=?",
        )
        .bind(key)
        .fetch_optional(&db_pool)
        .await?;

        let (id, email, username) =
            user.ok_or_else(|| AppError::Unauthorized("Invalid token.".to_owned()))?;
        Ok(AuthUser { id, email, username })
    }
}

fn token_key(header: &str) -> AppResult<&str> {
    let mut parts = header.split_whitespace();
    let (Some(scheme), Some(key), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AppError::Unauthorized("Invalid token header.".to_owned()));
    };
    if !SCHEMES.iter().any(|s| s.eq_ignore_ascii_case(scheme)) {
        return Err(AppError::Unauthorized("Invalid token header.".to_owned()));
    }
    Ok(key)
}

/// 20 random bytes as 40 lowercase hex characters.
pub fn new_token_key() -> String {
    let bytes: [u8; 20] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// The user's token, created on first use.
pub async fn issue_token(conn: &mut SqliteConnection, user_id: i64) -> AppResult<String> {
    sqlx::query("INSERT INTO tokens (key,user_id,created_at) VALUES (?,?,?) ON CONFLICT (user_id) DO NOTHING")
        .bind(new_token_key())
        .bind(user_id)
        .bind(now())
        .execute(&mut *conn)
        .await?;

    let (key,): (String,) = sqlx::query_as("SELECT key FROM tokens WHERE user_id=?")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::{pool, seed_user};

    #[test]
    fn accepts_token_and_bearer() {
        assert_eq!(token_key("Token abc").unwrap(), "abc");
        assert_eq!(token_key("bearer abc").unwrap(), "abc");
    }

    #[test]
    fn rejects_malformed_headers() {
        assert!(token_key("abc").is_err());
        assert!(token_key("Basic abc").is_err());
        assert!(token_key("Token a b").is_err());
    }

    #[test]
    fn token_keys_are_hex() {
        let key = new_token_key();
        assert_eq!(key.len(), 40);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(key, new_token_key());
    }

    #[tokio::test]
    async fn issue_token_is_get_or_create() {
        let db_pool = pool().await;
        let user = seed_user(&db_pool, "amal").await;
        let mut conn = db_pool.acquire().await.unwrap();

        let first = issue_token(&mut conn, user).await.unwrap();
        let second = issue_token(&mut conn, user).await.unwrap();
        assert_eq!(first, second);
    }
}
