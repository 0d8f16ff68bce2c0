use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use super::verify_password;
use crate::{
    db::{fetch_user_by_email, UserView},
    session::issue_token,
    validate::{ApiJson, Validator},
    AppError, AppResult, AppState,
};

#[derive(Debug, Deserialize)]
pub(crate) struct LoginPayload {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginResponse {
    token: String,
    user: UserView,
    status: u16,
    message: &'static str,
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    ApiJson(payload): ApiJson<LoginPayload>,
) -> AppResult<Json<LoginResponse>> {
    let mut v = Validator::new();
    let email = v.required("email", payload.email.as_deref(), None);
    let password = v.secret("password", payload.password.as_deref());
    let (email, password) = v.finish_with(email.zip(password))?;

    let Some((user, password_hash)) = fetch_user_by_email(&db_pool, &email.to_lowercase()).await? else {
        return Err(AppError::not_found("User"));
    };
    if !verify_password(password, password_hash).await? {
        return Err(AppError::Unauthorized("Invalid password or email".to_owned()));
    }

    let mut conn = db_pool.acquire().await?;
    let token = issue_token(&mut conn, user.id).await?;
    info!(user_id = user.id, "logged in");

    Ok(Json(LoginResponse {
        token,
        user: user.view(),
        status: StatusCode::OK.as_u16(),
        message: "Login is Success",
    }))
}
