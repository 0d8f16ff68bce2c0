use axum::{debug_handler, extract::State, http::StatusCode, Json};
use sqlx::SqlitePool;
use tracing::info;

use crate::{
    session::AuthUser,
    validate::{ApiJson, ApiPath, Validator},
    AppError, AppResult, AppState,
};

use super::{fetch_question, question_author, QuestionPayload, QuestionView, TITLE_MAX};

#[debug_handler(state = AppState)]
pub(crate) async fn question(
    State(db_pool): State<SqlitePool>,
    _user: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<QuestionView>> {
    Ok(Json(fetch_question(&db_pool, id).await?))
}

async fn ensure_author(db_pool: &SqlitePool, id: i64, user: &AuthUser) -> AppResult<()> {
    if question_author(db_pool, id).await? != user.id {
        return Err(AppError::Forbidden(
            "You do not have permission to perform this action.".to_owned(),
        ));
    }
    Ok(())
}

/// Absent fields are left unchanged.
#[debug_handler(state = AppState)]
pub(crate) async fn update_question(
    State(db_pool): State<SqlitePool>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(QuestionPayload { title, content }): ApiJson<QuestionPayload>,
) -> AppResult<Json<QuestionView>> {
    ensure_author(&db_pool, id, &user).await?;

    let mut v = Validator::new();
    let title = title.and_then(|t| v.required("title", Some(&t), Some(TITLE_MAX)));
    let content = content.and_then(|c| v.required("content", Some(&c), None));
    v.finish()?;

    sqlx::query("UPDATE questions SET title=COALESCE(?,title), content=COALESCE(?,content) WHERE id=?")
        .bind(title)
        .bind(content)
        .bind(id)
        .execute(&db_pool)
        .await?;

    Ok(Json(fetch_question(&db_pool, id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_question(
    State(db_pool): State<SqlitePool>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<StatusCode> {
    ensure_author(&db_pool, id, &user).await?;

    sqlx::query("DELETE FROM questions WHERE id=?")
        .bind(id)
        .execute(&db_pool)
        .await?;

    info!(question_id = id, user_id = user.id, "question deleted");
    Ok(StatusCode::NO_CONTENT)
}
