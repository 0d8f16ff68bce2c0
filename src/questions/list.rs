use axum::{debug_handler, extract::State, http::StatusCode, Json};
use sqlx::SqlitePool;
use tracing::info;

use crate::{
    db::{is_foreign_key_violation, now},
    groups::ensure_group,
    session::AuthUser,
    validate::{ApiJson, ApiPath, Validator},
    AppError, AppResult, AppState,
};

use super::{fetch_question, fetch_questions, QuestionPayload, QuestionView, Scope, TITLE_MAX};

#[debug_handler(state = AppState)]
pub(crate) async fn all_questions(
    State(db_pool): State<SqlitePool>,
    _user: AuthUser,
) -> AppResult<Json<Vec<QuestionView>>> {
    Ok(Json(fetch_questions(&db_pool, Scope::All).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn group_questions(
    State(db_pool): State<SqlitePool>,
    _user: AuthUser,
    ApiPath(group_id): ApiPath<i64>,
) -> AppResult<Json<Vec<QuestionView>>> {
    ensure_group(&db_pool, group_id).await?;
    Ok(Json(fetch_questions(&db_pool, Scope::Group(group_id)).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_question(
    State(db_pool): State<SqlitePool>,
    user: AuthUser,
    ApiPath(group_id): ApiPath<i64>,
    ApiJson(QuestionPayload { title, content }): ApiJson<QuestionPayload>,
) -> AppResult<(StatusCode, Json<QuestionView>)> {
    ensure_group(&db_pool, group_id).await?;

    let mut v = Validator::new();
    let title = v.required("title", title.as_deref(), Some(TITLE_MAX));
    let content = v.required("content", content.as_deref(), None);
    v.finish()?;

    let inserted = sqlx::query("INSERT INTO questions (title,content,group_id,user_id,created_at) VALUES (?,?,?,?,?)")
        .bind(title)
        .bind(content)
        .bind(group_id)
        .bind(user.id)
        .bind(now())
        .execute(&db_pool)
        .await;
    let id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(err) if is_foreign_key_violation(&err) => return Err(AppError::not_found("Group")),
        Err(err) => return Err(err.into()),
    };

    info!(question_id = id, group_id, user_id = user.id, "question created");
    Ok((StatusCode::CREATED, Json(fetch_question(&db_pool, id).await?)))
}
