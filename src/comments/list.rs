use axum::{debug_handler, extract::State, http::StatusCode};
use sqlx::SqlitePool;

use crate::{
    questions::ensure_question,
    session::AuthUser,
    validate::{ApiJson, ApiPath},
    AppResult, AppState,
};

use super::{insert_comment, CommentArena, CommentJson, CommentPayload};

#[debug_handler(state = AppState)]
pub(crate) async fn question_comments(
    State(db_pool): State<SqlitePool>,
    _user: AuthUser,
    ApiPath(question_id): ApiPath<i64>,
) -> AppResult<CommentJson> {
    ensure_question(&db_pool, question_id).await?;

    let arena = CommentArena::load(&db_pool, question_id).await?;
    arena.roots()
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_comment(
    State(db_pool): State<SqlitePool>,
    user: AuthUser,
    ApiPath(question_id): ApiPath<i64>,
    ApiJson(payload): ApiJson<CommentPayload>,
) -> AppResult<(StatusCode, CommentJson)> {
    ensure_question(&db_pool, question_id).await?;
    let content = payload.content()?;

    let comment = insert_comment(&db_pool, question_id, &user, payload.parent, content).await?;
    Ok((StatusCode::CREATED, CommentJson::leaf(&comment)?))
}
