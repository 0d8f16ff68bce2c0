use axum::{debug_handler, extract::State, http::StatusCode};
use sqlx::SqlitePool;

use crate::{
    session::AuthUser,
    validate::{ApiJson, ApiPath},
    AppResult, AppState,
};

use super::{comment_question, insert_comment, CommentArena, CommentJson, CommentPayload};

#[debug_handler(state = AppState)]
pub(crate) async fn replies(
    State(db_pool): State<SqlitePool>,
    _user: AuthUser,
    ApiPath(parent_id): ApiPath<i64>,
) -> AppResult<CommentJson> {
    let question_id = comment_question(&db_pool, parent_id).await?;

    let arena = CommentArena::load(&db_pool, question_id).await?;
    arena.replies(parent_id)
}

/// Replies always land in the parent's question; a `parent` in the body is ignored.
#[debug_handler(state = AppState)]
pub(crate) async fn create_reply(
    State(db_pool): State<SqlitePool>,
    user: AuthUser,
    ApiPath(parent_id): ApiPath<i64>,
    ApiJson(payload): ApiJson<CommentPayload>,
) -> AppResult<(StatusCode, CommentJson)> {
    let question_id = comment_question(&db_pool, parent_id).await?;
    let content = payload.content()?;

    let reply = insert_comment(&db_pool, question_id, &user, Some(parent_id), content).await?;
    Ok((StatusCode::CREATED, CommentJson::leaf(&reply)?))
}
