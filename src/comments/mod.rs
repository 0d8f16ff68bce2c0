mod list;
mod replies;
pub mod tree;

use axum::{routing::get, Router};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

pub use tree::{CommentArena, CommentJson, CommentNode};

use crate::{
    db::{now, timestamp, UserSummary},
    session::AuthUser,
    validate::Validator,
    AppError, AppResult, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/questions/{id}/comments/", get(list::question_comments).post(list::create_comment))
        .route("/comments/{parent}/replies/", get(replies::replies).post(replies::create_reply))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentPayload {
    content: Option<String>,
    parent: Option<i64>,
}

impl CommentPayload {
    fn content(&self) -> AppResult<String> {
        let mut v = Validator::new();
        let content = v.required("content", self.content.as_deref(), None);
        v.finish()?;
        Ok(content.unwrap_or_default())
    }
}

/// The question a comment belongs to.
pub(crate) async fn comment_question(db_pool: &SqlitePool, comment_id: i64) -> AppResult<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT question_id FROM comments WHERE id=?")
        .bind(comment_id)
        .fetch_optional(db_pool)
        .await?;
    row.map(|(question_id,)| question_id)
        .ok_or_else(|| AppError::not_found("Comment"))
}

/// Inserts a comment. A parent must already exist in the same question.
pub(crate) async fn insert_comment(
    db_pool: &SqlitePool,
    question_id: i64,
    author: &AuthUser,
    parent_id: Option<i64>,
    content: String,
) -> AppResult<CommentNode> {
    let mut tx = db_pool.begin().await?;

    if let Some(parent_id) = parent_id {
        let parent: Option<(i64,)> = sqlx::query_as("SELECT question_id FROM comments WHERE id=?")
            .bind(parent_id)
            .fetch_optional(&mut *tx)
            .await?;
        match parent {
            None => {
                return Err(AppError::field(
                    "parent",
                    format!("Invalid pk \"{parent_id}\" - object does not exist."),
                ));
            }
            Some((parent_question,)) if parent_question != question_id => {
                return Err(AppError::field(
                    "parent",
                    "Parent comment belongs to a different question.",
                ));
            }
            Some(_) => {}
        }
    }

    let created_at = now();
    let id = sqlx::query("INSERT INTO comments (content,question_id,user_id,parent_id,created_at) VALUES (?,?,?,?,?)")
        .bind(&content)
        .bind(question_id)
        .bind(author.id)
        .bind(parent_id)
        .bind(created_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
    tx.commit().await?;

    info!(comment_id = id, question_id, ?parent_id, user_id = author.id, "comment created");
    Ok(CommentNode {
        id,
        content,
        question: question_id,
        user: UserSummary {
            id: author.id,
            username: author.username.clone(),
        },
        parent: parent_id,
        created_at: timestamp(created_at)?,
        upvotes: Vec::new(),
        total_upvotes: 0,
    })
}
