mod detail;
mod list;

use std::collections::HashMap;

use axum::{routing::get, Router};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use time::OffsetDateTime;

use crate::{
    db::{timestamp, UserSummary},
    AppError, AppResult, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/groups/{id}/questions/", get(list::group_questions).post(list::create_question))
        .route("/questions/", get(list::all_questions))
        .route(
            "/questions/{id}/",
            get(detail::question).put(detail::update_question).delete(detail::delete_question),
        )
}

pub const TITLE_MAX: usize = 200;

#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub group: i64,
    pub user: UserSummary,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub upvotes: Vec<i64>,
    pub total_upvotes: usize,
}

#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    title: String,
    content: String,
    group_id: i64,
    user_id: i64,
    username: Option<String>,
    created_at: i64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Scope {
    All,
    Group(i64),
    One(i64),
}

impl Scope {
    fn push_where(self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Scope::All => {}
            Scope::Group(group_id) => {
                qb.push(" WHERE q.group_id=").push_bind(group_id);
            }
            Scope::One(id) => {
                qb.push(" WHERE q.id=").push_bind(id);
            }
        }
    }
}

/// Questions in `scope`, newest first.
pub(crate) async fn fetch_questions(db_pool: &SqlitePool, scope: Scope) -> AppResult<Vec<QuestionView>> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT q.id,q.title,q.content,q.group_id,q.user_id,u.username,q.created_at \
         FROM questions q JOIN users u ON u.id=q.user_id",
    );
    scope.push_where(&mut qb);
    qb.push(" ORDER BY q.created_at DESC, q.id DESC");

    let rows = qb.build_query_as::<QuestionRow>().fetch_all(db_pool).await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT qu.question_id,qu.user_id FROM question_upvotes qu JOIN questions q ON q.id=qu.question_id",
    );
    scope.push_where(&mut qb);
    qb.push(" ORDER BY qu.user_id");
    let pairs = qb.build_query_as::<(i64, i64)>().fetch_all(db_pool).await?;

    let mut upvotes: HashMap<i64, Vec<i64>> = HashMap::new();
    for (question_id, user_id) in pairs {
        upvotes.entry(question_id).or_default().push(user_id);
    }

    rows.into_iter()
        .map(|row| {
            let voters = upvotes.remove(&row.id).unwrap_or_default();
            Ok(QuestionView {
                id: row.id,
                title: row.title,
                content: row.content,
                group: row.group_id,
                user: UserSummary {
                    id: row.user_id,
                    username: row.username,
                },
                created_at: timestamp(row.created_at)?,
                total_upvotes: voters.len(),
                upvotes: voters,
            })
        })
        .collect()
}

pub(crate) async fn fetch_question(db_pool: &SqlitePool, id: i64) -> AppResult<QuestionView> {
    fetch_questions(db_pool, Scope::One(id))
        .await?
        .pop()
        .ok_or_else(|| AppError::not_found("Question"))
}

/// Author of the question, or not-found.
pub(crate) async fn question_author(db_pool: &SqlitePool, id: i64) -> AppResult<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT user_id FROM questions WHERE id=?")
        .bind(id)
        .fetch_optional(db_pool)
        .await?;
    row.map(|(user_id,)| user_id)
        .ok_or_else(|| AppError::not_found("Question"))
}

pub(crate) async fn ensure_question(db_pool: &SqlitePool, id: i64) -> AppResult<()> {
    question_author(db_pool, id).await.map(|_| ())
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionPayload {
    title: Option<String>,
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{now, testutil::*};

    #[tokio::test]
    async fn newest_first_with_upvotes() {
        let db_pool = pool().await;
        let user = seed_user(&db_pool, "amal").await;
        let voter = seed_user(&db_pool, "voter").await;
        let group = seed_group(&db_pool, "g", user, now()).await;
        let older = seed_question(&db_pool, group, user).await;
        let newer = seed_question(&db_pool, group, user).await;
        sqlx::query("INSERT INTO question_upvotes (question_id,user_id) VALUES (?,?)")
            .bind(older)
            .bind(voter)
            .execute(&db_pool)
            .await
            .unwrap();

        let questions = fetch_questions(&db_pool, Scope::Group(group)).await.unwrap();
        let ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![newer, older]);
        assert_eq!(questions[1].upvotes, vec![voter]);
        assert_eq!(questions[1].total_upvotes, 1);
        assert_eq!(questions[0].total_upvotes, 0);
    }

    #[tokio::test]
    async fn scope_group_excludes_other_groups() {
        let db_pool = pool().await;
        let user = seed_user(&db_pool, "amal").await;
        let a = seed_group(&db_pool, "a", user, now()).await;
        let b = seed_group(&db_pool, "b", user, now()).await;
        seed_question(&db_pool, a, user).await;
        let in_b = seed_question(&db_pool, b, user).await;

        let questions = fetch_questions(&db_pool, Scope::Group(b)).await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id, in_b);
        assert_eq!(fetch_questions(&db_pool, Scope::All).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn listing_does_not_bind_one_variable_per_row() {
        let db_pool = pool().await;
        let user = seed_user(&db_pool, "amal").await;
        let group = seed_group(&db_pool, "g", user, now()).await;
        sqlx::query(
            "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i+1 FROM n WHERE i<33000) \
             INSERT INTO questions (title,content,group_id,user_id,created_at) SELECT 'q','body',?,?,i FROM n",
        )
        .bind(group)
        .bind(user)
        .execute(&db_pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO question_upvotes (question_id,user_id) VALUES (1,?)")
            .bind(user)
            .execute(&db_pool)
            .await
            .unwrap();

        let questions = fetch_questions(&db_pool, Scope::All).await.unwrap();
        assert_eq!(questions.len(), 33_000);
        assert_eq!(questions.last().unwrap().upvotes, vec![user]);
        assert_eq!(fetch_questions(&db_pool, Scope::Group(group)).await.unwrap().len(), 33_000);
    }

    #[tokio::test]
    async fn missing_question_is_not_found() {
        let db_pool = pool().await;
        assert!(matches!(fetch_question(&db_pool, 3).await, Err(AppError::NotFound(_))));
        assert!(matches!(ensure_question(&db_pool, 3).await, Err(AppError::NotFound(_))));
    }
}
