//! Membership and upvote sets.
//!
//! Each ledger is an association table of `(target, user)` pairs with a
//! composite primary key, so a user is in a set at most once. Toggling
//! issues the write before anything is read, which takes SQLite's write
//! lock up front; concurrent toggles by the same user serialize and the
//! last one wins.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::{db::is_foreign_key_violation, AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ledger {
    GroupMembers,
    QuestionUpvotes,
    CommentUpvotes,
}

impl Ledger {
    fn table(self) -> &'static str {
        match self {
            Ledger::GroupMembers => "group_members",
            Ledger::QuestionUpvotes => "question_upvotes",
            Ledger::CommentUpvotes => "comment_upvotes",
        }
    }

    fn target_column(self) -> &'static str {
        match self {
            Ledger::GroupMembers => "group_id",
            Ledger::QuestionUpvotes => "question_id",
            Ledger::CommentUpvotes => "comment_id",
        }
    }

    fn target_name(self) -> &'static str {
        match self {
            Ledger::GroupMembers => "Group",
            Ledger::QuestionUpvotes => "Question",
            Ledger::CommentUpvotes => "Comment",
        }
    }
}

/// State of a set after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggled {
    pub active: bool,
    pub count: i64,
}

/// Flips `user_id` in the target's set. Returns whether the user is in the
/// set afterwards. A missing target surfaces as a foreign key violation.
pub async fn toggle(conn: &mut SqliteConnection, ledger: Ledger, target_id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
    let (table, column) = (ledger.table(), ledger.target_column());

    let removed = sqlx::query(&format!("DELETE FROM {table} WHERE {column}=? AND user_id=?"))
        .bind(target_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if removed > 0 {
        return Ok(false);
    }

    sqlx::query(&format!("INSERT INTO {table} ({column},user_id) VALUES (?,?)"))
        .bind(target_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

pub async fn count(conn: &mut SqliteConnection, ledger: Ledger, target_id: i64) -> Result<i64, sqlx::Error> {
    let (table, column) = (ledger.table(), ledger.target_column());
    let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table} WHERE {column}=?"))
        .bind(target_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(n)
}

pub async fn contains(conn: &mut SqliteConnection, ledger: Ledger, target_id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
    let (table, column) = (ledger.table(), ledger.target_column());
    let found: Option<(i64,)> = sqlx::query_as(&format!("SELECT 1 FROM {table} WHERE {column}=? AND user_id=?"))
        .bind(target_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

/// Toggle and count in one transaction.
pub async fn toggle_in_tx(db_pool: &SqlitePool, ledger: Ledger, target_id: i64, user_id: i64) -> AppResult<Toggled> {
    let mut tx = db_pool.begin().await?;

    let active = match toggle(&mut tx, ledger, target_id, user_id).await {
        Ok(active) => active,
        Err(err) if is_foreign_key_violation(&err) => {
            return Err(AppError::not_found(ledger.target_name()));
        }
        Err(err) => return Err(err.into()),
    };
    let count = count(&mut tx, ledger, target_id).await?;
    tx.commit().await?;

    debug!(?ledger, target_id, user_id, active, count, "toggled");
    Ok(Toggled { active, count })
}
