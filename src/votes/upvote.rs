use std::str::FromStr;

use axum::{debug_handler, extract::State, Json};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    ledger::{self, Ledger},
    session::AuthUser,
    validate::ApiPath,
    AppError, AppResult, AppState,
};

/// Entity types that carry an upvote set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Votable {
    Question,
    Comment,
}

impl Votable {
    pub fn ledger(self) -> Ledger {
        match self {
            Votable::Question => Ledger::QuestionUpvotes,
            Votable::Comment => Ledger::CommentUpvotes,
        }
    }
}

impl FromStr for Votable {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "question" => Ok(Votable::Question),
            "comment" => Ok(Votable::Comment),
            _ => Err(AppError::NotFound(format!("Unknown model type \"{s}\"."))),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Upvote {
    upvoted: bool,
    total_upvotes: i64,
}

#[debug_handler(state = AppState)]
pub(crate) async fn toggle_upvote(
    State(db_pool): State<SqlitePool>,
    user: AuthUser,
    ApiPath((model_type, id)): ApiPath<(String, i64)>,
) -> AppResult<Json<Upvote>> {
    let votable: Votable = model_type.parse()?;
    let toggled = ledger::toggle_in_tx(&db_pool, votable.ledger(), id, user.id).await?;

    Ok(Json(Upvote {
        upvoted: toggled.active,
        total_upvotes: toggled.count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_types_only() {
        assert_eq!("question".parse::<Votable>().unwrap(), Votable::Question);
        assert_eq!("comment".parse::<Votable>().unwrap().ledger(), Ledger::CommentUpvotes);
        assert!(matches!("group".parse::<Votable>(), Err(AppError::NotFound(_))));
        assert!("Question".parse::<Votable>().is_err());
    }
}
