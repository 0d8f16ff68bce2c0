use axum::{debug_handler, extract::State, Json};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    ledger::{self, Ledger},
    session::AuthUser,
    validate::ApiPath,
    AppResult, AppState,
};

#[derive(Debug, Serialize)]
pub(crate) struct Membership {
    status: &'static str,
    is_member: bool,
    member_count: i64,
}

#[debug_handler(state = AppState)]
pub(crate) async fn toggle_membership(
    State(db_pool): State<SqlitePool>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<Membership>> {
    let toggled = ledger::toggle_in_tx(&db_pool, Ledger::GroupMembers, id, user.id).await?;

    Ok(Json(Membership {
        status: if toggled.active { "joined" } else { "left" },
        is_member: toggled.active,
        member_count: toggled.count,
    }))
}
