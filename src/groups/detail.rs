use axum::{debug_handler, extract::State, http::StatusCode, Json};
use sqlx::SqlitePool;
use tracing::info;

use crate::{
    db::is_unique_violation,
    session::AuthUser,
    validate::{ApiJson, ApiPath, Validator},
    AppError, AppResult, AppState,
};

use super::{
    clean_tags, group_creator, load_group, name_taken, replace_tags, GroupPayload, GroupView, DUPLICATE_NAME,
    NAME_MAX,
};

#[debug_handler(state = AppState)]
pub(crate) async fn group(
    State(db_pool): State<SqlitePool>,
    _user: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<GroupView>> {
    Ok(Json(load_group(&db_pool, id).await?))
}

async fn ensure_creator(db_pool: &SqlitePool, id: i64, user: &AuthUser) -> AppResult<()> {
    if group_creator(db_pool, id).await? != user.id {
        return Err(AppError::Forbidden(
            "You do not have permission to perform this action.".to_owned(),
        ));
    }
    Ok(())
}

/// Absent fields are left unchanged; `tags`, when present, replaces the set.
#[debug_handler(state = AppState)]
pub(crate) async fn update_group(
    State(db_pool): State<SqlitePool>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(GroupPayload { name, description, tags }): ApiJson<GroupPayload>,
) -> AppResult<Json<GroupView>> {
    ensure_creator(&db_pool, id, &user).await?;

    let mut v = Validator::new();
    let name = name.and_then(|n| v.required("name", Some(&n), Some(NAME_MAX)));
    let description = description.and_then(|d| v.required("description", Some(&d), None));
    let tags = tags.map(|t| clean_tags(&mut v, &t));
    if let Some(name) = &name {
        if name_taken(&db_pool, name, Some(id)).await? {
            v.error("name", DUPLICATE_NAME);
        }
    }
    v.finish()?;

    let mut tx = db_pool.begin().await?;
    let updated = sqlx::query(
        "UPDATE groups SET name=COALESCE(?,name), name_folded=COALESCE(?,name_folded), \
         description=COALESCE(?,description) WHERE id=?",
    )
    .bind(&name)
    .bind(name.as_deref().map(str::to_lowercase))
    .bind(&description)
    .bind(id)
    .execute(&mut *tx)
    .await;
    match updated {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => return Err(AppError::field("name", DUPLICATE_NAME)),
        Err(err) => return Err(err.into()),
    }
    if let Some(tags) = &tags {
        replace_tags(&mut tx, id, tags).await?;
    }
    tx.commit().await?;

    Ok(Json(load_group(&db_pool, id).await?))
}

/// Cascades to the group's questions, their comments and all votes.
#[debug_handler(state = AppState)]
pub(crate) async fn delete_group(
    State(db_pool): State<SqlitePool>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<StatusCode> {
    ensure_creator(&db_pool, id, &user).await?;

    sqlx::query("DELETE FROM groups WHERE id=?")
        .bind(id)
        .execute(&db_pool)
        .await?;

    info!(group_id = id, user_id = user.id, "group deleted");
    Ok(StatusCode::NO_CONTENT)
}
