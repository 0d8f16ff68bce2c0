use axum::{debug_handler, extract::{Query, State}, http::StatusCode, Json};
use sqlx::SqlitePool;
use tracing::info;

use crate::{
    db::{is_unique_violation, now},
    session::AuthUser,
    validate::{ApiJson, Validator},
    AppError, AppResult, AppState,
};

use super::{
    clean_tags, load_group, load_groups, name_taken, replace_tags, GroupFilter, GroupPayload, GroupView, Selection,
    DUPLICATE_NAME, NAME_MAX,
};

#[debug_handler(state = AppState)]
pub(crate) async fn list_groups(
    State(db_pool): State<SqlitePool>,
    user: AuthUser,
    Query(filter): Query<GroupFilter>,
) -> AppResult<Json<Vec<GroupView>>> {
    let selection = Selection::Matching {
        filter: &filter,
        user_id: user.id,
    };
    Ok(Json(load_groups(&db_pool, selection).await?))
}

/// The creator is not made a member; joining is a separate toggle.
#[debug_handler(state = AppState)]
pub(crate) async fn create_group(
    State(db_pool): State<SqlitePool>,
    user: AuthUser,
    ApiJson(GroupPayload { name, description, tags }): ApiJson<GroupPayload>,
) -> AppResult<(StatusCode, Json<GroupView>)> {
    let mut v = Validator::new();
    let name = v.required("name", name.as_deref(), Some(NAME_MAX));
    let description = v.required("description", description.as_deref(), None);
    let tags = clean_tags(&mut v, tags.as_deref().unwrap_or_default());
    if let Some(name) = &name {
        if name_taken(&db_pool, name, None).await? {
            v.error("name", DUPLICATE_NAME);
        }
    }
    v.finish()?;

    let mut tx = db_pool.begin().await?;
    let inserted = sqlx::query("INSERT INTO groups (name,name_folded,description,creator_id,created_at) VALUES (?,?,?,?,?)")
        .bind(&name)
        .bind(name.as_deref().map(str::to_lowercase))
        .bind(&description)
        .bind(user.id)
        .bind(now())
        .execute(&mut *tx)
        .await;
    let id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(err) if is_unique_violation(&err) => return Err(AppError::field("name", DUPLICATE_NAME)),
        Err(err) => return Err(err.into()),
    };
    replace_tags(&mut tx, id, &tags).await?;
    tx.commit().await?;

    info!(group_id = id, user_id = user.id, "group created");
    Ok((StatusCode::CREATED, Json(load_group(&db_pool, id).await?)))
}
