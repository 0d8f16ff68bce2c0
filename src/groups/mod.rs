mod detail;
pub mod filter;
mod join;
mod list;

use std::collections::HashMap;

use axum::{routing::{get, post}, Router};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use time::OffsetDateTime;

pub use filter::GroupFilter;

use crate::{
    db::{timestamp, UserSummary},
    validate::Validator,
    AppError, AppResult, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/groups/", get(list::list_groups).post(list::create_group))
        .route(
            "/groups/{id}/",
            get(detail::group).put(detail::update_group).delete(detail::delete_group),
        )
        .route("/groups/{id}/join/", post(join::toggle_membership))
}

pub const NAME_MAX: usize = 100;
pub const TAG_MAX: usize = 100;
const DUPLICATE_NAME: &str = "group with this name already exists.";

#[derive(Debug, Serialize)]
pub struct GroupView {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub creator: UserSummary,
    pub members: Vec<UserSummary>,
    pub member_count: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub tags: Vec<String>,
}

#[derive(FromRow)]
struct GroupRow {
    id: i64,
    name: String,
    description: String,
    creator_id: i64,
    creator_username: Option<String>,
    created_at: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GroupPayload {
    name: Option<String>,
    description: Option<String>,
    tags: Option<Vec<String>>,
}

/// Which groups `load_groups` returns.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Selection<'a> {
    One(i64),
    Matching { filter: &'a GroupFilter, user_id: i64 },
}

impl Selection<'_> {
    // Pushes ` (<subquery of group ids>)`.
    fn push_ids(self, qb: &mut QueryBuilder<'_, Sqlite>) -> AppResult<()> {
        qb.push(" (");
        match self {
            Selection::One(id) => {
                qb.push("SELECT ").push_bind(id);
            }
            Selection::Matching { filter, user_id } => {
                qb.push("SELECT g.id FROM groups g WHERE 1=1");
                filter.push_conditions(qb, user_id)?;
            }
        }
        qb.push(")");
        Ok(())
    }
}

/// Groups with their members and tags, ordered by id.
pub(crate) async fn load_groups(db_pool: &SqlitePool, selection: Selection<'_>) -> AppResult<Vec<GroupView>> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT g.id,g.name,g.description,g.creator_id,u.username AS creator_username,g.created_at \
         FROM groups g JOIN users u ON u.id=g.creator_id WHERE g.id IN",
    );
    selection.push_ids(&mut qb)?;
    qb.push(" ORDER BY g.id");
    let rows = qb.build_query_as::<GroupRow>().fetch_all(db_pool).await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT gm.group_id,u.id,u.username FROM group_members gm JOIN users u ON u.id=gm.user_id WHERE gm.group_id IN",
    );
    selection.push_ids(&mut qb)?;
    qb.push(" ORDER BY u.id");
    let mut members: HashMap<i64, Vec<UserSummary>> = HashMap::new();
    for (group_id, id, username) in qb.build_query_as::<(i64, i64, Option<String>)>().fetch_all(db_pool).await? {
        members.entry(group_id).or_default().push(UserSummary { id, username });
    }

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT group_id,tag FROM group_tags WHERE group_id IN");
    selection.push_ids(&mut qb)?;
    qb.push(" ORDER BY tag");
    let mut tags: HashMap<i64, Vec<String>> = HashMap::new();
    for (group_id, tag) in qb.build_query_as::<(i64, String)>().fetch_all(db_pool).await? {
        tags.entry(group_id).or_default().push(tag);
    }

    rows.into_iter()
        .map(|row| {
            let group_members = members.remove(&row.id).unwrap_or_default();
            Ok(GroupView {
                id: row.id,
                name: row.name,
                description: row.description,
                creator: UserSummary {
                    id: row.creator_id,
                    username: row.creator_username,
                },
                member_count: group_members.len(),
                members: group_members,
                created_at: timestamp(row.created_at)?,
                tags: tags.remove(&row.id).unwrap_or_default(),
            })
        })
        .collect()
}

pub(crate) async fn load_group(db_pool: &SqlitePool, id: i64) -> AppResult<GroupView> {
    load_groups(db_pool, Selection::One(id))
        .await?
        .pop()
        .ok_or_else(|| AppError::not_found("Group"))
}

/// Creator of the group, or not-found.
pub(crate) async fn group_creator(db_pool: &SqlitePool, id: i64) -> AppResult<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT creator_id FROM groups WHERE id=?")
        .bind(id)
        .fetch_optional(db_pool)
        .await?;
    row.map(|(creator_id,)| creator_id)
        .ok_or_else(|| AppError::not_found("Group"))
}

pub async fn ensure_group(db_pool: &SqlitePool, id: i64) -> AppResult<()> {
    group_creator(db_pool, id).await.map(|_| ())
}

async fn name_taken(db_pool: &SqlitePool, name: &str, except: Option<i64>) -> AppResult<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM groups WHERE name=?")
        .bind(name)
        .fetch_optional(db_pool)
        .await?;
    Ok(row.is_some_and(|(id,)| Some(id) != except))
}

/// Trimmed, deduplicated, comma-free labels.
fn clean_tags(v: &mut Validator, tags: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for tag in tags {
        let Some(tag) = v.required("tags", Some(tag), Some(TAG_MAX)) else {
            continue;
        };
        if tag.contains(',') {
            v.error("tags", "Tags may not contain commas.");
        } else if !cleaned.contains(&tag) {
            cleaned.push(tag);
        }
    }
    cleaned
}

async fn replace_tags(conn: &mut SqliteConnection, group_id: i64, tags: &[String]) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM group_tags WHERE group_id=?")
        .bind(group_id)
        .execute(&mut *conn)
        .await?;
    for tag in tags {
        sqlx::query("INSERT INTO group_tags (group_id,tag) VALUES (?,?)")
            .bind(group_id)
            .bind(tag)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{now, testutil::*};

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let mut v = Validator::new();
        let tags = clean_tags(&mut v, &[" python ".into(), "python".into(), "django".into()]);
        assert_eq!(tags, vec!["python", "django"]);
        assert!(v.is_valid());
    }

    #[test]
    fn tags_reject_commas_and_blanks() {
        let mut v = Validator::new();
        clean_tags(&mut v, &["a,b".into(), "  ".into()]);
        assert!(!v.is_valid());
    }

    #[tokio::test]
    async fn loads_members_and_tags() {
        let db_pool = pool().await;
        let creator = seed_user(&db_pool, "creator").await;
        let member = seed_user(&db_pool, "amal").await;
        let group = seed_group(&db_pool, "asthma", creator, now()).await;
        sqlx::query("INSERT INTO group_members (group_id,user_id) VALUES (?,?)")
            .bind(group)
            .bind(member)
            .execute(&db_pool)
            .await
            .unwrap();
        let mut conn = db_pool.acquire().await.unwrap();
        replace_tags(&mut conn, group, &["lungs".into(), "allergy".into()]).await.unwrap();
        drop(conn);

        let view = load_group(&db_pool, group).await.unwrap();
        assert_eq!(view.creator.username.as_deref(), Some("creator"));
        assert_eq!(view.member_count, 1);
        assert_eq!(view.members[0].id, member);
        assert_eq!(view.tags, vec!["allergy", "lungs"]);
    }

    #[tokio::test]
    async fn name_taken_ignores_self() {
        let db_pool = pool().await;
        let creator = seed_user(&db_pool, "creator").await;
        let group = seed_group(&db_pool, "asthma", creator, now()).await;

        assert!(name_taken(&db_pool, "asthma", None).await.unwrap());
        assert!(!name_taken(&db_pool, "asthma", Some(group)).await.unwrap());
        assert!(!name_taken(&db_pool, "flu", None).await.unwrap());
    }

    #[tokio::test]
    async fn listing_does_not_bind_one_variable_per_row() {
        let db_pool = pool().await;
        let creator = seed_user(&db_pool, "creator").await;
        sqlx::query(
            "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i+1 FROM n WHERE i<33000) \
             INSERT INTO groups (name,name_folded,description,creator_id,created_at) \
             SELECT 'group '||i,'group '||i,'about',?,i FROM n",
        )
        .bind(creator)
        .execute(&db_pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO group_members (group_id,user_id) SELECT id,? FROM groups")
            .bind(creator)
            .execute(&db_pool)
            .await
            .unwrap();

        let filter = GroupFilter::default();
        let groups = load_groups(&db_pool, Selection::Matching { filter: &filter, user_id: creator })
            .await
            .unwrap();
        assert_eq!(groups.len(), 33_000);
        assert!(groups.iter().all(|g| g.member_count == 1));
    }

    #[tokio::test]
    async fn missing_group_is_not_found() {
        let db_pool = pool().await;
        assert!(matches!(load_group(&db_pool, 5).await, Err(AppError::NotFound(_))));
        assert!(matches!(ensure_group(&db_pool, 5).await, Err(AppError::NotFound(_))));
    }
}
