use std::collections::HashMap;

use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;

use crate::{
    db::{timestamp, UserSummary},
    AppResult,
};

#[derive(Debug, Clone, FromRow)]
pub struct CommentRecord {
    pub id: i64,
    pub content: String,
    pub question_id: i64,
    pub parent_id: Option<i64>,
    pub created_at: i64,
    pub user_id: i64,
    pub username: Option<String>,
}

/// One comment without its replies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentNode {
    pub id: i64,
    pub content: String,
    pub question: i64,
    pub user: UserSummary,
    pub parent: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub upvotes: Vec<i64>,
    pub total_upvotes: usize,
}

/// Rendered JSON where every comment carries a `replies` array of its
/// children. Written with an explicit stack, so nesting depth costs heap,
/// not call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentJson(Vec<u8>);

impl CommentJson {
    /// A comment that has no replies yet.
    pub fn leaf(node: &CommentNode) -> AppResult<Self> {
        let mut out = Vec::new();
        open_node(&mut out, node)?;
        out.extend_from_slice(b"]}");
        Ok(Self(out))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl IntoResponse for CommentJson {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "application/json")], self.0).into_response()
    }
}

// Writes the node's object up to an open `"replies":[`.
fn open_node(out: &mut Vec<u8>, node: &CommentNode) -> AppResult<()> {
    serde_json::to_writer(&mut *out, node)?;
    out.pop();
    out.extend_from_slice(b",\"replies\":[");
    Ok(())
}

/// Every comment of one question, keyed by id. Parents are referenced by id
/// only; the tree is rebuilt on read by grouping children under their parent.
#[derive(Debug, Default)]
pub struct CommentArena {
    records: HashMap<i64, CommentRecord>,
    children: HashMap<Option<i64>, Vec<i64>>,
    upvotes: HashMap<i64, Vec<i64>>,
}

impl CommentArena {
    /// `upvotes` holds `(comment_id, user_id)` pairs.
    pub fn new(records: impl IntoIterator<Item = CommentRecord>, upvotes: impl IntoIterator<Item = (i64, i64)>) -> Self {
        let mut records: Vec<CommentRecord> = records.into_iter().collect();
        records.sort_by_key(|r| r.id);

        let mut arena = CommentArena::default();
        for record in records {
            arena.children.entry(record.parent_id).or_default().push(record.id);
            arena.records.insert(record.id, record);
        }
        for (comment_id, user_id) in upvotes {
            arena.upvotes.entry(comment_id).or_default().push(user_id);
        }
        arena
    }

    pub async fn load(db_pool: &SqlitePool, question_id: i64) -> AppResult<Self> {
        let records: Vec<CommentRecord> = sqlx::query_as(
            "SELECT c.id,c.content,c.question_id,c.parent_id,c.created_at,c.user_id,u.username \
             FROM comments c JOIN users u ON u.id=c.user_id WHERE c.question_id=? ORDER BY c.id",
        )
        .bind(question_id)
        .fetch_all(db_pool)
        .await?;

        let upvotes: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT cu.comment_id,cu.user_id FROM comment_upvotes cu JOIN comments c ON c.id=cu.comment_id \
             WHERE c.question_id=? ORDER BY cu.user_id",
        )
        .bind(question_id)
        .fetch_all(db_pool)
        .await?;

        Ok(Self::new(records, upvotes))
    }

    /// Top-level comments, each with its full reply tree.
    pub fn roots(&self) -> AppResult<CommentJson> {
        self.render(None)
    }

    /// Direct replies of `parent_id`, each with its full reply tree.
    pub fn replies(&self, parent_id: i64) -> AppResult<CommentJson> {
        self.render(Some(parent_id))
    }

    fn children_of(&self, parent_id: Option<i64>) -> &[i64] {
        self.children.get(&parent_id).map(Vec::as_slice).unwrap_or_default()
    }

    // Depth-first over sibling iterators. A node is opened when first
    // reached and closed once its iterator runs dry. A parent always exists
    // before its child is inserted, so no comment is its own ancestor.
    fn render(&self, parent_id: Option<i64>) -> AppResult<CommentJson> {
        let mut out = vec![b'['];
        let mut pending = vec![self.children_of(parent_id).iter()];
        let mut first = true;

        while let Some(siblings) = pending.last_mut() {
            let Some(id) = siblings.next() else {
                pending.pop();
                out.push(b']');
                if !pending.is_empty() {
                    out.push(b'}');
                }
                first = false;
                continue;
            };
            let Some(record) = self.records.get(id) else {
                continue;
            };

            if !first {
                out.push(b',');
            }
            open_node(&mut out, &self.node(record)?)?;
            first = true;
            pending.push(self.children_of(Some(*id)).iter());
        }

        Ok(CommentJson(out))
    }

    fn node(&self, record: &CommentRecord) -> AppResult<CommentNode> {
        let upvotes = self.upvotes.get(&record.id).cloned().unwrap_or_default();
        Ok(CommentNode {
            id: record.id,
            content: record.content.clone(),
            question: record.question_id,
            user: UserSummary {
                id: record.user_id,
                username: record.username.clone(),
            },
            parent: record.parent_id,
            created_at: timestamp(record.created_at)?,
            total_upvotes: upvotes.len(),
            upvotes,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::db::{now, testutil::*};

    fn record(id: i64, parent_id: Option<i64>) -> CommentRecord {
        CommentRecord {
            id,
            content: format!("comment {id}"),
            question_id: 1,
            parent_id,
            created_at: 1_700_000_000 + id,
            user_id: 10,
            username: Some("amal".to_owned()),
        }
    }

    fn parse(rendered: CommentJson) -> Value {
        serde_json::from_slice(rendered.as_bytes()).unwrap()
    }

    fn ids(nodes: &Value) -> Vec<i64> {
        nodes.as_array().unwrap().iter().map(|n| n["id"].as_i64().unwrap()).collect()
    }

    #[test]
    fn roots_carry_nested_replies() {
        // 1 ─┬─ 2 ── 4
        //    └─ 3
        // 5
        let arena = CommentArena::new(
            vec![record(4, Some(2)), record(1, None), record(3, Some(1)), record(2, Some(1)), record(5, None)],
            vec![],
        );

        let roots = parse(arena.roots().unwrap());
        assert_eq!(ids(&roots), vec![1, 5]);
        assert_eq!(ids(&roots[0]["replies"]), vec![2, 3]);
        assert_eq!(ids(&roots[0]["replies"][0]["replies"]), vec![4]);
        assert_eq!(roots[1]["replies"], json!([]));
    }

    #[test]
    fn replies_are_only_direct_children() {
        let arena = CommentArena::new(
            vec![record(1, None), record(2, Some(1)), record(3, Some(2)), record(4, None), record(5, Some(4))],
            vec![],
        );

        let replies = parse(arena.replies(1).unwrap());
        assert_eq!(ids(&replies), vec![2]);
        assert_eq!(replies[0]["parent"], 1);
        assert_eq!(ids(&replies[0]["replies"]), vec![3]);
        assert_eq!(parse(arena.replies(3).unwrap()), json!([]));
    }

    #[test]
    fn upvotes_attach_to_their_comment() {
        let arena = CommentArena::new(vec![record(1, None), record(2, Some(1))], vec![(2, 7), (2, 8)]);

        let roots = parse(arena.roots().unwrap());
        assert_eq!(roots[0]["total_upvotes"], 0);
        assert_eq!(roots[0]["replies"][0]["upvotes"], json!([7, 8]));
        assert_eq!(roots[0]["replies"][0]["total_upvotes"], 2);
    }

    #[test]
    fn serializes_recursive_shape() {
        let arena = CommentArena::new(vec![record(1, None), record(2, Some(1))], vec![(1, 3)]);
        let json = parse(arena.roots().unwrap());

        assert_eq!(json[0]["user"], json!({ "id": 10, "username": "amal" }));
        assert_eq!(json[0]["total_upvotes"], 1);
        assert_eq!(json[0]["replies"][0]["parent"], 1);
        assert_eq!(json[0]["replies"][0]["replies"], json!([]));
        assert_eq!(json[0]["created_at"], "2023-11-14T22:13:21Z");
    }

    #[test]
    fn leaf_has_empty_replies() {
        let arena = CommentArena::new(vec![record(1, None)], vec![]);
        let node = arena.node(&record(1, None)).unwrap();

        let leaf = parse(CommentJson::leaf(&node).unwrap());
        assert_eq!(leaf["id"], 1);
        assert_eq!(leaf["replies"], json!([]));
    }

    #[test]
    fn empty_arena_renders_empty_list() {
        let arena = CommentArena::new(vec![], vec![]);
        assert_eq!(arena.roots().unwrap().as_bytes(), b"[]");
    }

    fn assert_chain(rendered: &CommentJson, depth: usize) {
        let text = std::str::from_utf8(rendered.as_bytes()).unwrap();
        assert!(text.starts_with("[{\"id\":"));
        assert_eq!(text.matches("\"replies\":[").count(), depth);
        assert_eq!(text.matches('[').count(), text.matches(']').count());
        assert_eq!(text.matches('{').count(), text.matches('}').count());

        let tail = format!("\"replies\":[{}]", "]}".repeat(depth));
        assert!(text.ends_with(&tail));
    }

    #[test]
    fn deep_chain_renders_without_recursion() {
        let depth = 20_000;
        let records = (1..=depth).map(|id| record(id, if id == 1 { None } else { Some(id - 1) }));
        let arena = CommentArena::new(records, vec![]);

        assert_chain(&arena.roots().unwrap(), depth as usize);
        assert_chain(&arena.replies(1).unwrap(), depth as usize - 1);
    }

    #[tokio::test]
    async fn deep_chain_loads_from_the_database() {
        let db_pool = pool().await;
        let user = seed_user(&db_pool, "amal").await;
        let group = seed_group(&db_pool, "g", user, now()).await;
        let question = seed_question(&db_pool, group, user).await;

        sqlx::query(
            "WITH RECURSIVE chain(n) AS (SELECT 1 UNION ALL SELECT n+1 FROM chain WHERE n<12000) \
             INSERT INTO comments (id,content,question_id,user_id,parent_id,created_at) \
             SELECT n,'reply '||n,?,?,CASE WHEN n=1 THEN NULL ELSE n-1 END,? FROM chain",
        )
        .bind(question)
        .bind(user)
        .bind(now())
        .execute(&db_pool)
        .await
        .unwrap();

        let arena = CommentArena::load(&db_pool, question).await.unwrap();
        assert_chain(&arena.roots().unwrap(), 12_000);
    }
}
