//! `GET /groups/` query parameters. Every present, non-empty parameter adds
//! one condition and conditions combine with AND.

use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite};
use time::{macros::format_description, Date};

use crate::{validate::Validator, AppResult};

#[derive(Debug, Default, Deserialize)]
pub struct GroupFilter {
    pub name: Option<String>,
    #[serde(rename = "name__icontains")]
    pub name_contains: Option<String>,
    /// Exactly this tag.
    #[serde(rename = "tags__name")]
    pub tag: Option<String>,
    /// Comma-separated; any of them.
    pub tags: Option<String>,
    pub created_after: Option<String>,
    pub created_before: Option<String>,
    pub min_members: Option<String>,
    /// Creator's username.
    pub creator: Option<String>,
    /// Username of some member.
    pub member: Option<String>,
    /// Presence alone restricts to the caller's groups.
    pub my_groups: Option<String>,
}

impl GroupFilter {
    /// Appends ` AND <condition>` per active parameter to a query over `groups g`.
    pub(super) fn push_conditions(&self, qb: &mut QueryBuilder<'_, Sqlite>, user_id: i64) -> AppResult<()> {
        let mut v = Validator::new();
        let created_after = parse_day(&mut v, "created_after", non_empty(&self.created_after));
        let created_before = parse_day(&mut v, "created_before", non_empty(&self.created_before));
        let min_members = non_empty(&self.min_members).and_then(|raw| match raw.parse::<i64>() {
            Ok(n) => Some(n),
            Err(_) => {
                v.error("min_members", "Enter a number.");
                None
            }
        });
        v.finish()?;

        if let Some(name) = non_empty(&self.name) {
            qb.push(" AND g.name=").push_bind(name.to_owned());
        }
        if let Some(needle) = non_empty(&self.name_contains) {
            qb.push(" AND g.name_folded LIKE ")
                .push_bind(format!("%{}%", escape_like(&needle.to_lowercase())))
                .push(" ESCAPE '\\'");
        }
        if let Some(tag) = non_empty(&self.tag) {
            qb.push(" AND EXISTS (SELECT 1 FROM group_tags t WHERE t.group_id=g.id AND t.tag=")
                .push_bind(tag.to_owned())
                .push(")");
        }

        let any_tags = split_tags(non_empty(&self.tags));
        if !any_tags.is_empty() {
            qb.push(" AND EXISTS (SELECT 1 FROM group_tags t WHERE t.group_id=g.id AND t.tag IN (");
            let mut list = qb.separated(",");
            for tag in any_tags {
                list.push_bind(tag);
            }
            list.push_unseparated("))");
        }

        if let Some(day) = created_after {
            qb.push(" AND g.created_at>=").push_bind(day_start(day));
        }
        // Inclusive of the whole day.
        if let Some(next) = created_before.and_then(Date::next_day) {
            qb.push(" AND g.created_at<").push_bind(day_start(next));
        }

        if let Some(n) = min_members {
            qb.push(" AND (SELECT COUNT(*) FROM group_members m WHERE m.group_id=g.id)>=")
                .push_bind(n);
        }
        if let Some(creator) = non_empty(&self.creator) {
            qb.push(" AND EXISTS (SELECT 1 FROM users u WHERE u.id=g.creator_id AND u.username=")
                .push_bind(creator.to_owned())
                .push(")");
        }
        if let Some(member) = non_empty(&self.member) {
            qb.push(" AND EXISTS (SELECT 1 FROM group_members m JOIN users u ON u.id=m.user_id WHERE m.group_id=g.id AND u.username=")
                .push_bind(member.to_owned())
                .push(")");
        }
        if self.my_groups.is_some() {
            qb.push(" AND EXISTS (SELECT 1 FROM group_members m WHERE m.group_id=g.id AND m.user_id=")
                .push_bind(user_id)
                .push(")");
        }

        Ok(())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn split_tags(raw: Option<&str>) -> Vec<String> {
    raw.into_iter()
        .flat_map(|raw| raw.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_day(v: &mut Validator, field: &str, raw: Option<&str>) -> Option<Date> {
    let raw = raw?;
    match Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        Ok(day) => Some(day),
        Err(_) => {
            v.error(field, "Enter a valid date.");
            None
        }
    }
}

fn day_start(day: Date) -> i64 {
    day.midnight().assume_utc().unix_timestamp()
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
