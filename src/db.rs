use std::str::FromStr;

use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    FromRow, SqlitePool,
};
use time::OffsetDateTime;

use crate::{res::SCHEMA, AppError, AppResult};

pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    init_schema(&db_pool).await?;
    Ok(db_pool)
}

/// A private in-memory database. A single connection that never expires,
/// since every new connection would see an empty database.
pub async fn connect_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init_schema(&db_pool).await?;
    Ok(db_pool)
}

pub async fn init_schema(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(db_pool).await?;
    Ok(())
}

pub fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

pub fn timestamp(unix: i64) -> AppResult<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp(unix)?)
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|e| e.is_unique_violation())
}

pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|e| e.is_foreign_key_violation())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoctorProfile {
    pub specialization: String,
    pub practice_permit: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Patient,
    Doctor(DoctorProfile),
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor(_) => "doctor",
        }
    }

    pub fn doctor_profile(&self) -> Option<&DoctorProfile> {
        match self {
            Role::Patient => None,
            Role::Doctor(profile) => Some(profile),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub phone: String,
    pub city: String,
    pub region: Option<String>,
    pub medical_insurance: bool,
    pub role: Role,
}

/// JSON shape of a user. `specialization` is null for patients.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: i64,
    pub username: Option<String>,
    pub email: String,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub phone: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub city: String,
    pub medical_insurance: bool,
    pub region: Option<String>,
    pub specialization: Option<String>,
}

impl User {
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            age: self.age,
            gender: self.gender.clone(),
            phone: self.phone.clone(),
            kind: self.role.as_str(),
            city: self.city.clone(),
            medical_insurance: self.medical_insurance,
            region: self.region.clone(),
            specialization: self.role.doctor_profile().map(|p| p.specialization.clone()),
        }
    }
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    email: String,
    username: Option<String>,
    age: Option<i64>,
    gender: Option<String>,
    phone: String,
    city: String,
    region: Option<String>,
    medical_insurance: bool,
    specialization: Option<String>,
    practice_permit: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let role = match (row.specialization, row.practice_permit) {
            (Some(specialization), Some(practice_permit)) => Role::Doctor(DoctorProfile {
                specialization,
                practice_permit,
            }),
            _ => Role::Patient,
        };

        User {
            id: row.id,
            email: row.email,
            username: row.username,
            age: row.age,
            gender: row.gender,
            phone: row.phone,
            city: row.city,
            region: row.region,
            medical_insurance: row.medical_insurance,
            role,
        }
    }
}

const USER_SELECT: &str = "SELECT u.id,u.email,u.username,u.age,u.gender,u.phone,u.city,u.region,u.medical_insurance,d.specialization,d.practice_permit \
    FROM users u LEFT JOIN doctor_profiles d ON d.user_id=u.id";

pub async fn fetch_user(db_pool: &SqlitePool, id: i64) -> AppResult<User> {
    let row: Option<UserRow> = sqlx::query_as(&format!("{USER_SELECT} WHERE u.id=?"))
        .bind(id)
        .fetch_optional(db_pool)
        .await?;
    row.map(User::from).ok_or_else(|| AppError::not_found("User"))
}

/// Returns the user together with their password hash.
pub async fn fetch_user_by_email(db_pool: &SqlitePool, email: &str) -> AppResult<Option<(User, String)>> {
    let Some((id, password_hash)): Option<(i64, String)> =
        sqlx::query_as("SELECT id,password_hash FROM users WHERE email=?")
            .bind(email)
            .fetch_optional(db_pool)
            .await?
    else {
        return Ok(None);
    };

    Ok(Some((fetch_user(db_pool, id).await?, password_hash)))
}

/// `{id, username}` as embedded in groups, questions and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct UserSummary {
    pub id: i64,
    pub username: Option<String>,
}

#[cfg(test)]
pub(crate) mod testutil {
    use sqlx::SqlitePool;

    use super::now;

    pub async fn pool() -> SqlitePool {
        super::connect_memory().await.unwrap()
    }

    pub async fn seed_user(db_pool: &SqlitePool, username: &str) -> i64 {
        sqlx::query("INSERT INTO users (email,username,password_hash,phone,created_at) VALUES (?,?,'x','0100',?)")
            .bind(format!("{username}@example.com"))
            .bind(username)
            .bind(now())
            .execute(db_pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    pub async fn seed_group(db_pool: &SqlitePool, name: &str, creator_id: i64, created_at: i64) -> i64 {
        sqlx::query("INSERT INTO groups (name,name_folded,description,creator_id,created_at) VALUES (?,?,'about',?,?)")
            .bind(name)
            .bind(name.to_lowercase())
            .bind(creator_id)
            .bind(created_at)
            .execute(db_pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    pub async fn seed_question(db_pool: &SqlitePool, group_id: i64, user_id: i64) -> i64 {
        sqlx::query("INSERT INTO questions (title,content,group_id,user_id,created_at) VALUES ('q','body',?,?,?)")
            .bind(group_id)
            .bind(user_id)
            .bind(now())
            .execute(db_pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    pub async fn seed_comment(db_pool: &SqlitePool, question_id: i64, user_id: i64, parent_id: Option<i64>) -> i64 {
        sqlx::query("INSERT INTO comments (content,question_id,user_id,parent_id,created_at) VALUES ('c',?,?,?,?)")
            .bind(question_id)
            .bind(user_id)
            .bind(parent_id)
            .bind(now())
            .execute(db_pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }
}
