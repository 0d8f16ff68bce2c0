mod login;
mod signup;
mod test_token;

use axum::{routing::{get, post}, Router};
use sqlx::SqliteConnection;
use tracing::info;

use crate::{
    db::{is_unique_violation, now, Role, User},
    AppError, AppResult, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login::login))
        .route("/signup", post(signup::signup))
        .route("/signup-doctor", post(signup::signup_doctor))
        .route("/test-token", get(test_token::test_token))
}

pub(crate) const DUPLICATE_EMAIL: &str = "user with this email already exists.";

/// Validated account fields, password still in clear.
#[derive(Debug, Clone)]
pub(crate) struct NewUser {
    pub email: String,
    pub password: String,
    pub username: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub phone: String,
    pub city: String,
    pub region: Option<String>,
    pub medical_insurance: bool,
}

/// Inserts the user and, for doctors, the profile. Callers wrap this in a
/// transaction so neither row survives a later failure.
pub(crate) async fn create_user(
    conn: &mut SqliteConnection,
    new_user: NewUser,
    password_hash: &str,
    role: Role,
) -> AppResult<User> {
    let inserted = sqlx::query(
        "INSERT INTO users (email,username,password_hash,type,age,gender,phone,city,region,medical_insurance,created_at) \
         VALUES (?,?,?,?,?,?,?,?,?,?,?)",
    )
    .bind(&new_user.email)
    .bind(&new_user.username)
    .bind(password_hash)
    .bind(role.as_str())
    .bind(new_user.age)
    .bind(&new_user.gender)
    .bind(&new_user.phone)
    .bind(&new_user.city)
    .bind(&new_user.region)
    .bind(new_user.medical_insurance)
    .bind(now())
    .execute(&mut *conn)
    .await;
    let id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(err) if is_unique_violation(&err) => return Err(AppError::field("email", DUPLICATE_EMAIL)),
        Err(err) => return Err(err.into()),
    };

    if let Role::Doctor(profile) = &role {
        sqlx::query("INSERT INTO doctor_profiles (user_id,specialization,practice_permit) VALUES (?,?,?)")
            .bind(id)
            .bind(&profile.specialization)
            .bind(&profile.practice_permit)
            .execute(&mut *conn)
            .await?;
    }

    info!(user_id = id, role = role.as_str(), "account created");
    Ok(User {
        id,
        email: new_user.email,
        username: new_user.username,
        age: new_user.age,
        gender: new_user.gender,
        phone: new_user.phone,
        city: new_user.city,
        region: new_user.region,
        medical_insurance: new_user.medical_insurance,
        role,
    })
}

pub(crate) async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    Ok(tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??)
}

pub(crate) async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    Ok(tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{fetch_user, testutil::pool, DoctorProfile};

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_owned(),
            password: "pw".to_owned(),
            username: Some("hany".to_owned()),
            age: Some(40),
            gender: Some("male".to_owned()),
            phone: "0100".to_owned(),
            city: "Cairo".to_owned(),
            region: None,
            medical_insurance: true,
        }
    }

    #[tokio::test]
    async fn password_round_trip() {
        let hash = hash_password("s3cret".to_owned(), 4).await.unwrap();
        assert!(verify_password("s3cret".to_owned(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong".to_owned(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn doctor_rows_roll_back_together() {
        let db_pool = pool().await;
        let role = Role::Doctor(DoctorProfile {
            specialization: "neurology".to_owned(),
            practice_permit: "P-9".to_owned(),
        });

        let mut tx = db_pool.begin().await.unwrap();
        let user = create_user(&mut tx, new_user("hany@clinic.org"), "hash", role).await.unwrap();
        tx.rollback().await.unwrap();

        let (users,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users").fetch_one(&db_pool).await.unwrap();
        let (profiles,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM doctor_profiles").fetch_one(&db_pool).await.unwrap();
        assert_eq!((users, profiles), (0, 0));
        assert!(fetch_user(&db_pool, user.id).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_email_is_field_error() {
        let db_pool = pool().await;
        let mut conn = db_pool.acquire().await.unwrap();
        create_user(&mut conn, new_user("a@b.co"), "hash", Role::Patient).await.unwrap();

        let err = create_user(&mut conn, new_user("a@b.co"), "hash", Role::Patient).await.unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors["email"], vec![DUPLICATE_EMAIL]);
    }
}
