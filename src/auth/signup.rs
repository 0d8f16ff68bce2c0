use std::sync::Arc;

use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::{create_user, hash_password, NewUser, DUPLICATE_EMAIL};
use crate::{
    config::Config,
    db::{DoctorProfile, Role, UserView},
    session::issue_token,
    validate::{ApiJson, Validator, REQUIRED},
    AppResult, AppState,
};

const GENDERS: [&str; 2] = ["male", "female"];
const KINDS: [&str; 2] = ["patient", "doctor"];

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UserPayload {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
    age: Option<i64>,
    gender: Option<String>,
    phone: Option<String>,
    city: Option<String>,
    region: Option<String>,
    medical_insurance: Option<bool>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl UserPayload {
    fn validate(&self, v: &mut Validator) -> Option<NewUser> {
        let email = v.email("email", self.email.as_deref());
        let password = v.secret("password", self.password.as_deref());
        let username = v.optional("username", self.username.as_deref(), Some(150));
        let phone = v.required("phone", self.phone.as_deref(), Some(20));
        let city = v.optional("city", self.city.as_deref(), Some(100));
        let region = v.optional("region", self.region.as_deref(), Some(100));
        let gender = v.choice("gender", self.gender.as_deref(), &GENDERS);
        v.choice("type", self.kind.as_deref(), &KINDS);
        if self.age.is_some_and(|age| age < 0) {
            v.error("age", "Ensure this value is greater than or equal to 0.");
        }

        Some(NewUser {
            email: email?,
            password: password?,
            username,
            age: self.age,
            gender,
            phone: phone?,
            city: city.unwrap_or_default(),
            region,
            medical_insurance: self.medical_insurance.unwrap_or(false),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DoctorPayload {
    user: Option<UserPayload>,
    specialization: Option<String>,
    practice_permit: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SignupResponse {
    token: String,
    user: UserView,
    status: u16,
    message: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct DoctorProfileView {
    user: UserView,
    specialization: String,
    practice_permit: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct DoctorSignupResponse {
    token: String,
    doctor_profile: DoctorProfileView,
    status: u16,
    message: &'static str,
}

async fn email_taken(db_pool: &SqlitePool, email: &str) -> AppResult<bool> {
    let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE email=?")
        .bind(email)
        .fetch_optional(db_pool)
        .await?;
    Ok(found.is_some())
}

#[debug_handler(state = AppState)]
pub(crate) async fn signup(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    ApiJson(payload): ApiJson<UserPayload>,
) -> AppResult<(StatusCode, Json<SignupResponse>)> {
    let mut v = Validator::new();
    let new_user = payload.validate(&mut v);
    if payload.kind.as_deref() == Some("doctor") {
        v.error("type", "Doctor accounts are created through /signup-doctor.");
    }
    if let Some(new_user) = &new_user {
        if email_taken(&db_pool, &new_user.email).await? {
            v.error("email", DUPLICATE_EMAIL);
        }
    }
    let new_user = v.finish_with(new_user)?;

    let password_hash = hash_password(new_user.password.clone(), config.bcrypt_cost).await?;

    let mut tx = db_pool.begin().await?;
    let user = create_user(&mut tx, new_user, &password_hash, Role::Patient).await?;
    let token = issue_token(&mut tx, user.id).await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            token,
            user: user.view(),
            status: StatusCode::CREATED.as_u16(),
            message: "Account created Success",
        }),
    ))
}

/// User, profile and token are created together or not at all.
#[debug_handler(state = AppState)]
pub(crate) async fn signup_doctor(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    ApiJson(payload): ApiJson<DoctorPayload>,
) -> AppResult<(StatusCode, Json<DoctorSignupResponse>)> {
    let mut v = Validator::new();

    let new_user = match &payload.user {
        Some(user) => {
            let mut inner = Validator::new();
            let new_user = user.validate(&mut inner);
            if let Some(new_user) = &new_user {
                if email_taken(&db_pool, &new_user.email).await? {
                    inner.error("email", DUPLICATE_EMAIL);
                }
            }
            v.nest("user", inner);
            new_user
        }
        None => {
            v.error("user", REQUIRED);
            None
        }
    };
    let specialization = v.required("specialization", payload.specialization.as_deref(), Some(100));
    let practice_permit = v.required("practice_permit", payload.practice_permit.as_deref(), Some(100));

    let (new_user, profile) = v.finish_with(match (new_user, specialization, practice_permit) {
        (Some(new_user), Some(specialization), Some(practice_permit)) => Some((
            new_user,
            DoctorProfile {
                specialization,
                practice_permit,
            },
        )),
        _ => None,
    })?;

    let password_hash = hash_password(new_user.password.clone(), config.bcrypt_cost).await?;

    let mut tx = db_pool.begin().await?;
    let user = create_user(&mut tx, new_user, &password_hash, Role::Doctor(profile.clone())).await?;
    let token = issue_token(&mut tx, user.id).await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(DoctorSignupResponse {
            token,
            doctor_profile: DoctorProfileView {
                user: user.view(),
                specialization: profile.specialization,
                practice_permit: profile.practice_permit,
            },
            status: StatusCode::CREATED.as_u16(),
            message: "success",
        }),
    ))
}
