pub mod appresult;
pub mod auth;
pub mod comments;
pub mod config;
pub mod db;
pub mod groups;
pub mod ledger;
pub mod questions;
pub mod res;
pub mod session;
pub mod validate;
pub mod votes;

use std::sync::Arc;

use axum::{
    extract::FromRef,
    http::{header, Method},
    Router,
};
use sqlx::SqlitePool;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use appresult::{AppError, AppResult};
pub use config::Config;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: Config) -> Self {
        Self {
            db_pool,
            config: Arc::new(config),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .merge(auth::router())
        .merge(groups::router())
        .merge(questions::router())
        .merge(comments::router())
        .merge(votes::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
