use axum::{debug_handler, Json};

use crate::{session::AuthUser, AppState};

#[debug_handler(state = AppState)]
pub(crate) async fn test_token(user: AuthUser) -> Json<String> {
    Json(format!("passed for {} ", user.email))
}
