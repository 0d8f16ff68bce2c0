mod upvote;

use axum::{routing::post, Router};

use crate::AppState;

pub use upvote::Votable;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upvote/{model_type}/{id}/", post(upvote::toggle_upvote))
}
