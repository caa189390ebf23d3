use crate::handlers::epoch as routes;
use crate::AppState;
use axum::routing::{get, post};
use axum::Router;

pub fn epoch() -> Router<AppState> {
	Router::new().route("/api/epoch", get(routes::get_epoch)).route("/api/epoch/reset", post(routes::reset_epoch))
}
