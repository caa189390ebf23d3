use crate::handlers::health as routes;
use crate::AppState;
use axum::{routing::get, Router};

pub fn get_health() -> Router<AppState> {
	Router::new().route("/health", get(routes::health))
}
