use crate::handlers::channels as routes;
use crate::AppState;
use axum::routing::get;
use axum::Router;

pub fn channels() -> Router<AppState> {
	Router::new().route("/api/channels", get(routes::list_channels))
}
