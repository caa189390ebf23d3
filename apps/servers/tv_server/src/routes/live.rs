use crate::handlers::live as routes;
use crate::AppState;
use axum::routing::get;
use axum::Router;

pub fn live() -> Router<AppState> {
	Router::new()
		.route("/api/live/:category_id", get(routes::get_live))
		.route("/api/manifest/:category_id", get(routes::get_manifest))
}
