use axum::extract::State;
use axum::{http::StatusCode, response::Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
	status: &'static str,
	version: &'static str,
	server_time: DateTime<Utc>,
}

#[instrument(name = "health", skip(state))]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
	let response = HealthResponse {
		status: "healthy",
		version: env!("CARGO_PKG_VERSION"),
		server_time: state.clock.now(),
	};

	(StatusCode::OK, Json(response))
}
