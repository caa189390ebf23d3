use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::instrument;

use crate::{ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveQuery {
	#[serde(default)]
	pub include_next: bool,
}

fn matches_etag(headers: &HeaderMap, etag: &str) -> bool {
	headers
		.get(IF_NONE_MATCH)
		.and_then(|v| v.to_str().ok())
		.is_some_and(|candidates| candidates.split(',').map(str::trim).any(|c| c == etag || c == "*"))
}

/// What is playing on a channel right now
#[instrument(name = "get_live", skip(state, headers))]
pub async fn get_live(State(state): State<AppState>, Path(category_id): Path<String>, Query(query): Query<LiveQuery>, headers: HeaderMap) -> Result<Response, ApiError> {
	let live = state.station.live_state(category_id, query.include_next).await?;
	let etag = live.etag();
	let Ok(etag_header) = HeaderValue::from_str(&etag) else {
		// Channel ids outside visible ASCII cannot be tagged
		return Ok(([(CACHE_CONTROL, HeaderValue::from_static("no-cache"))], Json(live)).into_response());
	};

	if matches_etag(&headers, &etag) {
		return Ok((StatusCode::NOT_MODIFIED, [(ETAG, etag_header)]).into_response());
	}

	Ok(([(ETAG, etag_header), (CACHE_CONTROL, HeaderValue::from_static("no-cache"))], Json(live)).into_response())
}

/// Self-contained playlist and sync anchor for local resolution
#[instrument(name = "get_manifest", skip(state))]
pub async fn get_manifest(State(state): State<AppState>, Path(category_id): Path<String>) -> Result<Response, ApiError> {
	let manifest = state.station.manifest(category_id).await?;
	let cache = HeaderValue::from_str(&format!("public, max-age={}", manifest.meta.ttl_seconds)).unwrap_or_else(|_| HeaderValue::from_static("no-cache"));
	Ok(([(CACHE_CONTROL, cache)], Json(manifest)).into_response())
}
