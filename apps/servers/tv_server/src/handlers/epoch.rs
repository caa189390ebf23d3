use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use retro_broadcast::epoch::{EpochRecord, ADMIN_TOKEN_HEADER};
use tracing::{instrument, warn};

use crate::{ApiError, AppState};

#[instrument(name = "get_epoch", skip(state))]
pub async fn get_epoch(State(state): State<AppState>) -> Result<Json<EpochRecord>, ApiError> {
	Ok(Json(state.authority.fetch().await?))
}

/// Mint a new epoch; every channel restarts from its first video
#[instrument(name = "reset_epoch", skip(state, headers))]
pub async fn reset_epoch(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<EpochRecord>, ApiError> {
	let Some(expected) = state.config.admin_token.as_deref() else {
		return Err(ApiError::NotFound);
	};
	let supplied = headers.get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok());
	if supplied != Some(expected) {
		warn!("epoch reset rejected");
		return Err(ApiError::Forbidden);
	}

	let epoch = state.station.reset_epoch().await?;
	warn!(epoch = %epoch.to_iso(), "epoch reset by administrator");
	Ok(Json(state.authority.fetch().await?))
}
