use axum::extract::State;
use axum::Json;
use retro_broadcast::ChannelStatus;
use tracing::instrument;

use crate::{ApiError, AppState};

#[instrument(name = "list_channels", skip(state))]
pub async fn list_channels(State(state): State<AppState>) -> Result<Json<Vec<ChannelStatus>>, ApiError> {
	Ok(Json(state.station.channels().await?))
}
