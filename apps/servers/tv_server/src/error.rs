use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use retro_broadcast::BroadcastError;
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
	#[error("user may not perform that action")]
	Forbidden,

	#[error("request path not found")]
	NotFound,

	#[error("{0}")]
	Broadcast(#[from] BroadcastError),
}

impl ApiError {
	const fn status_code(&self) -> StatusCode {
		match self {
			Self::Forbidden => StatusCode::FORBIDDEN,
			Self::NotFound => StatusCode::NOT_FOUND,
			Self::Broadcast(e) => match e {
				BroadcastError::UnknownChannel(_) | BroadcastError::EmptyPlaylist | BroadcastError::InvalidPlaylistDuration => StatusCode::NOT_FOUND,
				BroadcastError::InvalidVideoIndex { .. } | BroadcastError::InvalidTimestamp(_) => StatusCode::BAD_REQUEST,
				BroadcastError::EpochUnavailable(_) | BroadcastError::Http(_) | BroadcastError::EngineStopped => StatusCode::SERVICE_UNAVAILABLE,
				BroadcastError::ChecksumMismatch(_) => StatusCode::BAD_GATEWAY,
				_ => StatusCode::INTERNAL_SERVER_ERROR,
			},
		}
	}
}

#[derive(Serialize)]
struct ErrorBody {
	error: String,
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status_code();
		if status.is_server_error() {
			tracing::error!(error = %self, "request failed");
		}
		(status, Json(ErrorBody { error: self.to_string() })).into_response()
	}
}
