use thiserror::Error;

use crate::persistence::StoreError;
use crate::sync::DriverError;

pub type Result<T> = std::result::Result<T, BroadcastError>;

#[derive(Error, Debug)]
pub enum BroadcastError {
	#[error("epoch unavailable: {0}")]
	EpochUnavailable(String),

	#[error("playlist is empty")]
	EmptyPlaylist,

	#[error("playlist total duration is zero")]
	InvalidPlaylistDuration,

	#[error("persistence quota exceeded with {retained} channel records retained")]
	PersistenceQuotaExceeded { retained: usize },

	#[error("driver operation failed: {0}")]
	DriverOperationFailed(#[from] DriverError),

	#[error("configuration error: {0}")]
	Configuration(String),

	#[error("unknown channel: {0}")]
	UnknownChannel(String),

	#[error("video index {index} out of range for {len} videos")]
	InvalidVideoIndex { index: usize, len: usize },

	#[error("epoch checksum mismatch for {0}")]
	ChecksumMismatch(String),

	#[error("invalid timestamp: {0}")]
	InvalidTimestamp(String),

	#[error("store error: {0}")]
	Store(#[from] StoreError),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("http error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("station engine stopped")]
	EngineStopped,
}
