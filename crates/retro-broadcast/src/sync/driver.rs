use async_trait::async_trait;
use thiserror::Error;

use crate::error::Result;
use crate::resolver::Position;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
	#[error("player not ready")]
	NotReady,

	#[error("seek failed: {0}")]
	Seek(String),

	#[error("playback rate change failed: {0}")]
	PlaybackRate(String),

	#[error("video change failed: {0}")]
	VideoChange(String),

	#[error("driver error: {0}")]
	Other(String),
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Playback driver the live-sync controller keeps aligned.
///
/// Drivers without rate control return `false` from
/// [`supports_playback_rate`](VideoPlayer::supports_playback_rate) and are
/// corrected by seeks only.
#[async_trait]
pub trait VideoPlayer: Send + Sync {
	/// Seconds into the current video
	async fn current_time(&self) -> DriverResult<f64>;

	async fn current_video_index(&self) -> DriverResult<usize>;

	async fn seek_to(&self, seconds: f64) -> DriverResult<()>;

	async fn set_playback_rate(&self, rate: f64) -> DriverResult<()>;

	/// Load video `index` and start it `offset` seconds in
	async fn change_video(&self, index: usize, offset: f64) -> DriverResult<()>;

	async fn pause(&self) -> DriverResult<()> {
		Ok(())
	}

	async fn play(&self) -> DriverResult<()> {
		Ok(())
	}

	fn supports_playback_rate(&self) -> bool {
		true
	}
}

/// Source of authoritative positions for the live-sync controller
#[async_trait]
pub trait PositionFeed: Send + Sync {
	async fn position(&self, channel: &str) -> Result<Position>;

	/// Drop any manual offset so the channel follows the timeline again
	async fn go_live(&self, channel: &str) -> Result<()>;
}
