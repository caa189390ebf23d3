use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{ChannelStatus, LoadOutcome, StationCommand, StationEngine};
use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::config::BroadcastConfig;
use crate::epoch::EpochAuthority;
use crate::error::{BroadcastError, Result};
use crate::live::{LiveState, Manifest};
use crate::persistence::{SaveReport, StateStore};
use crate::playlist::Playlist;
use crate::resolver::Position;
use crate::sync::PositionFeed;
use crate::types::{ChannelId, Epoch};

/// Cloneable handle to a running station engine
#[derive(Clone)]
pub struct BroadcastStation {
	command_tx: mpsc::UnboundedSender<StationCommand>,
	task_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
	cancel_token: CancellationToken,
}

impl BroadcastStation {
	/// Bootstrap an engine and start it
	pub async fn start(
		config: BroadcastConfig,
		clock: Arc<dyn Clock>,
		authority: Arc<dyn EpochAuthority>,
		store: Arc<dyn StateStore>,
		secret: Option<String>,
	) -> Result<Self> {
		let engine = StationEngine::bootstrap(config, clock, authority, store, secret).await?;
		Ok(engine.spawn())
	}

	pub(super) fn from_parts(command_tx: mpsc::UnboundedSender<StationCommand>, task_handle: Arc<Mutex<Option<JoinHandle<()>>>>, cancel_token: CancellationToken) -> Self {
		Self {
			command_tx,
			task_handle,
			cancel_token,
		}
	}

	async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> StationCommand) -> Result<T> {
		let (tx, rx) = oneshot::channel();
		self.command_tx.send(build(tx)).map_err(|_| BroadcastError::EngineStopped)?;
		rx.await.map_err(|_| BroadcastError::EngineStopped)
	}

	pub async fn load_playlist(&self, playlist: Playlist) -> Result<LoadOutcome> {
		self.request(|response| StationCommand::LoadPlaylist { playlist, response }).await
	}

	/// Load every channel of a catalog
	pub async fn load_catalog(&self, catalog: Catalog) -> Result<Vec<(ChannelId, LoadOutcome)>> {
		let mut outcomes = Vec::with_capacity(catalog.channels.len());
		for playlist in catalog.into_playlists() {
			let channel = playlist.channel_id.clone();
			outcomes.push((channel, self.load_playlist(playlist).await?));
		}
		Ok(outcomes)
	}

	pub async fn remove_channel(&self, channel: impl Into<ChannelId>) -> Result<bool> {
		let channel = channel.into();
		self.request(|response| StationCommand::RemoveChannel { channel, response }).await
	}

	pub async fn position(&self, channel: impl Into<ChannelId>) -> Result<Position> {
		let channel = channel.into();
		self.request(|response| StationCommand::Position { channel, response }).await?
	}

	pub async fn jump_to_video(&self, channel: impl Into<ChannelId>, index: usize, offset: f64) -> Result<Position> {
		let channel = channel.into();
		self.request(|response| StationCommand::JumpToVideo { channel, index, offset, response }).await?
	}

	pub async fn seek_by(&self, channel: impl Into<ChannelId>, seconds: f64) -> Result<Position> {
		let channel = channel.into();
		self.request(|response| StationCommand::SeekBy { channel, seconds, response }).await?
	}

	pub async fn skip(&self, channel: impl Into<ChannelId>, steps: i64) -> Result<Position> {
		let channel = channel.into();
		self.request(|response| StationCommand::Skip { channel, steps, response }).await?
	}

	pub async fn go_live(&self, channel: impl Into<ChannelId>) -> Result<Position> {
		let channel = channel.into();
		self.request(|response| StationCommand::GoLive { channel, response }).await?
	}

	pub async fn status(&self, channel: impl Into<ChannelId>) -> Result<ChannelStatus> {
		let channel = channel.into();
		self.request(|response| StationCommand::Status { channel, response }).await?
	}

	pub async fn channels(&self) -> Result<Vec<ChannelStatus>> {
		self.request(|response| StationCommand::Channels { response }).await
	}

	pub async fn live_state(&self, channel: impl Into<ChannelId>, include_next: bool) -> Result<LiveState> {
		let channel = channel.into();
		self.request(|response| StationCommand::LiveState { channel, include_next, response }).await?
	}

	pub async fn manifest(&self, channel: impl Into<ChannelId>) -> Result<Manifest> {
		let channel = channel.into();
		self.request(|response| StationCommand::Manifest { channel, response }).await?
	}

	/// The session epoch
	pub async fn epoch(&self) -> Result<Epoch> {
		self.request(|response| StationCommand::Epoch { response }).await
	}

	/// Privileged: mint a new epoch and drop every channel offset
	pub async fn reset_epoch(&self) -> Result<Epoch> {
		self.request(|response| StationCommand::ResetEpoch { response }).await?
	}

	pub async fn flush(&self) -> Result<SaveReport> {
		self.request(|response| StationCommand::Flush { response }).await?
	}

	/// Stop the engine after a final save
	pub async fn shutdown(&self) {
		self.cancel_token.cancel();
		if let Some(handle) = self.task_handle.lock().await.take() {
			let _ = handle.await;
		}
	}
}

#[async_trait]
impl PositionFeed for BroadcastStation {
	async fn position(&self, channel: &str) -> Result<Position> {
		Self::position(self, channel).await
	}

	async fn go_live(&self, channel: &str) -> Result<()> {
		Self::go_live(self, channel).await.map(|_| ())
	}
}
