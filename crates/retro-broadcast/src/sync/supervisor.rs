use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{CorrectionStats, LiveSyncController, PositionFeed, SyncCommand, SyncState, SyncStatus, VideoPlayer};
use crate::clock::Clock;
use crate::config::BroadcastConfig;
use crate::error::{BroadcastError, Result};
use crate::types::ChannelId;

struct Selection {
	channel: ChannelId,
	cancel: CancellationToken,
	commands: mpsc::UnboundedSender<SyncCommand>,
	handle: JoinHandle<CorrectionStats>,
}

/// Owns the live-sync task bound to the current channel selection
pub struct LiveSync {
	player: Arc<dyn VideoPlayer>,
	feed: Arc<dyn PositionFeed>,
	clock: Arc<dyn Clock>,
	config: BroadcastConfig,
	status_tx: Arc<watch::Sender<SyncStatus>>,
	root: CancellationToken,
	current: Option<Selection>,
}

impl LiveSync {
	pub fn new(player: Arc<dyn VideoPlayer>, feed: Arc<dyn PositionFeed>, clock: Arc<dyn Clock>, config: BroadcastConfig) -> Self {
		let (status_tx, _) = watch::channel(SyncStatus::default());
		Self {
			player,
			feed,
			clock,
			config,
			status_tx: Arc::new(status_tx),
			root: CancellationToken::new(),
			current: None,
		}
	}

	pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
		self.status_tx.subscribe()
	}

	pub fn status(&self) -> SyncStatus {
		self.status_tx.borrow().clone()
	}

	pub fn current_channel(&self) -> Option<&str> {
		self.current.as_ref().map(|s| s.channel.as_str())
	}

	/// Cancel the task of the previous selection, then start syncing `channel`
	pub async fn select_channel(&mut self, channel: impl Into<ChannelId>) -> Result<()> {
		if self.root.is_cancelled() {
			return Err(BroadcastError::EngineStopped);
		}
		let channel = channel.into();
		self.stop_current().await;

		let cancel = self.root.child_token();
		let (commands, command_rx) = mpsc::unbounded_channel();
		let mut controller =
			LiveSyncController::new(channel.clone(), Arc::clone(&self.player), Arc::clone(&self.feed), Arc::clone(&self.clock), &self.config).with_status_sender(Arc::clone(&self.status_tx));
		controller.power_on();

		let handle = tokio::spawn(controller.run(command_rx, cancel.clone()));
		info!(channel = %channel, "live sync bound to channel");

		self.current = Some(Selection {
			channel,
			cancel,
			commands,
			handle,
		});
		Ok(())
	}

	fn send(&self, command: SyncCommand) -> Result<()> {
		let selection = self.current.as_ref().ok_or(BroadcastError::EngineStopped)?;
		selection.commands.send(command).map_err(|_| BroadcastError::EngineStopped)
	}

	pub fn manual_intervention(&self) -> Result<()> {
		self.send(SyncCommand::ManualIntervention)
	}

	pub fn go_live(&self) -> Result<()> {
		self.send(SyncCommand::GoLive)
	}

	/// One-shot resync after the selected channel's playlist changed
	pub fn resync(&self) -> Result<()> {
		self.send(SyncCommand::Resync)
	}

	/// Stop syncing; returns the counters of the stopped selection
	pub async fn power_off(&mut self) -> Option<CorrectionStats> {
		let stats = self.stop_current().await;
		let mut status = self.status();
		status.state = SyncState::Off;
		self.status_tx.send_replace(status);
		stats
	}

	pub async fn shutdown(&mut self) {
		self.root.cancel();
		self.power_off().await;
	}

	async fn stop_current(&mut self) -> Option<CorrectionStats> {
		let selection = self.current.take()?;
		selection.cancel.cancel();
		match selection.handle.await {
			Ok(stats) => {
				debug!(channel = %selection.channel, corrections = stats.corrections(), "live sync selection stopped");
				Some(stats)
			}
			Err(e) => {
				debug!(channel = %selection.channel, error = %e, "live sync task ended abnormally");
				None
			}
		}
	}
}

impl Drop for LiveSync {
	fn drop(&mut self) {
		self.root.cancel();
	}
}
