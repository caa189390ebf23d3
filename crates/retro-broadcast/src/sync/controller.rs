use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Correction, DriftPolicy, DriverResult, LocalCursor, PositionFeed, VideoPlayer};
use crate::clock::Clock;
use crate::config::BroadcastConfig;
use crate::error::BroadcastError;
use crate::resolver::Position;
use crate::types::ChannelId;

const RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
	#[default]
	Idle,
	Live,
	Syncing,
	Correcting,
	Manual,
	/// Selected channel has nothing to play; no corrections are issued
	NoContent,
	Off,
}

/// Counters of driver operations issued by a controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionStats {
	pub video_changes: u32,
	pub seeks: u32,
	pub rate_changes: u32,
	pub rate_resets: u32,
	pub failures: u32,
}

impl CorrectionStats {
	pub const fn corrections(&self) -> u32 {
		self.video_changes + self.seeks + self.rate_changes
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
	pub channel: Option<ChannelId>,
	pub state: SyncState,
	pub stats: CorrectionStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
	ManualIntervention,
	GoLive,
	/// Drop the debounce window and check drift now
	Resync,
}

/// Keeps one playback driver aligned with the authoritative position of the
/// selected channel.
pub struct LiveSyncController {
	channel: ChannelId,
	player: Arc<dyn VideoPlayer>,
	feed: Arc<dyn PositionFeed>,
	clock: Arc<dyn Clock>,
	policy: DriftPolicy,
	status_tx: Arc<watch::Sender<SyncStatus>>,
	state: SyncState,
	stats: CorrectionStats,

	/// Set while the driver is paused by a seek that has not resumed it yet
	held_paused: bool,
	debounce: TimeDelta,
	debounce_until: Option<DateTime<Utc>>,
	rate_window: TimeDelta,
	rate_reset_at: Option<DateTime<Utc>>,
	current_rate: f64,
	seek_failures: u32,
	max_seek_failures: u32,

	poll_interval: Duration,
	max_backoff: Duration,
	failures: u32,
	error_reported_at: Option<DateTime<Utc>>,
}

impl LiveSyncController {
	pub fn new(channel: impl Into<ChannelId>, player: Arc<dyn VideoPlayer>, feed: Arc<dyn PositionFeed>, clock: Arc<dyn Clock>, config: &BroadcastConfig) -> Self {
		let policy = DriftPolicy::from_config(config, player.supports_playback_rate());
		let channel = channel.into();
		let (status_tx, _) = watch::channel(SyncStatus {
			channel: Some(channel.clone()),
			..SyncStatus::default()
		});

		Self {
			channel,
			player,
			feed,
			clock,
			policy,
			status_tx: Arc::new(status_tx),
			state: SyncState::Idle,
			stats: CorrectionStats::default(),
			held_paused: false,
			debounce: config.video_change_debounce(),
			debounce_until: None,
			rate_window: config.rate_window(),
			rate_reset_at: None,
			current_rate: 1.0,
			seek_failures: 0,
			max_seek_failures: config.max_seek_failures.max(1),
			poll_interval: config.poll_interval(),
			max_backoff: config.max_poll_backoff(),
			failures: 0,
			error_reported_at: None,
		}
	}

	/// Publish status on a channel shared with a supervisor
	pub fn with_status_sender(mut self, status_tx: Arc<watch::Sender<SyncStatus>>) -> Self {
		self.status_tx = status_tx;
		self.publish();
		self
	}

	pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
		self.status_tx.subscribe()
	}

	pub fn channel(&self) -> &str {
		&self.channel
	}

	pub const fn state(&self) -> SyncState {
		self.state
	}

	pub const fn stats(&self) -> CorrectionStats {
		self.stats
	}

	pub const fn playback_rate(&self) -> f64 {
		self.current_rate
	}

	/// Polling delay before the next tick, backed off exponentially on errors
	pub fn next_interval(&self) -> Duration {
		if self.failures == 0 {
			return self.poll_interval;
		}
		let factor = 1u32.checked_shl(self.failures.min(16)).unwrap_or(u32::MAX);
		self.poll_interval.saturating_mul(factor).min(self.max_backoff)
	}

	fn set_state(&mut self, state: SyncState) {
		if self.state != state {
			debug!(channel = %self.channel, from = ?self.state, to = ?state, "sync state changed");
			self.state = state;
		}
		self.publish();
	}

	fn publish(&self) {
		self.status_tx.send_replace(SyncStatus {
			channel: Some(self.channel.clone()),
			state: self.state,
			stats: self.stats,
		});
	}

	pub fn power_on(&mut self) {
		if matches!(self.state, SyncState::Idle | SyncState::Off) {
			info!(channel = %self.channel, "live sync powered on");
			self.set_state(SyncState::Live);
		}
	}

	pub async fn power_off(&mut self) {
		self.restore_rate().await;
		self.debounce_until = None;
		info!(channel = %self.channel, "live sync powered off");
		self.set_state(SyncState::Off);
	}

	/// User took control of the player; corrections stop until `go_live`
	pub fn manual_intervention(&mut self) {
		if matches!(self.state, SyncState::Live | SyncState::Correcting | SyncState::Syncing) {
			self.set_state(SyncState::Manual);
		}
	}

	/// Back to the timeline with an immediate sync
	pub async fn go_live(&mut self) -> Correction {
		if self.state == SyncState::Off {
			return Correction::None;
		}
		if let Err(e) = self.feed.go_live(&self.channel).await {
			warn!(channel = %self.channel, error = %e, "go-live request failed");
		}
		self.debounce_until = None;
		self.set_state(SyncState::Live);
		self.tick().await
	}

	/// Switch to another channel: SYNCING until the first successful check
	pub async fn change_channel(&mut self, channel: impl Into<ChannelId>) -> Correction {
		self.channel = channel.into();
		self.debounce_until = None;
		self.seek_failures = 0;
		self.failures = 0;
		self.error_reported_at = None;
		self.set_state(SyncState::Syncing);
		self.tick().await
	}

	pub async fn resync(&mut self) -> Correction {
		self.debounce_until = None;
		self.tick().await
	}

	/// One drift check; returns the correction that was applied.
	///
	/// Corrections cannot overlap: the controller is borrowed mutably until
	/// the driver call of the current one returns.
	pub async fn tick(&mut self) -> Correction {
		if matches!(self.state, SyncState::Idle | SyncState::Off | SyncState::Manual) {
			return Correction::None;
		}

		let now = self.clock.now();
		if self.debounce_until.is_some_and(|until| now < until) {
			return Correction::None;
		}
		self.debounce_until = None;

		if self.rate_reset_at.is_some_and(|at| now >= at) {
			self.restore_rate().await;
		}

		let Some(target) = self.authoritative(now).await else {
			return Correction::None;
		};

		let local = match self.read_local().await {
			Ok(local) => local,
			Err(e) => {
				self.record_failure(now, &e.to_string());
				return Correction::None;
			}
		};

		let mut correction = self.policy.classify(&local, &target);
		if let Correction::Seek { offset } = correction {
			if self.seek_failures >= self.max_seek_failures {
				warn!(channel = %self.channel, failures = self.seek_failures, "seeks keep failing; forcing video change");
				correction = Correction::VideoChange {
					index: target.video_index,
					offset,
				};
			}
		}

		if correction.is_none() {
			if !self.at_normal_rate() {
				self.restore_rate().await;
			}
			self.failures = 0;
			return Correction::None;
		}

		debug!(channel = %self.channel, drift_ms = DriftPolicy::drift_ms(&local, &target), ?correction, "drift detected");
		match self.apply(correction, now).await {
			Ok(()) => {
				self.failures = 0;
				correction
			}
			Err(e) => {
				self.record_failure(now, &e.to_string());
				Correction::None
			}
		}
	}

	async fn authoritative(&mut self, now: DateTime<Utc>) -> Option<Position> {
		match self.feed.position(&self.channel).await {
			Ok(position) if position.is_empty() => {
				self.enter_no_content();
				None
			}
			Ok(position) => {
				if matches!(self.state, SyncState::Syncing | SyncState::NoContent) {
					self.set_state(SyncState::Live);
				}
				Some(position)
			}
			Err(BroadcastError::UnknownChannel(_) | BroadcastError::EmptyPlaylist | BroadcastError::InvalidPlaylistDuration) => {
				self.enter_no_content();
				None
			}
			Err(e) => {
				self.record_failure(now, &e.to_string());
				None
			}
		}
	}

	fn enter_no_content(&mut self) {
		if self.state != SyncState::NoContent {
			info!(channel = %self.channel, "channel has no content");
		}
		self.set_state(SyncState::NoContent);
	}

	async fn read_local(&self) -> DriverResult<LocalCursor> {
		let video_index = self.player.current_video_index().await?;
		let time = self.player.current_time().await?;
		Ok(LocalCursor { video_index, time })
	}

	async fn apply(&mut self, correction: Correction, now: DateTime<Utc>) -> DriverResult<()> {
		let resume = self.state;
		self.set_state(SyncState::Correcting);

		let result = match correction {
			Correction::None => Ok(()),
			Correction::VideoChange { index, offset } => self.change_video(index, offset, now).await,
			Correction::Seek { offset } => self.seek(offset).await,
			Correction::Rate { rate } => self.nudge_rate(rate, now).await,
		};

		self.set_state(if resume == SyncState::Correcting { SyncState::Live } else { resume });
		result
	}

	async fn change_video(&mut self, index: usize, offset: f64, now: DateTime<Utc>) -> DriverResult<()> {
		self.player.change_video(index, offset).await?;
		self.debounce_until = Some(now + self.debounce);
		self.seek_failures = 0;
		self.stats.video_changes += 1;
		debug!(channel = %self.channel, index, offset, "video changed");
		self.restore_rate().await;
		Ok(())
	}

	async fn seek(&mut self, offset: f64) -> DriverResult<()> {
		let player = Arc::clone(&self.player);
		self.held_paused = true;
		let result = async {
			player.pause().await?;
			let seek = player.seek_to(offset).await;
			player.play().await?;
			seek
		}
		.await;
		self.held_paused = false;

		match result {
			Ok(()) => {
				self.seek_failures = 0;
				self.stats.seeks += 1;
				debug!(channel = %self.channel, offset, "seeked to timeline");
				self.restore_rate().await;
				Ok(())
			}
			Err(e) => {
				self.seek_failures += 1;
				Err(e)
			}
		}
	}

	async fn nudge_rate(&mut self, rate: f64, now: DateTime<Utc>) -> DriverResult<()> {
		let previous = self.current_rate;
		// Recorded before the call so `release` undoes a cancelled nudge
		self.current_rate = rate;
		if let Err(e) = self.player.set_playback_rate(rate).await {
			self.current_rate = previous;
			return Err(e);
		}
		self.rate_reset_at = Some(now + self.rate_window);
		self.stats.rate_changes += 1;
		debug!(channel = %self.channel, rate, "playback rate nudged");
		Ok(())
	}

	fn at_normal_rate(&self) -> bool {
		(self.current_rate - 1.0).abs() < f64::EPSILON
	}

	async fn restore_rate(&mut self) {
		self.rate_reset_at = None;
		if self.at_normal_rate() || !self.player.supports_playback_rate() {
			self.current_rate = 1.0;
			return;
		}
		match self.player.set_playback_rate(1.0).await {
			Ok(()) => {
				self.current_rate = 1.0;
				self.stats.rate_resets += 1;
				self.publish();
			}
			Err(e) => warn!(channel = %self.channel, error = %e, "failed to reset playback rate"),
		}
	}

	fn record_failure(&mut self, now: DateTime<Utc>, error: &str) {
		self.failures = self.failures.saturating_add(1);
		self.stats.failures += 1;
		self.publish();

		let backoff = self.next_interval();
		let window = TimeDelta::from_std(backoff).unwrap_or_else(|_| TimeDelta::days(1));
		if self.error_reported_at.map_or(true, |at| now - at >= window) {
			self.error_reported_at = Some(now);
			warn!(channel = %self.channel, failures = self.failures, backoff = ?backoff, error, "live sync degraded");
		} else {
			debug!(channel = %self.channel, error, "live sync failure");
		}
	}

	async fn handle(&mut self, command: SyncCommand) {
		match command {
			SyncCommand::ManualIntervention => self.manual_intervention(),
			SyncCommand::GoLive => {
				self.go_live().await;
			}
			SyncCommand::Resync => {
				self.resync().await;
			}
		}
	}

	/// Hand the driver back in a neutral state: resume a seek that was cut
	/// short and drop any rate nudge.
	async fn release(&mut self) {
		if std::mem::take(&mut self.held_paused) {
			match self.player.play().await {
				Ok(()) => debug!(channel = %self.channel, "resumed playback after interrupted seek"),
				Err(e) => warn!(channel = %self.channel, error = %e, "failed to resume playback"),
			}
		}
		self.restore_rate().await;
	}

	/// Poll until cancelled. Starts by syncing the channel it was built for.
	pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SyncCommand>, cancel: CancellationToken) -> CorrectionStats {
		let channel = self.channel.clone();
		let started = tokio::select! {
			_ = cancel.cancelled() => false,
			_ = self.change_channel(channel) => true,
		};

		if started {
			loop {
				let wait = self.next_interval();
				tokio::select! {
					_ = cancel.cancelled() => break,
					() = tokio::time::sleep(wait) => {
						tokio::select! {
							_ = cancel.cancelled() => break,
							_ = self.tick() => {}
						}
					}
					Some(command) = commands.recv() => {
						tokio::select! {
							_ = cancel.cancelled() => break,
							() = self.handle(command) => {}
						}
					}
				}
			}
		}

		if tokio::time::timeout(RELEASE_TIMEOUT, self.release()).await.is_err() {
			warn!(channel = %self.channel, "driver did not respond while releasing");
		}
		debug!(channel = %self.channel, corrections = self.stats.corrections(), "live sync task stopped");
		self.stats
	}
}
