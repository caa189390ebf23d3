use chrono::DateTime;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{BroadcastStation, Station, StationCommand};
use crate::clock::Clock;
use crate::config::BroadcastConfig;
use crate::epoch::{EpochAnchor, EpochAuthority};
use crate::error::Result;
use crate::live::{LiveState, Manifest};
use crate::persistence::{GlobalEpochRecord, Persistence, SaveReport, StateStore};
use crate::types::Epoch;

/// The single task owning the station, the epoch anchor and persistence
pub struct StationEngine {
	station: Station,
	anchor: EpochAnchor,
	persistence: Persistence,
	clock: Arc<dyn Clock>,
	config: BroadcastConfig,
}

impl StationEngine {
	/// Load persisted records, obtain the session epoch and restore channel
	/// state. Fails only when no epoch can be obtained at all.
	pub async fn bootstrap(
		config: BroadcastConfig,
		clock: Arc<dyn Clock>,
		authority: Arc<dyn EpochAuthority>,
		store: Arc<dyn StateStore>,
		secret: Option<String>,
	) -> Result<Self> {
		config.validate()?;

		let persistence = Persistence::new(store, config.max_channels, config.min_channels);
		let persisted = persistence.load().await;

		let mut anchor = EpochAnchor::new(authority, config.epoch_cache_ttl());
		if let Some(secret) = secret {
			anchor = anchor.with_secret(secret);
		}
		if let Some(record) = &persisted.epoch {
			match record.epoch() {
				// No cache time means the record predates cache tracking; revalidate first
				Ok(epoch) => anchor = anchor.with_cached(epoch, record.cached_at().unwrap_or(DateTime::UNIX_EPOCH)),
				Err(e) => warn!(error = %e, "ignoring unreadable cached epoch"),
			}
		}

		let now = clock.now();
		let epoch = anchor.get_epoch(now).await?;
		info!(epoch = %epoch.to_iso(), degraded = anchor.is_degraded(), "session epoch pinned");

		let mut engine = Self {
			station: Station::new(epoch, &config),
			anchor,
			persistence,
			clock,
			config,
		};
		engine.station.restore(persisted.channels, now);
		engine.persist_epoch().await;
		Ok(engine)
	}

	pub const fn station(&self) -> &Station {
		&self.station
	}

	/// Run the engine on its own task behind a façade
	pub fn spawn(self) -> BroadcastStation {
		let cancel_token = CancellationToken::new();
		let (command_tx, command_rx) = mpsc::unbounded_channel();
		let handle = tokio::spawn(self.run(command_rx, cancel_token.clone()));
		BroadcastStation::from_parts(command_tx, Arc::new(Mutex::new(Some(handle))), cancel_token)
	}

	async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<StationCommand>, cancel: CancellationToken) {
		let mut governor = interval(self.config.decay_step());
		governor.set_missed_tick_behavior(MissedTickBehavior::Delay);

		let save_period = self.config.save_interval().max(Duration::from_millis(1));
		let mut autosave = interval_at(Instant::now() + save_period, save_period);
		autosave.set_missed_tick_behavior(MissedTickBehavior::Delay);

		let ttl = self.config.epoch_cache_ttl().to_std().unwrap_or(Duration::from_secs(7200)).max(Duration::from_secs(1));
		let mut revalidate = interval_at(Instant::now() + ttl, ttl);
		revalidate.set_missed_tick_behavior(MissedTickBehavior::Skip);

		info!(channels = self.station.channel_ids().len(), "station engine started");

		loop {
			tokio::select! {
				_ = cancel.cancelled() => {
					info!("station engine cancelled");
					break;
				}

				_ = governor.tick() => {
					let now = self.clock.now();
					for (channel, transition) in self.station.tick(now) {
						debug!(channel = %channel, ?transition, "mode transition");
					}
				}

				_ = autosave.tick() => {
					if self.station.is_dirty() {
						let _ = self.flush().await;
					}
				}

				_ = revalidate.tick() => {
					self.revalidate_epoch().await;
				}

				command = command_rx.recv() => match command {
					Some(command) => self.handle(command).await,
					None => {
						debug!("all station handles dropped");
						break;
					}
				},
			}
		}

		if self.station.is_dirty() {
			let _ = self.flush().await;
		}
		info!("station engine stopped");
	}

	async fn handle(&mut self, command: StationCommand) {
		let now = self.clock.now();
		match command {
			StationCommand::LoadPlaylist { playlist, response } => {
				let _ = response.send(self.station.load_playlist(playlist, now));
			}
			StationCommand::RemoveChannel { channel, response } => {
				let _ = response.send(self.station.remove_channel(&channel));
			}
			StationCommand::Position { channel, response } => {
				let _ = response.send(self.station.position(&channel, now));
			}
			StationCommand::JumpToVideo { channel, index, offset, response } => {
				let _ = response.send(self.station.jump_to_video(&channel, index, offset, now));
			}
			StationCommand::SeekBy { channel, seconds, response } => {
				let _ = response.send(self.station.seek_by(&channel, seconds, now));
			}
			StationCommand::Skip { channel, steps, response } => {
				let _ = response.send(self.station.skip(&channel, steps, now));
			}
			StationCommand::GoLive { channel, response } => {
				let _ = response.send(self.station.go_live(&channel, now));
			}
			StationCommand::Status { channel, response } => {
				let _ = response.send(self.station.status(&channel, now));
			}
			StationCommand::Channels { response } => {
				let _ = response.send(self.station.statuses(now));
			}
			StationCommand::LiveState { channel, include_next, response } => {
				let _ = response.send(LiveState::build(&self.station, &channel, now, include_next));
			}
			StationCommand::Manifest { channel, response } => {
				let _ = response.send(Manifest::build(&self.station, &channel, now, self.config.manifest_ttl_secs));
			}
			StationCommand::Epoch { response } => {
				let _ = response.send(self.station.epoch().clone());
			}
			StationCommand::ResetEpoch { response } => {
				let _ = response.send(self.reset_epoch().await);
			}
			StationCommand::Flush { response } => {
				let _ = response.send(self.flush().await);
			}
		}
	}

	async fn reset_epoch(&mut self) -> Result<Epoch> {
		let epoch = self.anchor.reset_epoch(self.clock.now()).await?;
		self.station.reset_epoch(epoch.clone());
		self.persist_epoch().await;
		let _ = self.flush().await;
		Ok(epoch)
	}

	async fn revalidate_epoch(&mut self) {
		match self.anchor.revalidate(self.clock.now()).await {
			Ok(_) => self.persist_epoch().await,
			Err(e) => warn!(error = %e, "epoch revalidation failed"),
		}
	}

	async fn persist_epoch(&self) {
		let Some((epoch, fetched_at)) = self.anchor.cached() else {
			return;
		};
		let record = GlobalEpochRecord::from_epoch(epoch, Some(fetched_at));
		if let Err(e) = self.persistence.save_epoch(&record).await {
			warn!(error = %e, "failed to persist epoch cache");
		}
	}

	/// Write channel state now; the station stays dirty when the write fails
	async fn flush(&mut self) -> Result<SaveReport> {
		match self.persistence.save_channels(self.station.snapshot()).await {
			Ok(report) => {
				self.station.mark_clean();
				debug!(written = report.written, evicted = report.evicted.len(), "channel state saved");
				Ok(report)
			}
			Err(e) => {
				error!(error = %e, "channel state not saved");
				Err(e)
			}
		}
	}
}
