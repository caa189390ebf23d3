mod records;
mod store;

pub use records::{BroadcastStateRecord, ChannelRecord, GlobalEpochRecord, BROADCAST_STATE_KEY, GLOBAL_EPOCH_KEY};
pub use store::{FileStore, MemoryStore, StateStore, StoreError};

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::{BroadcastError, Result};
use crate::types::ChannelId;

/// Records read once at start-up
#[derive(Debug, Default, Clone)]
pub struct PersistedState {
	pub epoch: Option<GlobalEpochRecord>,
	pub channels: BroadcastStateRecord,
}

/// Outcome of a channel-state write
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SaveReport {
	pub written: usize,
	pub evicted: Vec<ChannelId>,
}

/// Bounded durable store of the epoch cache and per-channel state
pub struct Persistence {
	store: Arc<dyn StateStore>,
	max_channels: usize,
	min_channels: usize,
}

impl Persistence {
	pub fn new(store: Arc<dyn StateStore>, max_channels: usize, min_channels: usize) -> Self {
		Self {
			store,
			max_channels,
			min_channels: min_channels.min(max_channels),
		}
	}

	pub fn store(&self) -> &Arc<dyn StateStore> {
		&self.store
	}

	/// Read both records; unreadable records are logged and treated as absent
	pub async fn load(&self) -> PersistedState {
		let epoch = self.read_json::<GlobalEpochRecord>(GLOBAL_EPOCH_KEY).await;
		let channels = self.read_json::<BroadcastStateRecord>(BROADCAST_STATE_KEY).await.unwrap_or_default();
		debug!(channels = channels.len(), has_epoch = epoch.is_some(), "persisted state loaded");
		PersistedState { epoch, channels }
	}

	async fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
		match self.store.read(key).await {
			Ok(Some(raw)) => match serde_json::from_str(&raw) {
				Ok(value) => Some(value),
				Err(e) => {
					warn!(key, error = %e, "discarding unreadable persisted record");
					None
				}
			},
			Ok(None) => None,
			Err(e) => {
				warn!(key, error = %e, "persisted record could not be read");
				None
			}
		}
	}

	pub async fn save_epoch(&self, record: &GlobalEpochRecord) -> Result<()> {
		let json = serde_json::to_string(record)?;
		self.store.write(GLOBAL_EPOCH_KEY, &json).await?;
		Ok(())
	}

	/// Write channel records, keeping at most `max_channels` most recently
	/// accessed ones and evicting further under quota pressure down to
	/// `min_channels`.
	pub async fn save_channels(&self, channels: BroadcastStateRecord) -> Result<SaveReport> {
		let mut ordered: Vec<(ChannelId, ChannelRecord)> = channels.into_iter().collect();
		ordered.sort_by(|a, b| b.1.last_access_time.cmp(&a.1.last_access_time).then_with(|| a.0.cmp(&b.0)));

		let mut evicted = Vec::new();
		if ordered.len() > self.max_channels {
			evicted.extend(ordered.drain(self.max_channels..).map(|(id, _)| id));
			debug!(evicted = evicted.len(), "trimmed channel records to capacity");
		}

		loop {
			let record: BroadcastStateRecord = ordered.iter().cloned().collect();
			let json = serde_json::to_string(&record)?;

			match self.store.write(BROADCAST_STATE_KEY, &json).await {
				Ok(()) => {
					return Ok(SaveReport {
						written: ordered.len(),
						evicted,
					})
				}
				Err(StoreError::QuotaExceeded { .. }) if ordered.len() > self.min_channels => {
					if let Some((id, _)) = ordered.pop() {
						warn!(channel = %id, "storage quota exceeded; evicting least recently used channel");
						evicted.push(id);
					}
				}
				Err(StoreError::QuotaExceeded { .. }) => {
					error!(retained = ordered.len(), "storage quota exceeded at minimum retention; dropping write");
					return Err(BroadcastError::PersistenceQuotaExceeded { retained: ordered.len() });
				}
				Err(e) => return Err(e.into()),
			}
		}
	}
}
