use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::EpochRecord;
use crate::clock::Clock;
use crate::error::{BroadcastError, Result};
use crate::persistence::{GlobalEpochRecord, StateStore};
use crate::types::Epoch;

/// Store key under which the authority keeps T₀
pub const AUTHORITY_EPOCH_KEY: &str = "epoch-authority";

/// The single writer of T₀
#[async_trait]
pub trait EpochAuthority: Send + Sync {
	/// T₀, minted on first demand
	async fn fetch(&self) -> Result<EpochRecord>;

	/// Destroy and regenerate T₀; every timeline restarts
	async fn reset(&self) -> Result<EpochRecord>;
}

/// Authority backed by a state store, as run by the server
pub struct LocalEpochAuthority {
	store: Arc<dyn StateStore>,
	clock: Arc<dyn Clock>,
	secret: String,
	timezone: Option<String>,
	current: Mutex<Option<Epoch>>,
}

impl LocalEpochAuthority {
	pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, secret: impl Into<String>) -> Self {
		Self {
			store,
			clock,
			secret: secret.into(),
			timezone: None,
			current: Mutex::new(None),
		}
	}

	pub fn with_timezone(mut self, timezone: Option<String>) -> Self {
		self.timezone = timezone;
		self
	}

	async fn persist(&self, epoch: &Epoch) -> Result<()> {
		let record = GlobalEpochRecord::from_epoch(epoch, None);
		self.store.write(AUTHORITY_EPOCH_KEY, &serde_json::to_string(&record)?).await?;
		Ok(())
	}

	fn mint(&self) -> Epoch {
		let epoch = Epoch::new(self.clock.now());
		match &self.timezone {
			Some(tz) => epoch.with_timezone(tz.clone()),
			None => epoch,
		}
	}
}

#[async_trait]
impl EpochAuthority for LocalEpochAuthority {
	async fn fetch(&self) -> Result<EpochRecord> {
		let mut current = self.current.lock().await;
		if let Some(epoch) = current.as_ref() {
			return Ok(EpochRecord::signed(epoch, &self.secret));
		}

		// Mint only when no record exists; a damaged one is left for an explicit reset
		let epoch = match self.store.read(AUTHORITY_EPOCH_KEY).await? {
			Some(raw) => serde_json::from_str::<GlobalEpochRecord>(&raw)
				.map_err(BroadcastError::from)
				.and_then(|r| r.epoch())
				.map_err(|e| {
					error!(error = %e, "stored epoch unreadable; refusing to mint a replacement");
					BroadcastError::EpochUnavailable(format!("stored epoch unreadable: {e}"))
				})?,
			None => {
				let epoch = self.mint();
				self.persist(&epoch).await?;
				info!(epoch = %epoch.to_iso(), "minted broadcast epoch");
				epoch
			}
		};

		let record = EpochRecord::signed(&epoch, &self.secret);
		*current = Some(epoch);
		Ok(record)
	}

	async fn reset(&self) -> Result<EpochRecord> {
		let mut current = self.current.lock().await;
		let epoch = self.mint();
		self.persist(&epoch).await?;
		warn!(epoch = %epoch.to_iso(), "broadcast epoch reset; all timelines restart");
		let record = EpochRecord::signed(&epoch, &self.secret);
		*current = Some(epoch);
		Ok(record)
	}
}
