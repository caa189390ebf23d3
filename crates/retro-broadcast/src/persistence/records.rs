use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{BroadcastError, Result};
use crate::types::{ChannelId, Epoch, TimeMs};

pub const GLOBAL_EPOCH_KEY: &str = "global-epoch";
pub const BROADCAST_STATE_KEY: &str = "broadcast-state";

/// `global-epoch`: the locally cached T₀
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalEpochRecord {
	pub epoch: String,
	pub timezone: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cached_at: Option<String>,
}

impl GlobalEpochRecord {
	pub fn from_epoch(epoch: &Epoch, cached_at: Option<DateTime<Utc>>) -> Self {
		Self {
			epoch: epoch.to_iso(),
			timezone: epoch.timezone.clone(),
			cached_at: cached_at.map(|at| at.to_rfc3339()),
		}
	}

	pub fn epoch(&self) -> Result<Epoch> {
		Epoch::parse(&self.epoch, self.timezone.clone())
	}

	pub fn cached_at(&self) -> Option<DateTime<Utc>> {
		let raw = self.cached_at.as_deref()?;
		DateTime::parse_from_rfc3339(raw).ok().map(|at| at.with_timezone(&Utc))
	}
}

/// One channel of `broadcast-state`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
	pub channel_name: String,
	pub playlist_total_duration: u64,
	pub video_durations: Vec<u32>,
	pub channel_offset: f64,
	pub manual_mode: bool,
	pub manual_mode_until: Option<TimeMs>,
	pub last_access_time: TimeMs,
	#[serde(default)]
	pub playlist_signature: Option<String>,
}

impl ChannelRecord {
	pub fn manual_until(&self) -> Result<Option<DateTime<Utc>>> {
		match (self.manual_mode, self.manual_mode_until) {
			(true, Some(ms)) => DateTime::from_timestamp_millis(ms)
				.map(Some)
				.ok_or_else(|| BroadcastError::InvalidTimestamp(format!("manualModeUntil {ms}"))),
			_ => Ok(None),
		}
	}
}

/// `broadcast-state`: channel records keyed by channel id
pub type BroadcastStateRecord = BTreeMap<ChannelId, ChannelRecord>;
