use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BroadcastError, Result};

/// Channel (category) identifier
pub type ChannelId = String;

/// Time in milliseconds since the Unix epoch
pub type TimeMs = i64;

/// The instant every channel's timeline is anchored to (T₀)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
	pub instant: DateTime<Utc>,
	/// IANA zone label, informational only
	pub timezone: Option<String>,
}

impl Epoch {
	pub const fn new(instant: DateTime<Utc>) -> Self {
		Self { instant, timezone: None }
	}

	pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
		self.timezone = Some(timezone.into());
		self
	}

	pub fn parse(iso: &str, timezone: Option<String>) -> Result<Self> {
		let instant = DateTime::parse_from_rfc3339(iso)
			.map_err(|e| BroadcastError::InvalidTimestamp(format!("{iso}: {e}")))?
			.with_timezone(&Utc);
		Ok(Self { instant, timezone })
	}

	/// Canonical ISO-8601 serialization, the input of the epoch checksum
	pub fn to_iso(&self) -> String {
		self.instant.to_rfc3339_opts(SecondsFormat::Millis, true)
	}

	pub fn millis(&self) -> TimeMs {
		self.instant.timestamp_millis()
	}

	/// Seconds elapsed since T₀, negative before it
	pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> f64 {
		millis_to_seconds((now - self.instant).num_milliseconds())
	}
}

#[allow(clippy::cast_precision_loss)]
pub fn millis_to_seconds(ms: i64) -> f64 {
	ms as f64 / 1000.0
}
