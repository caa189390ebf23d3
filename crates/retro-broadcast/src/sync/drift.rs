use crate::config::BroadcastConfig;
use crate::resolver::Position;

/// What the playback driver reports
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalCursor {
	pub video_index: usize,
	pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
	None,
	VideoChange { index: usize, offset: f64 },
	Seek { offset: f64 },
	Rate { rate: f64 },
}

impl Correction {
	pub const fn is_none(&self) -> bool {
		matches!(self, Self::None)
	}
}

/// Thresholds turning a drift measurement into a correction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftPolicy {
	pub seek_threshold_ms: f64,
	pub rate_threshold_ms: f64,
	pub rate_min: f64,
	pub rate_max: f64,
	pub rate_gain: f64,
	pub rate_enabled: bool,
}

impl DriftPolicy {
	#[allow(clippy::cast_precision_loss)]
	pub fn from_config(config: &BroadcastConfig, rate_enabled: bool) -> Self {
		Self {
			seek_threshold_ms: config.seek_threshold_ms as f64,
			rate_threshold_ms: config.rate_threshold_ms as f64,
			rate_min: config.rate_min,
			rate_max: config.rate_max,
			rate_gain: config.rate_gain,
			rate_enabled,
		}
	}

	/// Δ in milliseconds, positive when the driver is ahead
	pub fn drift_ms(local: &LocalCursor, target: &Position) -> f64 {
		(local.time - target.offset) * 1000.0
	}

	pub fn classify(&self, local: &LocalCursor, target: &Position) -> Correction {
		if local.video_index != target.video_index {
			return Correction::VideoChange {
				index: target.video_index,
				offset: target.offset,
			};
		}

		let drift = Self::drift_ms(local, target);
		if !drift.is_finite() || drift.abs() > self.seek_threshold_ms {
			return Correction::Seek { offset: target.offset };
		}

		// Seek-only drivers tolerate anything below the seek threshold
		if self.rate_enabled && drift.abs() >= self.rate_threshold_ms {
			return Correction::Rate { rate: self.rate_for(drift) };
		}

		Correction::None
	}

	/// Ahead slows down, behind speeds up
	pub fn rate_for(&self, drift_ms: f64) -> f64 {
		(1.0 - self.rate_gain * drift_ms / self.seek_threshold_ms).clamp(self.rate_min, self.rate_max)
	}
}
