use std::collections::HashMap;

use crate::types::ChannelId;

/// Reduce δ modulo `total` into `(-total/2, total/2]`
pub fn normalize_offset(offset: f64, total: f64) -> f64 {
	if !offset.is_finite() || total <= 0.0 {
		return 0.0;
	}
	let r = offset.rem_euclid(total);
	let r = if r >= total { 0.0 } else { r };
	if r > total / 2.0 {
		r - total
	} else {
		r
	}
}

/// Per-channel signed seconds shift against the shared timeline
#[derive(Debug, Default, Clone)]
pub struct OffsetStore {
	offsets: HashMap<ChannelId, f64>,
}

impl OffsetStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// δ of a channel, 0 when never set
	pub fn get(&self, channel: &str) -> f64 {
		self.offsets.get(channel).copied().unwrap_or(0.0)
	}

	/// Store δ normalized against the channel's cycle length; returns the stored value
	pub fn set(&mut self, channel: &str, offset: f64, total: f64) -> f64 {
		let normalized = normalize_offset(offset, total);
		if normalized == 0.0 {
			self.offsets.remove(channel);
		} else {
			self.offsets.insert(channel.to_string(), normalized);
		}
		normalized
	}

	pub fn clear(&mut self, channel: &str) {
		self.offsets.remove(channel);
	}

	pub fn clear_all(&mut self) {
		self.offsets.clear();
	}

	pub fn is_live(&self, channel: &str) -> bool {
		self.get(channel) == 0.0
	}
}
