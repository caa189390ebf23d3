use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::playlist::PlaylistDigest;
use crate::types::Epoch;

/// Where a channel is at an instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
	pub video_index: usize,
	/// Seconds into the current video, in `[0, duration)`
	pub offset: f64,
	/// Seconds into the current cycle, in `[0, total)`
	pub cycle_position: f64,
	/// Completed cycles since T₀; instants before T₀ report cycle 0
	pub cycle_count: u64,
	/// Number of videos in the playlist; 0 marks the empty sentinel
	pub video_count: usize,
}

impl Position {
	/// Returned for a channel without content
	pub const EMPTY: Self = Self {
		video_index: 0,
		offset: 0.0,
		cycle_position: 0.0,
		cycle_count: 0,
		video_count: 0,
	};

	pub const fn is_empty(&self) -> bool {
		self.video_count == 0
	}

	/// Seconds left in the current video
	pub fn remaining(&self, digest: &PlaylistDigest) -> f64 {
		digest.duration_of(self.video_index).map_or(0.0, |d| (d - self.offset).max(0.0))
	}
}

/// Resolve the position of a channel at `now`.
///
/// Pure and total: no I/O, no state, and every input yields a valid
/// `Position` or the `EMPTY` sentinel.
pub fn resolve(now: DateTime<Utc>, epoch: &Epoch, digest: &PlaylistDigest, channel_offset: f64) -> Position {
	resolve_elapsed(epoch.elapsed_seconds(now), digest, channel_offset)
}

/// Same as [`resolve`] with the elapsed seconds since T₀ already computed
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn resolve_elapsed(elapsed: f64, digest: &PlaylistDigest, channel_offset: f64) -> Position {
	if digest.is_empty() {
		return Position::EMPTY;
	}

	let offset = if channel_offset.is_finite() { channel_offset } else { 0.0 };
	let adjusted = if elapsed.is_finite() { elapsed + offset } else { offset };
	let total = digest.total_seconds();

	// A single video loops on itself; total == its duration so the general path applies
	let cycle_position = digest.normalize(adjusted);
	let cycles = (adjusted / total).floor();
	let cycle_count = if cycles.is_finite() && cycles > 0.0 { cycles as u64 } else { 0 };

	match digest.find_index_at_cycle_position(cycle_position) {
		Ok(slot) => Position {
			video_index: slot.index,
			offset: slot.offset,
			cycle_position,
			cycle_count,
			video_count: digest.len(),
		},
		Err(_) => Position::EMPTY,
	}
}
