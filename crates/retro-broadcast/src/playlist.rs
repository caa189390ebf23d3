use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{BroadcastError, Result};
use crate::types::ChannelId;

/// One video of a channel's playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
	pub id: String,
	pub title: String,
	/// Raw duration in seconds as supplied; coerced when the digest is built
	pub duration: Option<f64>,
}

impl PlaylistItem {
	pub fn new(id: impl Into<String>, title: impl Into<String>, duration: Option<f64>) -> Self {
		Self {
			id: id.into(),
			title: title.into(),
			duration,
		}
	}
}

/// Ordered videos of a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
	pub channel_id: ChannelId,
	pub name: String,
	pub items: Vec<PlaylistItem>,
}

impl Playlist {
	pub fn new(channel_id: impl Into<ChannelId>, name: impl Into<String>, items: Vec<PlaylistItem>) -> Self {
		Self {
			channel_id: channel_id.into(),
			name: name.into(),
			items,
		}
	}

	/// Playlist built from bare durations, items named by position
	pub fn from_durations(channel_id: impl Into<ChannelId>, durations: &[f64]) -> Self {
		let channel_id = channel_id.into();
		let items = durations
			.iter()
			.enumerate()
			.map(|(i, d)| PlaylistItem::new(format!("{channel_id}-{i}"), format!("Video {i}"), Some(*d)))
			.collect();
		Self {
			name: channel_id.clone(),
			channel_id,
			items,
		}
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Identity of the playlist content; changes whenever an item or duration changes
	pub fn signature(&self) -> String {
		let mut hasher = Sha256::new();
		for item in &self.items {
			hasher.update(item.id.as_bytes());
			hasher.update([0x1f]);
			match item.duration {
				Some(d) => hasher.update(d.to_le_bytes()),
				None => hasher.update(b"none"),
			}
			hasher.update([0x1e]);
		}
		let digest = hex::encode(hasher.finalize());
		digest[..16].to_string()
	}
}

/// The video covering a cycle position and the offset into it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
	pub index: usize,
	pub offset: f64,
}

/// Precomputed durations and cumulative start offsets of a playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistDigest {
	durations: Vec<u32>,
	cumulative_start: Vec<u64>,
	total: u64,
	signature: String,
}

impl PlaylistDigest {
	/// O(n) projection of the playlist. Invalid durations become `default_duration`.
	pub fn build(playlist: &Playlist, default_duration: u32) -> Self {
		let durations = playlist
			.items
			.iter()
			.enumerate()
			.map(|(index, item)| {
				coerce_duration(item.duration).unwrap_or_else(|| {
					warn!(
						channel = %playlist.channel_id,
						index,
						video = %item.id,
						raw = ?item.duration,
						default_duration,
						"coercing missing or invalid video duration"
					);
					default_duration
				})
			})
			.collect();

		let digest = Self::from_durations(durations, playlist.signature());
		if digest.total == 0 {
			warn!(channel = %playlist.channel_id, "playlist has zero total duration; treating as empty");
		}
		digest
	}

	/// Digest over already-validated durations
	pub fn from_durations(durations: Vec<u32>, signature: impl Into<String>) -> Self {
		let mut cumulative_start = Vec::with_capacity(durations.len());
		let mut total = 0u64;
		for d in &durations {
			cumulative_start.push(total);
			total += u64::from(*d);
		}
		Self {
			durations,
			cumulative_start,
			total,
			signature: signature.into(),
		}
	}

	pub fn len(&self) -> usize {
		self.durations.len()
	}

	pub fn is_empty(&self) -> bool {
		self.durations.is_empty() || self.total == 0
	}

	pub const fn total(&self) -> u64 {
		self.total
	}

	#[allow(clippy::cast_precision_loss)]
	pub fn total_seconds(&self) -> f64 {
		self.total as f64
	}

	pub fn durations(&self) -> &[u32] {
		&self.durations
	}

	pub fn cumulative_starts(&self) -> &[u64] {
		&self.cumulative_start
	}

	pub fn signature(&self) -> &str {
		&self.signature
	}

	pub fn duration_of(&self, index: usize) -> Option<f64> {
		self.durations.get(index).map(|d| f64::from(*d))
	}

	#[allow(clippy::cast_precision_loss)]
	pub fn start_of(&self, index: usize) -> Option<f64> {
		self.cumulative_start.get(index).map(|s| *s as f64)
	}

	/// Reduce any real position into `[0, total)`
	pub fn normalize(&self, position: f64) -> f64 {
		normalize_cycle_position(position, self.total_seconds())
	}

	/// The unique video with `start[i] <= p < start[i] + duration[i]`, by binary search.
	/// A position exactly on a boundary belongs to the later video.
	#[allow(clippy::cast_precision_loss)]
	pub fn find_index_at_cycle_position(&self, position: f64) -> Result<Slot> {
		if self.durations.is_empty() {
			return Err(BroadcastError::EmptyPlaylist);
		}
		if self.total == 0 {
			return Err(BroadcastError::InvalidPlaylistDuration);
		}

		let p = self.normalize(position);
		let index = self.cumulative_start.partition_point(|start| *start as f64 <= p).saturating_sub(1);
		let offset = p - self.cumulative_start[index] as f64;

		// Floating-point residue at the end of a video rolls over to the next one
		if offset >= f64::from(self.durations[index]) {
			let next = (index + 1) % self.durations.len();
			return Ok(Slot { index: next, offset: 0.0 });
		}

		Ok(Slot { index, offset: offset.max(0.0) })
	}
}

/// Mathematical modulo into `[0, total)`; non-finite input maps to 0
pub fn normalize_cycle_position(position: f64, total: f64) -> f64 {
	if !position.is_finite() || total <= 0.0 {
		return 0.0;
	}
	let p = position.rem_euclid(total);
	if p >= total {
		0.0
	} else {
		p
	}
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn coerce_duration(raw: Option<f64>) -> Option<u32> {
	let raw = raw?;
	if !raw.is_finite() {
		return None;
	}
	let rounded = raw.round();
	if rounded < 1.0 || rounded > f64::from(u32::MAX) {
		return None;
	}
	Some(rounded as u32)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn digest(durations: &[u32]) -> PlaylistDigest {
		PlaylistDigest::from_durations(durations.to_vec(), "test")
	}

	#[test]
	fn cumulative_starts_are_prefix_sums() {
		let d = digest(&[300, 600, 300]);
		assert_eq!(d.cumulative_starts(), &[0, 300, 900]);
		assert_eq!(d.total(), 1200);

		for i in 0..d.len() {
			let end = d.cumulative_starts()[i] + u64::from(d.durations()[i]);
			let next = d.cumulative_starts().get(i + 1).copied().unwrap_or(d.total());
			assert_eq!(end, next);
		}
	}

	#[test]
	fn build_coerces_invalid_durations() {
		let playlist = Playlist::new(
			"music",
			"Music",
			vec![
				PlaylistItem::new("a", "A", Some(120.0)),
				PlaylistItem::new("b", "B", None),
				PlaylistItem::new("c", "C", Some(0.0)),
				PlaylistItem::new("d", "D", Some(-5.0)),
				PlaylistItem::new("e", "E", Some(f64::NAN)),
			],
		);
		let d = PlaylistDigest::build(&playlist, 300);
		assert_eq!(d.durations(), &[120, 300, 300, 300, 300]);
		assert_eq!(d.total(), 1320);
		assert_eq!(d.signature(), playlist.signature());
	}

	#[test]
	fn boundary_belongs_to_later_video() {
		let d = digest(&[300, 600, 300]);
		let slot = d.find_index_at_cycle_position(300.0).unwrap();
		assert_eq!(slot, Slot { index: 1, offset: 0.0 });
		let slot = d.find_index_at_cycle_position(899.999).unwrap();
		assert_eq!(slot.index, 1);
	}

	#[test]
	fn position_equal_to_total_starts_next_cycle() {
		let d = digest(&[300, 600, 300]);
		assert_eq!(d.find_index_at_cycle_position(1200.0).unwrap(), Slot { index: 0, offset: 0.0 });
	}

	#[test]
	fn every_position_is_covered_exactly_once() {
		let d = digest(&[7, 1, 13, 2, 5]);
		let mut p = 0.0;
		while p < d.total_seconds() {
			let slot = d.find_index_at_cycle_position(p).unwrap();
			let start = d.start_of(slot.index).unwrap();
			let duration = d.duration_of(slot.index).unwrap();
			assert!(start <= p && p < start + duration, "p={p} slot={slot:?}");
			let covering = (0..d.len())
				.filter(|i| {
					let s = d.start_of(*i).unwrap();
					s <= p && p < s + d.duration_of(*i).unwrap()
				})
				.count();
			assert_eq!(covering, 1);
			p += 0.25;
		}
	}

	#[test]
	fn empty_playlist_fails() {
		let d = digest(&[]);
		assert!(d.is_empty());
		assert!(matches!(d.find_index_at_cycle_position(0.0), Err(BroadcastError::EmptyPlaylist)));
	}

	#[test]
	fn normalize_handles_negative_positions() {
		assert_eq!(normalize_cycle_position(-300.0, 1200.0), 900.0);
		assert_eq!(normalize_cycle_position(-1e-18, 1200.0), 0.0);
		assert_eq!(normalize_cycle_position(f64::INFINITY, 1200.0), 0.0);
	}

	#[test]
	fn signature_tracks_content() {
		let a = Playlist::from_durations("c", &[10.0, 20.0]);
		let mut b = a.clone();
		assert_eq!(a.signature(), b.signature());
		b.items[1].duration = Some(21.0);
		assert_ne!(a.signature(), b.signature());
	}
}
