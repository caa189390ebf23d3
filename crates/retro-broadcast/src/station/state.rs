use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::channel::{ChannelMode, ModeGovernor, ModeTransition, OffsetStore};
use crate::config::BroadcastConfig;
use crate::error::{BroadcastError, Result};
use crate::persistence::{BroadcastStateRecord, ChannelRecord};
use crate::playlist::{Playlist, PlaylistDigest};
use crate::resolver::{self, Position};
use crate::types::{ChannelId, Epoch, TimeMs};

/// What `load_playlist` did with the supplied playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadOutcome {
	Added,
	Unchanged,
	Rebuilt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ModeLabel {
	Timeline,
	Manual,
	Decaying,
}

impl From<ChannelMode> for ModeLabel {
	fn from(mode: ChannelMode) -> Self {
		match mode {
			ChannelMode::Timeline => Self::Timeline,
			ChannelMode::Manual { decay: None, .. } => Self::Manual,
			ChannelMode::Manual { decay: Some(_), .. } => Self::Decaying,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatus {
	pub channel_id: ChannelId,
	pub name: String,
	pub position: Position,
	pub offset: f64,
	pub mode: ModeLabel,
	pub manual_until: Option<DateTime<Utc>>,
	pub total_duration: u64,
	pub video_count: usize,
	pub last_access: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ChannelEntry {
	playlist: Playlist,
	digest: PlaylistDigest,
	last_access: DateTime<Utc>,
}

/// Single-owner broadcast state: the session epoch and every channel's
/// playlist, offset and mode. All operations take `now` explicitly.
#[derive(Debug, Clone)]
pub struct Station {
	epoch: Epoch,
	default_duration: u32,
	channels: BTreeMap<ChannelId, ChannelEntry>,
	offsets: OffsetStore,
	governor: ModeGovernor,
	/// Restored records of channels whose playlist is not loaded yet
	pending: BroadcastStateRecord,
	dirty: bool,
}

impl Station {
	pub fn new(epoch: Epoch, config: &BroadcastConfig) -> Self {
		Self {
			epoch,
			default_duration: config.default_duration_secs,
			channels: BTreeMap::new(),
			offsets: OffsetStore::new(),
			governor: ModeGovernor::new(config.manual_hold(), config.decay(), config.decay_steps),
			pending: BTreeMap::new(),
			dirty: false,
		}
	}

	pub const fn epoch(&self) -> &Epoch {
		&self.epoch
	}

	pub const fn is_dirty(&self) -> bool {
		self.dirty
	}

	pub fn mark_clean(&mut self) {
		self.dirty = false;
	}

	pub fn channel_ids(&self) -> Vec<ChannelId> {
		self.channels.keys().cloned().collect()
	}

	pub fn playlist(&self, channel: &str) -> Option<&Playlist> {
		self.channels.get(channel).map(|e| &e.playlist)
	}

	pub fn digest(&self, channel: &str) -> Option<&PlaylistDigest> {
		self.channels.get(channel).map(|e| &e.digest)
	}

	pub fn offset(&self, channel: &str) -> f64 {
		self.offsets.get(channel)
	}

	pub fn mode(&self, channel: &str) -> ChannelMode {
		self.governor.mode(channel)
	}

	fn entry(&self, channel: &str) -> Result<&ChannelEntry> {
		self.channels.get(channel).ok_or_else(|| BroadcastError::UnknownChannel(channel.to_string()))
	}

	fn touch(&mut self, channel: &str, now: DateTime<Utc>) {
		if let Some(entry) = self.channels.get_mut(channel) {
			entry.last_access = now;
		}
	}

	/// Register or refresh a channel's playlist. The digest is rebuilt only
	/// when the playlist signature changed; δ is renormalised against the new
	/// cycle length.
	pub fn load_playlist(&mut self, playlist: Playlist, now: DateTime<Utc>) -> LoadOutcome {
		let channel = playlist.channel_id.clone();
		let signature = playlist.signature();

		if let Some(entry) = self.channels.get(&channel) {
			if entry.digest.signature() == signature {
				return LoadOutcome::Unchanged;
			}
		}

		let digest = PlaylistDigest::build(&playlist, self.default_duration);
		let total = digest.total_seconds();
		self.dirty = true;

		match self.channels.get_mut(&channel) {
			Some(entry) => {
				entry.playlist = playlist;
				entry.digest = digest;
				if total > 0.0 {
					let offset = self.offsets.get(&channel);
					self.offsets.set(&channel, offset, total);
				} else {
					self.governor.reset(&channel, &mut self.offsets);
				}
				info!(channel = %channel, videos = entry.digest.len(), total, "playlist rebuilt");
				LoadOutcome::Rebuilt
			}
			None => {
				debug!(channel = %channel, videos = digest.len(), total, "playlist added");
				self.channels.insert(
					channel.clone(),
					ChannelEntry {
						playlist,
						digest,
						last_access: now,
					},
				);
				if let Some(record) = self.pending.remove(&channel) {
					self.apply_record(&channel, &record, now);
				}
				LoadOutcome::Added
			}
		}
	}

	pub fn remove_channel(&mut self, channel: &str) -> bool {
		let removed = self.channels.remove(channel).is_some() | self.pending.remove(channel).is_some();
		if removed {
			self.governor.reset(channel, &mut self.offsets);
			self.dirty = true;
			debug!(channel, "channel removed");
		}
		removed
	}

	/// Authoritative position of a channel; empty channels yield the sentinel
	pub fn position(&mut self, channel: &str, now: DateTime<Utc>) -> Result<Position> {
		let position = self.peek(channel, now)?;
		self.touch(channel, now);
		Ok(position)
	}

	/// Position without recording an access
	pub fn peek(&self, channel: &str, now: DateTime<Utc>) -> Result<Position> {
		let entry = self.entry(channel)?;
		Ok(resolver::resolve(now, &self.epoch, &entry.digest, self.offsets.get(channel)))
	}

	/// Shift δ so the channel plays video `index` at `offset` seconds now
	pub fn jump_to_video(&mut self, channel: &str, index: usize, offset: f64, now: DateTime<Utc>) -> Result<Position> {
		let digest = &self.entry(channel)?.digest;
		if digest.is_empty() {
			return Err(BroadcastError::EmptyPlaylist);
		}
		let (Some(start), Some(duration)) = (digest.start_of(index), digest.duration_of(index)) else {
			return Err(BroadcastError::InvalidVideoIndex { index, len: digest.len() });
		};

		let offset = if offset.is_finite() { offset.clamp(0.0, (duration - 0.001).max(0.0)) } else { 0.0 };
		let total = digest.total_seconds();
		let current = digest.normalize(self.epoch.elapsed_seconds(now));
		let delta = start + offset - current;

		self.offsets.set(channel, delta, total);
		self.manual_action(channel, now);
		debug!(channel, index, offset, delta, "jumped to video");
		self.peek(channel, now)
	}

	/// Move the channel `seconds` forward (or back) along its timeline
	pub fn seek_by(&mut self, channel: &str, seconds: f64, now: DateTime<Utc>) -> Result<Position> {
		let digest = &self.entry(channel)?.digest;
		if digest.is_empty() {
			return Err(BroadcastError::EmptyPlaylist);
		}
		let total = digest.total_seconds();
		let seconds = if seconds.is_finite() { seconds } else { 0.0 };
		let delta = self.offsets.get(channel) + seconds;

		self.offsets.set(channel, delta, total);
		self.manual_action(channel, now);
		self.peek(channel, now)
	}

	/// Jump `steps` videos forward (negative: back), wrapping around the playlist
	pub fn skip(&mut self, channel: &str, steps: i64, now: DateTime<Utc>) -> Result<Position> {
		let current = self.peek(channel, now)?;
		if current.is_empty() {
			return Err(BroadcastError::EmptyPlaylist);
		}
		let len = i64::try_from(current.video_count).unwrap_or(i64::MAX);
		let from = i64::try_from(current.video_index).unwrap_or(0);
		let target = usize::try_from((from + steps % len).rem_euclid(len)).unwrap_or(0);
		self.jump_to_video(channel, target, 0.0, now)
	}

	/// Drop δ and any manual hold so the channel follows the timeline
	pub fn go_live(&mut self, channel: &str, now: DateTime<Utc>) -> Result<Position> {
		self.entry(channel)?;
		self.governor.reset(channel, &mut self.offsets);
		self.touch(channel, now);
		self.dirty = true;
		info!(channel, "channel back to live");
		self.peek(channel, now)
	}

	fn manual_action(&mut self, channel: &str, now: DateTime<Utc>) {
		self.governor.manual_action(channel, now);
		self.touch(channel, now);
		self.dirty = true;
	}

	/// Drive every manual channel's hold timer and decay
	pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<(ChannelId, ModeTransition)> {
		let mut transitions = Vec::new();
		for channel in self.governor.manual_channels() {
			let Some(total) = self.channels.get(&channel).map(|e| e.digest.total_seconds()) else {
				continue;
			};
			let transition = self.governor.tick(&channel, now, &mut self.offsets, total);
			if transition.changed_state() {
				self.dirty = true;
				transitions.push((channel, transition));
			}
		}
		transitions
	}

	/// Adopt a new epoch; every offset and manual hold is dropped
	pub fn reset_epoch(&mut self, epoch: Epoch) {
		info!(from = %self.epoch.to_iso(), to = %epoch.to_iso(), "epoch reset");
		self.epoch = epoch;
		self.governor.reset_all(&mut self.offsets);
		for record in self.pending.values_mut() {
			record.channel_offset = 0.0;
			record.manual_mode = false;
			record.manual_mode_until = None;
		}
		self.dirty = true;
	}

	pub fn status(&self, channel: &str, now: DateTime<Utc>) -> Result<ChannelStatus> {
		let entry = self.entry(channel)?;
		let mode = self.governor.mode(channel);
		Ok(ChannelStatus {
			channel_id: channel.to_string(),
			name: entry.playlist.name.clone(),
			position: resolver::resolve(now, &self.epoch, &entry.digest, self.offsets.get(channel)),
			offset: self.offsets.get(channel),
			mode: mode.into(),
			manual_until: mode.manual_until(),
			total_duration: entry.digest.total(),
			video_count: entry.digest.len(),
			last_access: entry.last_access,
		})
	}

	pub fn statuses(&self, now: DateTime<Utc>) -> Vec<ChannelStatus> {
		self.channels.keys().filter_map(|channel| self.status(channel, now).ok()).collect()
	}

	/// Persistence records of every known channel, loaded or pending
	pub fn snapshot(&self) -> BroadcastStateRecord {
		let mut records = self.pending.clone();
		for (channel, entry) in &self.channels {
			let mode = self.governor.mode(channel);
			records.insert(
				channel.clone(),
				ChannelRecord {
					channel_name: entry.playlist.name.clone(),
					playlist_total_duration: entry.digest.total(),
					video_durations: entry.digest.durations().to_vec(),
					channel_offset: self.offsets.get(channel),
					manual_mode: mode.is_manual(),
					manual_mode_until: mode.manual_until().map(|until| until.timestamp_millis()),
					last_access_time: entry.last_access.timestamp_millis(),
					playlist_signature: Some(entry.digest.signature().to_string()),
				},
			);
		}
		records
	}

	/// Reinstate persisted records; channels not loaded yet keep theirs pending
	pub fn restore(&mut self, records: BroadcastStateRecord, now: DateTime<Utc>) {
		for (channel, record) in records {
			if self.channels.contains_key(&channel) {
				self.apply_record(&channel, &record, now);
			} else {
				self.pending.insert(channel, record);
			}
		}
	}

	fn apply_record(&mut self, channel: &str, record: &ChannelRecord, now: DateTime<Utc>) {
		let Some(entry) = self.channels.get_mut(channel) else {
			return;
		};
		let total = entry.digest.total_seconds();
		if total <= 0.0 {
			return;
		}

		if record.playlist_signature.as_deref() != Some(entry.digest.signature()) {
			debug!(channel, "playlist changed since last save; offset renormalised");
		}
		self.offsets.set(channel, record.channel_offset, total);
		entry.last_access = from_record_millis(record.last_access_time).unwrap_or(now);

		match record.manual_until() {
			Ok(Some(until)) => self.governor.restore(channel, ChannelMode::Manual { until, decay: None }),
			Ok(None) => self.governor.restore(channel, ChannelMode::Timeline),
			Err(e) => {
				warn!(channel, error = %e, "ignoring persisted manual mode");
				self.governor.restore(channel, ChannelMode::Timeline);
			}
		}
	}
}

fn from_record_millis(ms: TimeMs) -> Option<DateTime<Utc>> {
	DateTime::from_timestamp_millis(ms)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn t(secs: f64) -> DateTime<Utc> {
		#[allow(clippy::cast_possible_truncation)]
		DateTime::from_timestamp_millis(1_704_067_200_000 + (secs * 1000.0) as i64).unwrap()
	}

	fn station() -> Station {
		let epoch = Epoch::parse("2024-01-01T00:00:00Z", None).unwrap();
		let mut station = Station::new(epoch, &BroadcastConfig::default());
		station.load_playlist(Playlist::from_durations("music", &[300.0, 600.0, 300.0]), t(0.0));
		station
	}

	#[test]
	fn reload_with_same_content_is_unchanged() {
		let mut s = station();
		let outcome = s.load_playlist(Playlist::from_durations("music", &[300.0, 600.0, 300.0]), t(5.0));
		assert_eq!(outcome, LoadOutcome::Unchanged);
		let outcome = s.load_playlist(Playlist::from_durations("music", &[300.0, 600.0]), t(5.0));
		assert_eq!(outcome, LoadOutcome::Rebuilt);
		assert_eq!(s.digest("music").unwrap().total(), 900);
	}

	#[test]
	fn jump_sets_offset_and_manual_mode() {
		let mut s = station();
		let position = s.jump_to_video("music", 2, 10.0, t(100.0)).unwrap();
		assert_eq!(position.video_index, 2);
		assert!((position.offset - 10.0).abs() < 1e-6);
		assert!((s.offset("music") - 810.0 + 1200.0).abs() < 1e-6);
		assert_eq!(ModeLabel::from(s.mode("music")), ModeLabel::Manual);
		assert_eq!(s.epoch().to_iso(), "2024-01-01T00:00:00.000Z");
	}

	#[test]
	fn jump_rejects_out_of_range_index() {
		let mut s = station();
		assert!(matches!(s.jump_to_video("music", 3, 0.0, t(0.0)), Err(BroadcastError::InvalidVideoIndex { index: 3, len: 3 })));
		assert!(matches!(s.jump_to_video("news", 0, 0.0, t(0.0)), Err(BroadcastError::UnknownChannel(_))));
	}

	#[test]
	fn skip_wraps_around() {
		let mut s = station();
		assert_eq!(s.skip("music", 1, t(1000.0)).unwrap().video_index, 0);
		assert_eq!(s.skip("music", -1, t(1000.0)).unwrap().video_index, 2);
	}

	#[test]
	fn go_live_clears_offset() {
		let mut s = station();
		s.seek_by("music", 42.0, t(0.0)).unwrap();
		assert!(!s.offsets.is_live("music"));
		let position = s.go_live("music", t(0.0)).unwrap();
		assert_eq!(position.video_index, 0);
		assert_eq!(s.offset("music"), 0.0);
		assert_eq!(s.mode("music"), ChannelMode::Timeline);
	}

	#[test]
	fn snapshot_restores_into_fresh_station() {
		let mut s = station();
		s.seek_by("music", 30.0, t(10.0)).unwrap();
		let records = s.snapshot();

		let mut fresh = Station::new(s.epoch().clone(), &BroadcastConfig::default());
		fresh.restore(records, t(20.0));
		assert_eq!(fresh.offset("music"), 0.0);
		fresh.load_playlist(Playlist::from_durations("music", &[300.0, 600.0, 300.0]), t(20.0));
		assert!((fresh.offset("music") - 30.0).abs() < 1e-9);
		assert!(fresh.mode("music").is_manual());
		assert_eq!(fresh.status("music", t(20.0)).unwrap().last_access, t(10.0));
	}

	#[test]
	fn reset_epoch_clears_every_channel() {
		let mut s = station();
		s.load_playlist(Playlist::from_durations("news", &[60.0]), t(0.0));
		s.seek_by("music", 5.0, t(0.0)).unwrap();
		s.seek_by("news", 5.0, t(0.0)).unwrap();
		s.reset_epoch(Epoch::parse("2024-06-01T00:00:00Z", None).unwrap());
		assert_eq!(s.offset("music"), 0.0);
		assert_eq!(s.offset("news"), 0.0);
		assert!(!s.mode("news").is_manual());
	}
}
