//! Server-side live-state and manifest forms.
//!
//! A `LiveState` answers "what is on channel X right now"; a `Manifest`
//! carries enough of the playlist and sync anchor for a client to resolve
//! positions locally until it expires.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BroadcastError, Result};
use crate::playlist::PlaylistDigest;
use crate::resolver::{self, Position};
use crate::station::Station;
use crate::types::{millis_to_seconds, ChannelId, Epoch, TimeMs};

/// Server clock and epoch at the time a response was built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAnchor {
	pub server_time_ms: TimeMs,
	pub epoch_ms: TimeMs,
}

impl SyncAnchor {
	pub fn new(now: DateTime<Utc>, epoch: &Epoch) -> Self {
		Self {
			server_time_ms: now.timestamp_millis(),
			epoch_ms: epoch.millis(),
		}
	}

	/// How far the local clock runs ahead of the server
	pub const fn skew_ms(&self, local_now_ms: TimeMs) -> i64 {
		local_now_ms - self.server_time_ms
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSlot {
	pub category_id: ChannelId,
	pub video_index: usize,
	pub video_id: String,
	pub video_title: String,
	pub position: f64,
	pub duration: f64,
	pub remaining: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSummary {
	pub total_duration: u64,
	pub video_count: usize,
	pub cycle_count: u64,
	pub cycle_position: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextUp {
	pub video_index: usize,
	pub video_id: String,
	pub starts_in: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveState {
	pub live: LiveSlot,
	pub sync: SyncAnchor,
	pub playlist: PlaylistSummary,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub next: Option<NextUp>,
}

impl LiveState {
	pub fn build(station: &Station, channel: &str, now: DateTime<Utc>, include_next: bool) -> Result<Self> {
		let playlist = station.playlist(channel).ok_or_else(|| BroadcastError::UnknownChannel(channel.to_string()))?;
		let digest = station.digest(channel).ok_or_else(|| BroadcastError::UnknownChannel(channel.to_string()))?;
		let position = station.peek(channel, now)?;
		if position.is_empty() {
			return Err(BroadcastError::EmptyPlaylist);
		}

		let item = playlist.items.get(position.video_index).ok_or(BroadcastError::EmptyPlaylist)?;
		let duration = digest.duration_of(position.video_index).unwrap_or_default();
		let remaining = position.remaining(digest);

		let next = if include_next {
			let index = (position.video_index + 1) % digest.len();
			playlist.items.get(index).map(|item| NextUp {
				video_index: index,
				video_id: item.id.clone(),
				starts_in: remaining,
			})
		} else {
			None
		};

		Ok(Self {
			live: LiveSlot {
				category_id: channel.to_string(),
				video_index: position.video_index,
				video_id: item.id.clone(),
				video_title: item.title.clone(),
				position: position.offset,
				duration,
				remaining,
			},
			sync: SyncAnchor::new(now, station.epoch()),
			playlist: PlaylistSummary {
				total_duration: digest.total(),
				video_count: digest.len(),
				cycle_count: position.cycle_count,
				cycle_position: position.cycle_position,
			},
			next,
		})
	}

	/// Entity tag, stable while the same second of the same video is playing
	#[allow(clippy::cast_possible_truncation)]
	pub fn etag(&self) -> String {
		format!("\"{}-{}-{}\"", self.live.category_id, self.live.video_index, self.live.position.floor() as i64)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestVideo {
	pub id: String,
	pub title: String,
	pub duration: u32,
	pub start_in_cycle: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestPlaylist {
	pub videos: Vec<ManifestVideo>,
	pub total_duration: u64,
	pub video_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMeta {
	/// Playlist signature the manifest was built from
	pub version: String,
	pub generated_at: DateTime<Utc>,
	pub ttl_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
	pub category_id: ChannelId,
	pub playlist: ManifestPlaylist,
	pub sync: SyncAnchor,
	pub meta: ManifestMeta,
}

impl Manifest {
	pub fn build(station: &Station, channel: &str, now: DateTime<Utc>, ttl_seconds: u64) -> Result<Self> {
		let playlist = station.playlist(channel).ok_or_else(|| BroadcastError::UnknownChannel(channel.to_string()))?;
		let digest = station.digest(channel).ok_or_else(|| BroadcastError::UnknownChannel(channel.to_string()))?;

		let videos = playlist
			.items
			.iter()
			.zip(digest.durations().iter().zip(digest.cumulative_starts()))
			.map(|(item, (duration, start))| ManifestVideo {
				id: item.id.clone(),
				title: item.title.clone(),
				duration: *duration,
				start_in_cycle: *start,
			})
			.collect();

		Ok(Self {
			category_id: channel.to_string(),
			playlist: ManifestPlaylist {
				videos,
				total_duration: digest.total(),
				video_count: digest.len(),
			},
			sync: SyncAnchor::new(now, station.epoch()),
			meta: ManifestMeta {
				version: digest.signature().to_string(),
				generated_at: now,
				ttl_seconds,
			},
		})
	}

	pub fn digest(&self) -> PlaylistDigest {
		PlaylistDigest::from_durations(self.playlist.videos.iter().map(|v| v.duration).collect(), self.meta.version.clone())
	}

	/// Resolve locally; `now` is already corrected for server skew
	pub fn resolve(&self, now: DateTime<Utc>, channel_offset: f64) -> Position {
		let elapsed = millis_to_seconds(now.timestamp_millis() - self.sync.epoch_ms);
		resolver::resolve_elapsed(elapsed, &self.digest(), channel_offset)
	}

	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		let ttl = TimeDelta::seconds(i64::try_from(self.meta.ttl_seconds).unwrap_or(i64::MAX / 1000));
		now >= self.meta.generated_at + ttl
	}
}
