use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{BroadcastError, Result};
use crate::playlist::{Playlist, PlaylistItem};

/// Channel catalog as exported by the channel fetcher (`channels.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
	#[serde(default)]
	pub version: Option<i64>,
	#[serde(default)]
	pub generated_at: Option<String>,
	pub channels: Vec<CatalogChannel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogChannel {
	#[serde(rename = "_id")]
	pub id: String,
	pub name: String,
	/// Per-channel start recorded by the catalog; the shared epoch always wins
	#[serde(default)]
	pub playlist_start_epoch: Option<String>,
	#[serde(default)]
	pub items: Vec<CatalogItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
	#[serde(rename = "_id", default)]
	pub id: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub youtube_id: String,
	#[serde(default)]
	pub duration: Option<f64>,
	#[serde(default)]
	pub year: Option<i32>,
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default)]
	pub category: Option<String>,
}

impl Catalog {
	pub fn from_json(json: &str) -> Result<Self> {
		Ok(serde_json::from_str(json)?)
	}

	pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let raw = tokio::fs::read_to_string(path)
			.await
			.map_err(|e| BroadcastError::Store(crate::persistence::StoreError::Io(e)))?;
		let catalog = Self::from_json(&raw)?;
		info!(path = %path.display(), channels = catalog.channels.len(), "loaded channel catalog");
		Ok(catalog)
	}

	/// One playlist per channel; the video id is the YouTube id when present
	pub fn into_playlists(self) -> Vec<Playlist> {
		self.channels.into_iter().map(CatalogChannel::into_playlist).collect()
	}
}

impl CatalogChannel {
	pub fn into_playlist(self) -> Playlist {
		let items: Vec<PlaylistItem> = self
			.items
			.into_iter()
			.map(|item| {
				let id = if item.youtube_id.is_empty() { item.id } else { item.youtube_id };
				PlaylistItem::new(id, item.title, item.duration)
			})
			.collect();
		debug!(channel = %self.id, videos = items.len(), "catalog channel converted");
		Playlist::new(self.id, self.name, items)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = r#"{
		"version": 1733000000000,
		"generatedAt": "2024-12-01T00:00:00Z",
		"channels": [
			{
				"_id": "693091b4054578621f1918fd",
				"name": "Music",
				"playlistStartEpoch": "2020-01-01T00:00:00.000Z",
				"items": [
					{ "_id": "custom_music_0", "title": "O Ajnabi", "youtubeId": "abc123", "duration": 245, "tags": [] },
					{ "_id": "custom_music_1", "title": "Bani Bani", "youtubeId": "", "duration": 0, "year": 2002 },
					{ "_id": "custom_music_2", "title": "Salaame", "youtubeId": "xyz789", "category": "film" }
				]
			},
			{ "_id": "empty", "name": "Static" }
		]
	}"#;

	#[test]
	fn parses_catalog_export() {
		let catalog = Catalog::from_json(SAMPLE).unwrap();
		assert_eq!(catalog.version, Some(1_733_000_000_000));
		assert_eq!(catalog.channels.len(), 2);

		let playlists = catalog.into_playlists();
		let music = &playlists[0];
		assert_eq!(music.channel_id, "693091b4054578621f1918fd");
		assert_eq!(music.name, "Music");
		assert_eq!(music.items[0].id, "abc123");
		assert_eq!(music.items[1].id, "custom_music_1");
		assert_eq!(music.items[1].duration, Some(0.0));
		assert_eq!(music.items[2].duration, None);
		assert!(playlists[1].is_empty());
	}
}
