use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
	#[error("quota exceeded: {needed} bytes needed, limit {limit}")]
	QuotaExceeded { needed: u64, limit: u64 },

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

/// Durable key/value store of UTF-8 JSON records shared by every process of a
/// deployment. Concurrent writers resolve by last-writer-wins.
#[async_trait]
pub trait StateStore: Send + Sync {
	async fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
	async fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
	async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store with an optional byte quota over all keys
#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: Mutex<HashMap<String, String>>,
	quota_bytes: Option<u64>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_quota(quota_bytes: u64) -> Self {
		Self {
			entries: Mutex::new(HashMap::new()),
			quota_bytes: Some(quota_bytes),
		}
	}

	pub fn keys(&self) -> Vec<String> {
		self.entries.lock().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect()
	}
}

#[async_trait]
impl StateStore for MemoryStore {
	async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned())
	}

	async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
		let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
		if let Some(limit) = self.quota_bytes {
			let others: usize = entries.iter().filter(|(k, _)| k.as_str() != key).map(|(k, v)| k.len() + v.len()).sum();
			let needed = (others + key.len() + value.len()) as u64;
			if needed > limit {
				return Err(StoreError::QuotaExceeded { needed, limit });
			}
		}
		entries.insert(key.to_string(), value.to_string());
		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.entries.lock().unwrap_or_else(PoisonError::into_inner).remove(key);
		Ok(())
	}
}

/// One `<key>.json` file per record under a directory
#[derive(Debug, Clone)]
pub struct FileStore {
	root: PathBuf,
	quota_bytes: Option<u64>,
}

impl FileStore {
	pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
		let root = root.as_ref().to_path_buf();
		tokio::fs::create_dir_all(&root).await?;
		Ok(Self { root, quota_bytes: None })
	}

	pub const fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
		self.quota_bytes = quota_bytes;
		self
	}

	fn path_for(&self, key: &str) -> PathBuf {
		self.root.join(format!("{key}.json"))
	}

	async fn used_bytes_except(&self, key: &str) -> Result<u64, StoreError> {
		let skip = self.path_for(key);
		let mut total = 0;
		let mut dir = tokio::fs::read_dir(&self.root).await?;
		while let Some(entry) = dir.next_entry().await? {
			let path = entry.path();
			if path == skip || path.extension().and_then(|e| e.to_str()) != Some("json") {
				continue;
			}
			total += entry.metadata().await?.len();
		}
		Ok(total)
	}
}

#[async_trait]
impl StateStore for FileStore {
	async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
		match tokio::fs::read_to_string(self.path_for(key)).await {
			Ok(raw) => Ok(Some(raw)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
		if let Some(limit) = self.quota_bytes {
			let needed = self.used_bytes_except(key).await? + value.len() as u64;
			if needed > limit {
				return Err(StoreError::QuotaExceeded { needed, limit });
			}
		}
		// Write-then-rename so a concurrent reader never sees a torn record
		let tmp = self.root.join(format!(".{key}.{}.tmp", std::process::id()));
		tokio::fs::write(&tmp, value.as_bytes()).await?;
		tokio::fs::rename(&tmp, self.path_for(key)).await?;
		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		match tokio::fs::remove_file(self.path_for(key)).await {
			Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
			_ => Ok(()),
		}
	}
}
