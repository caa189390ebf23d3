use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{EpochAuthority, EpochRecord};
use crate::error::{BroadcastError, Result};
use crate::types::Epoch;

#[derive(Debug, Clone)]
struct CachedEpoch {
	epoch: Epoch,
	fetched_at: DateTime<Utc>,
}

/// Local view of T₀: cached, revalidated against the authority, and pinned
/// for the lifetime of the session.
pub struct EpochAnchor {
	authority: Arc<dyn EpochAuthority>,
	secret: Option<String>,
	ttl: TimeDelta,
	cached: Option<CachedEpoch>,
	session: Option<Epoch>,
	degraded: bool,
}

impl EpochAnchor {
	pub fn new(authority: Arc<dyn EpochAuthority>, ttl: TimeDelta) -> Self {
		Self {
			authority,
			secret: None,
			ttl,
			cached: None,
			session: None,
			degraded: false,
		}
	}

	/// Validate authority responses against this shared secret
	pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
		self.secret = Some(secret.into());
		self
	}

	/// Seed the cache from a persisted record
	pub fn with_cached(mut self, epoch: Epoch, fetched_at: DateTime<Utc>) -> Self {
		self.cached = Some(CachedEpoch { epoch, fetched_at });
		self
	}

	/// T₀ as seen by this session, if one was obtained
	pub const fn session_epoch(&self) -> Option<&Epoch> {
		self.session.as_ref()
	}

	/// Cached epoch and the instant it was last confirmed
	pub fn cached(&self) -> Option<(&Epoch, DateTime<Utc>)> {
		self.cached.as_ref().map(|c| (&c.epoch, c.fetched_at))
	}

	pub const fn is_degraded(&self) -> bool {
		self.degraded
	}

	fn is_fresh(&self, now: DateTime<Utc>) -> bool {
		self.cached.as_ref().is_some_and(|c| now - c.fetched_at < self.ttl)
	}

	/// T₀, from cache while fresh, otherwise from the authority with the
	/// cache as fallback. Fails only when neither is available.
	pub async fn get_epoch(&mut self, now: DateTime<Utc>) -> Result<Epoch> {
		if self.is_fresh(now) {
			return Ok(self.pin_cached());
		}
		self.revalidate(now).await
	}

	/// Ask the authority regardless of cache freshness
	pub async fn revalidate(&mut self, now: DateTime<Utc>) -> Result<Epoch> {
		match self.fetch_validated().await {
			Ok(fetched) => {
				self.degraded = false;
				match &self.session {
					Some(session) if *session != fetched => {
						warn!(
							session = %session.to_iso(),
							authority = %fetched.to_iso(),
							"authority epoch differs from session epoch; keeping session epoch until reset"
						);
					}
					Some(_) => debug!("epoch revalidated"),
					None => info!(epoch = %fetched.to_iso(), "epoch obtained from authority"),
				}
				self.cached = Some(CachedEpoch { epoch: fetched, fetched_at: now });
				Ok(self.pin_cached())
			}
			Err(e) => {
				if self.cached.is_none() {
					return self.session.clone().ok_or_else(|| BroadcastError::EpochUnavailable(e.to_string()));
				}
				if !self.degraded {
					warn!(error = %e, "epoch authority unreachable; continuing with cached epoch");
				}
				self.degraded = true;
				Ok(self.pin_cached())
			}
		}
	}

	/// Administrative reset through the authority; replaces the session epoch
	pub async fn reset_epoch(&mut self, now: DateTime<Utc>) -> Result<Epoch> {
		let record = self.authority.reset().await?;
		let epoch = self.validate(&record)?;
		warn!(epoch = %epoch.to_iso(), "session epoch replaced by reset");
		self.cached = Some(CachedEpoch {
			epoch: epoch.clone(),
			fetched_at: now,
		});
		self.session = Some(epoch.clone());
		self.degraded = false;
		Ok(epoch)
	}

	async fn fetch_validated(&self) -> Result<Epoch> {
		let record = self.authority.fetch().await?;
		self.validate(&record)
	}

	fn validate(&self, record: &EpochRecord) -> Result<Epoch> {
		if let Some(secret) = &self.secret {
			if !record.verify(secret) {
				return Err(BroadcastError::ChecksumMismatch(record.epoch_iso8601.clone()));
			}
		}
		record.epoch()
	}

	/// The session epoch, pinning the cached one on first use
	fn pin_cached(&mut self) -> Epoch {
		if let Some(session) = &self.session {
			return session.clone();
		}
		let epoch = self.cached.as_ref().map(|c| c.epoch.clone()).unwrap_or_else(|| Epoch::new(DateTime::<Utc>::UNIX_EPOCH));
		self.session = Some(epoch.clone());
		epoch
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
	use std::sync::Mutex;

	struct ScriptedAuthority {
		record: Mutex<EpochRecord>,
		fail: AtomicBool,
		calls: AtomicUsize,
	}

	impl ScriptedAuthority {
		fn new(iso: &str) -> Self {
			Self {
				record: Mutex::new(EpochRecord::signed(&Epoch::parse(iso, None).unwrap(), "k")),
				fail: AtomicBool::new(false),
				calls: AtomicUsize::new(0),
			}
		}

		fn set(&self, iso: &str) {
			*self.record.lock().unwrap() = EpochRecord::signed(&Epoch::parse(iso, None).unwrap(), "k");
		}
	}

	#[async_trait]
	impl EpochAuthority for ScriptedAuthority {
		async fn fetch(&self) -> Result<EpochRecord> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			if self.fail.load(Ordering::SeqCst) {
				return Err(BroadcastError::EpochUnavailable("offline".into()));
			}
			Ok(self.record.lock().unwrap().clone())
		}

		async fn reset(&self) -> Result<EpochRecord> {
			self.set("2025-06-01T00:00:00Z");
			Ok(self.record.lock().unwrap().clone())
		}
	}

	fn now() -> DateTime<Utc> {
		DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z").unwrap().to_utc()
	}

	#[tokio::test]
	async fn serves_from_cache_within_ttl() {
		let authority = Arc::new(ScriptedAuthority::new("2024-01-01T00:00:00Z"));
		let mut anchor = EpochAnchor::new(authority.clone(), TimeDelta::hours(2));

		anchor.get_epoch(now()).await.unwrap();
		anchor.get_epoch(now() + TimeDelta::minutes(90)).await.unwrap();
		assert_eq!(authority.calls.load(Ordering::SeqCst), 1);

		anchor.get_epoch(now() + TimeDelta::hours(3)).await.unwrap();
		assert_eq!(authority.calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn falls_back_to_cache_when_authority_fails() {
		let authority = Arc::new(ScriptedAuthority::new("2024-01-01T00:00:00Z"));
		authority.fail.store(true, Ordering::SeqCst);
		let cached = Epoch::parse("2023-12-31T00:00:00Z", None).unwrap();
		let mut anchor = EpochAnchor::new(authority, TimeDelta::hours(2)).with_cached(cached.clone(), now() - TimeDelta::days(1));

		assert_eq!(anchor.get_epoch(now()).await.unwrap(), cached);
		assert!(anchor.is_degraded());
	}

	#[tokio::test]
	async fn unavailable_without_cache() {
		let authority = Arc::new(ScriptedAuthority::new("2024-01-01T00:00:00Z"));
		authority.fail.store(true, Ordering::SeqCst);
		let mut anchor = EpochAnchor::new(authority, TimeDelta::hours(2));
		assert!(matches!(anchor.get_epoch(now()).await, Err(BroadcastError::EpochUnavailable(_))));
	}

	#[tokio::test]
	async fn session_epoch_is_immutable_across_refresh() {
		let authority = Arc::new(ScriptedAuthority::new("2024-01-01T00:00:00Z"));
		let mut anchor = EpochAnchor::new(authority.clone(), TimeDelta::hours(2));
		let first = anchor.get_epoch(now()).await.unwrap();

		authority.set("2024-02-02T00:00:00Z");
		let later = anchor.get_epoch(now() + TimeDelta::hours(5)).await.unwrap();
		assert_eq!(first, later);
		assert_eq!(anchor.session_epoch(), Some(&first));
	}

	#[tokio::test]
	async fn rejects_tampered_records() {
		let authority = Arc::new(ScriptedAuthority::new("2024-01-01T00:00:00Z"));
		let mut anchor = EpochAnchor::new(authority, TimeDelta::hours(2)).with_secret("wrong");
		assert!(matches!(anchor.get_epoch(now()).await, Err(BroadcastError::EpochUnavailable(_))));
	}

	#[tokio::test]
	async fn reset_replaces_session() {
		let authority = Arc::new(ScriptedAuthority::new("2024-01-01T00:00:00Z"));
		let mut anchor = EpochAnchor::new(authority, TimeDelta::hours(2)).with_secret("k");
		anchor.get_epoch(now()).await.unwrap();
		let reset = anchor.reset_epoch(now()).await.unwrap();
		assert_eq!(reset.to_iso(), "2025-06-01T00:00:00.000Z");
		assert_eq!(anchor.get_epoch(now()).await.unwrap(), reset);
	}
}
