use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of wall-clock time for every time-dependent component
pub trait Clock: Send + Sync + fmt::Debug {
	fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Settable clock shared between a test and the components under test
#[derive(Debug, Clone)]
pub struct ManualClock {
	millis: Arc<AtomicI64>,
}

impl ManualClock {
	pub fn new(start: DateTime<Utc>) -> Self {
		Self {
			millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
		}
	}

	pub fn set(&self, at: DateTime<Utc>) {
		self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
	}

	pub fn advance(&self, by: TimeDelta) {
		self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
	}

	pub fn advance_millis(&self, ms: i64) {
		self.millis.fetch_add(ms, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
	}
}

/// Reads an inner clock corrected by the skew observed against the server
/// (`skew = local − serverTimeMs`).
#[derive(Debug, Clone)]
pub struct SkewedClock<C> {
	inner: C,
	skew: Arc<AtomicI64>,
}

impl<C: Clock> SkewedClock<C> {
	pub fn new(inner: C) -> Self {
		Self {
			inner,
			skew: Arc::new(AtomicI64::new(0)),
		}
	}

	pub fn set_skew_ms(&self, skew_ms: i64) {
		self.skew.store(skew_ms, Ordering::SeqCst);
	}

	pub fn skew_ms(&self) -> i64 {
		self.skew.load(Ordering::SeqCst)
	}
}

impl<C: Clock> Clock for SkewedClock<C> {
	fn now(&self) -> DateTime<Utc> {
		self.inner.now() - TimeDelta::milliseconds(self.skew_ms())
	}
}
