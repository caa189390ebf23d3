use chrono::TimeDelta;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{BroadcastError, Result};

/// Tunables of the broadcast timeline core
#[derive(Args, Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BroadcastConfig {
	/// Duration substituted for playlist items with a missing or invalid duration (seconds)
	#[arg(long, env = "DEFAULT_VIDEO_DURATION", default_value_t = 300)]
	pub default_duration_secs: u32,

	/// Time a channel stays in manual mode after a manual action (seconds)
	#[arg(long, env = "MANUAL_HOLD_SECS", default_value_t = 60)]
	pub manual_hold_secs: u64,

	/// Duration of the gradual return of the channel offset to zero (milliseconds)
	#[arg(long, env = "DECAY_MS", default_value_t = 10_000)]
	pub decay_ms: u64,

	/// Number of linear steps in the decay
	#[arg(long, env = "DECAY_STEPS", default_value_t = 20)]
	pub decay_steps: u32,

	/// Drift above which the controller seeks instead of nudging the rate (milliseconds)
	#[arg(long, env = "SEEK_THRESHOLD_MS", default_value_t = 2000)]
	pub seek_threshold_ms: u64,

	/// Drift below which no correction is issued (milliseconds)
	#[arg(long, env = "RATE_THRESHOLD_MS", default_value_t = 200)]
	pub rate_threshold_ms: u64,

	/// Lowest playback rate a nudge may set
	#[arg(long, env = "RATE_MIN", default_value_t = 0.9)]
	pub rate_min: f64,

	/// Highest playback rate a nudge may set
	#[arg(long, env = "RATE_MAX", default_value_t = 1.1)]
	pub rate_max: f64,

	/// Proportional gain k of the rate nudge
	#[arg(long, env = "RATE_GAIN", default_value_t = 0.1)]
	pub rate_gain: f64,

	/// Time after which a rate nudge is reset to 1.0 (milliseconds)
	#[arg(long, env = "RATE_WINDOW_MS", default_value_t = 2000)]
	pub rate_window_ms: u64,

	/// Nominal live-sync polling cadence (milliseconds)
	#[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 1000)]
	pub poll_interval_ms: u64,

	/// Cap of the polling backoff under sustained failures (milliseconds)
	#[arg(long, env = "MAX_POLL_BACKOFF_MS", default_value_t = 30_000)]
	pub max_poll_backoff_ms: u64,

	/// Window after a video change during which drift checks are suppressed (milliseconds)
	#[arg(long, env = "VIDEO_CHANGE_DEBOUNCE_MS", default_value_t = 1000)]
	pub video_change_debounce_ms: u64,

	/// Consecutive failed seeks after which a video change is forced
	#[arg(long, env = "MAX_SEEK_FAILURES", default_value_t = 3)]
	pub max_seek_failures: u32,

	/// Maximum persisted channel records before LRU eviction
	#[arg(long, env = "MAX_PERSISTED_CHANNELS", default_value_t = 10)]
	pub max_channels: usize,

	/// Minimum channel records retained under quota pressure
	#[arg(long, env = "MIN_PERSISTED_CHANNELS", default_value_t = 3)]
	pub min_channels: usize,

	/// Persistence auto-save interval (seconds)
	#[arg(long, env = "SAVE_INTERVAL_SECS", default_value_t = 5)]
	pub save_interval_secs: u64,

	/// Client-side epoch cache lifetime (seconds)
	#[arg(long, env = "EPOCH_CACHE_TTL_SECS", default_value_t = 7200)]
	pub epoch_cache_ttl_secs: u64,

	/// Lifetime of a manifest handed to clients (seconds)
	#[arg(long, env = "MANIFEST_TTL_SECS", default_value_t = 300)]
	pub manifest_ttl_secs: u64,
}

impl Default for BroadcastConfig {
	fn default() -> Self {
		Self {
			default_duration_secs: 300,
			manual_hold_secs: 60,
			decay_ms: 10_000,
			decay_steps: 20,
			seek_threshold_ms: 2000,
			rate_threshold_ms: 200,
			rate_min: 0.9,
			rate_max: 1.1,
			rate_gain: 0.1,
			rate_window_ms: 2000,
			poll_interval_ms: 1000,
			max_poll_backoff_ms: 30_000,
			video_change_debounce_ms: 1000,
			max_seek_failures: 3,
			max_channels: 10,
			min_channels: 3,
			save_interval_secs: 5,
			epoch_cache_ttl_secs: 7200,
			manifest_ttl_secs: 300,
		}
	}
}

impl BroadcastConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub const fn with_manual_hold_secs(mut self, secs: u64) -> Self {
		self.manual_hold_secs = secs;
		self
	}

	pub const fn with_decay(mut self, decay_ms: u64, steps: u32) -> Self {
		self.decay_ms = decay_ms;
		self.decay_steps = steps;
		self
	}

	pub const fn with_thresholds(mut self, rate_threshold_ms: u64, seek_threshold_ms: u64) -> Self {
		self.rate_threshold_ms = rate_threshold_ms;
		self.seek_threshold_ms = seek_threshold_ms;
		self
	}

	pub const fn with_poll_interval_ms(mut self, ms: u64) -> Self {
		self.poll_interval_ms = ms;
		self
	}

	pub const fn with_channel_limits(mut self, min_channels: usize, max_channels: usize) -> Self {
		self.min_channels = min_channels;
		self.max_channels = max_channels;
		self
	}

	pub const fn with_save_interval_secs(mut self, secs: u64) -> Self {
		self.save_interval_secs = secs;
		self
	}

	pub const fn with_epoch_cache_ttl_secs(mut self, secs: u64) -> Self {
		self.epoch_cache_ttl_secs = secs;
		self
	}

	/// Fail fast on options outside their admissible range
	pub fn validate(&self) -> Result<()> {
		let fail = |msg: &str| -> Result<()> { Err(BroadcastError::Configuration(msg.to_string())) };

		if self.default_duration_secs == 0 {
			return fail("default video duration must be positive");
		}
		if self.decay_steps == 0 {
			return fail("decay must have at least one step");
		}
		if self.decay_ms == 0 {
			return fail("decay duration must be positive");
		}
		if self.rate_threshold_ms == 0 || self.rate_threshold_ms >= self.seek_threshold_ms {
			return fail("drift thresholds must satisfy 0 < rate threshold < seek threshold");
		}
		if !(self.rate_min > 0.0 && self.rate_min <= 1.0 && self.rate_max >= 1.0) {
			return fail("playback rate clamp must satisfy 0 < min <= 1 <= max");
		}
		if !(self.rate_gain.is_finite() && self.rate_gain >= 0.0) {
			return fail("rate gain must be a non-negative number");
		}
		if self.video_change_debounce_ms < 500 {
			return fail("video change debounce must be at least 500ms");
		}
		if self.poll_interval_ms == 0 || self.poll_interval_ms > self.max_poll_backoff_ms {
			return fail("poll interval must be positive and not exceed the backoff cap");
		}
		if self.max_seek_failures == 0 {
			return fail("max seek failures must be positive");
		}
		if self.min_channels == 0 || self.min_channels > self.max_channels {
			return fail("persisted channel limits must satisfy 0 < min <= max");
		}
		if self.save_interval_secs == 0 {
			return fail("save interval must be positive");
		}
		Ok(())
	}

	pub fn manual_hold(&self) -> TimeDelta {
		i64::try_from(self.manual_hold_secs).ok().and_then(TimeDelta::try_seconds).unwrap_or(TimeDelta::MAX)
	}

	pub fn decay(&self) -> TimeDelta {
		TimeDelta::milliseconds(i64::try_from(self.decay_ms).unwrap_or(i64::MAX / 1000))
	}

	/// Wall-clock length of one decay step
	pub fn decay_step(&self) -> Duration {
		Duration::from_millis((self.decay_ms / u64::from(self.decay_steps.max(1))).max(1))
	}

	pub fn epoch_cache_ttl(&self) -> TimeDelta {
		i64::try_from(self.epoch_cache_ttl_secs).ok().and_then(TimeDelta::try_seconds).unwrap_or(TimeDelta::MAX)
	}

	pub const fn save_interval(&self) -> Duration {
		Duration::from_secs(self.save_interval_secs)
	}

	pub const fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub const fn max_poll_backoff(&self) -> Duration {
		Duration::from_millis(self.max_poll_backoff_ms)
	}

	pub fn video_change_debounce(&self) -> TimeDelta {
		TimeDelta::milliseconds(i64::try_from(self.video_change_debounce_ms).unwrap_or(i64::MAX / 1000))
	}

	pub fn rate_window(&self) -> TimeDelta {
		TimeDelta::milliseconds(i64::try_from(self.rate_window_ms).unwrap_or(i64::MAX / 1000))
	}
}
