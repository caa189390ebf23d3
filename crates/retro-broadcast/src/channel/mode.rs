use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use super::OffsetStore;
use crate::types::ChannelId;

/// Gradual return of δ to zero
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decay {
	pub started_at: DateTime<Utc>,
	/// δ when the decay began
	pub from: f64,
	pub steps_applied: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ChannelMode {
	#[default]
	Timeline,
	Manual {
		until: DateTime<Utc>,
		decay: Option<Decay>,
	},
}

impl ChannelMode {
	pub const fn is_manual(&self) -> bool {
		matches!(self, Self::Manual { .. })
	}

	pub const fn is_decaying(&self) -> bool {
		matches!(self, Self::Manual { decay: Some(_), .. })
	}

	pub const fn manual_until(&self) -> Option<DateTime<Utc>> {
		match self {
			Self::Manual { until, .. } => Some(*until),
			Self::Timeline => None,
		}
	}
}

/// What a governor tick did to a channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModeTransition {
	None,
	DecayStarted,
	DecayStep { step: u32, offset: f64 },
	ReturnedToTimeline,
}

impl ModeTransition {
	pub const fn changed_state(&self) -> bool {
		!matches!(self, Self::None)
	}
}

/// Per-channel TIMELINE / MANUAL state machine with auto-return
#[derive(Debug, Clone)]
pub struct ModeGovernor {
	modes: HashMap<ChannelId, ChannelMode>,
	hold: TimeDelta,
	decay: TimeDelta,
	steps: u32,
}

impl ModeGovernor {
	pub fn new(hold: TimeDelta, decay: TimeDelta, steps: u32) -> Self {
		Self {
			modes: HashMap::new(),
			hold,
			decay,
			steps: steps.max(1),
		}
	}

	pub fn mode(&self, channel: &str) -> ChannelMode {
		self.modes.get(channel).copied().unwrap_or_default()
	}

	/// TIMELINE → MANUAL, or refresh the hold timer; an in-flight decay is cancelled and δ kept
	pub fn manual_action(&mut self, channel: &str, now: DateTime<Utc>) -> ChannelMode {
		let until = now.checked_add_signed(self.hold).unwrap_or(DateTime::<Utc>::MAX_UTC);
		let previous = self.mode(channel);
		let mode = ChannelMode::Manual { until, decay: None };
		self.modes.insert(channel.to_string(), mode);

		if previous.is_decaying() {
			debug!(channel, %until, "manual action cancelled decay");
		} else {
			debug!(channel, %until, "channel in manual mode");
		}
		mode
	}

	/// Force TIMELINE and δ = 0, cancelling any decay
	pub fn reset(&mut self, channel: &str, offsets: &mut OffsetStore) {
		offsets.clear(channel);
		if self.modes.remove(channel).is_some() {
			debug!(channel, "channel reset to timeline");
		}
	}

	pub fn reset_all(&mut self, offsets: &mut OffsetStore) {
		offsets.clear_all();
		self.modes.clear();
	}

	/// Reinstate a persisted mode
	pub fn restore(&mut self, channel: &str, mode: ChannelMode) {
		match mode {
			ChannelMode::Timeline => {
				self.modes.remove(channel);
			}
			manual => {
				self.modes.insert(channel.to_string(), manual);
			}
		}
	}

	pub fn forget(&mut self, channel: &str) {
		self.modes.remove(channel);
	}

	pub fn manual_channels(&self) -> Vec<ChannelId> {
		self.modes.keys().cloned().collect()
	}

	/// Advance one channel: start the decay once the hold expired, then apply
	/// every decay step whose time has come. `total` is the channel's cycle length.
	pub fn tick(&mut self, channel: &str, now: DateTime<Utc>, offsets: &mut OffsetStore, total: f64) -> ModeTransition {
		let Some(mode) = self.modes.get_mut(channel) else {
			return ModeTransition::None;
		};

		let ChannelMode::Manual { until, decay } = mode else {
			return ModeTransition::None;
		};

		let Some(active) = decay else {
			if now > *until {
				*decay = Some(Decay {
					started_at: now,
					from: offsets.get(channel),
					steps_applied: 0,
				});
				debug!(channel, from = offsets.get(channel), "decay started");
				return ModeTransition::DecayStarted;
			}
			return ModeTransition::None;
		};

		let step_ms = (self.decay.num_milliseconds() / i64::from(self.steps)).max(1);
		let elapsed_ms = (now - active.started_at).num_milliseconds().max(0);
		let due = u32::try_from(elapsed_ms / step_ms).unwrap_or(u32::MAX).min(self.steps);

		if due <= active.steps_applied {
			return ModeTransition::None;
		}
		active.steps_applied = due;

		if due == self.steps {
			offsets.clear(channel);
			self.modes.remove(channel);
			info!(channel, "decay complete; channel back on timeline");
			return ModeTransition::ReturnedToTimeline;
		}

		let remaining = f64::from(self.steps - due) / f64::from(self.steps);
		let offset = offsets.set(channel, active.from * remaining, total);
		ModeTransition::DecayStep { step: due, offset }
	}
}
