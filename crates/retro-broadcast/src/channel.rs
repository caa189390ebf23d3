mod mode;
mod offsets;

pub use mode::{ChannelMode, Decay, ModeGovernor, ModeTransition};
pub use offsets::{normalize_offset, OffsetStore};
