mod commands;
mod engine;
mod handle;
mod state;

pub use engine::StationEngine;
pub use handle::BroadcastStation;
pub use state::{ChannelStatus, LoadOutcome, ModeLabel, Station};

pub(crate) use commands::StationCommand;
