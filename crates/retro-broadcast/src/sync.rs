mod controller;
mod drift;
mod driver;
mod supervisor;

pub use controller::{CorrectionStats, LiveSyncController, SyncCommand, SyncState, SyncStatus};
pub use drift::{Correction, DriftPolicy, LocalCursor};
pub use driver::{DriverError, DriverResult, PositionFeed, VideoPlayer};
pub use supervisor::LiveSync;
