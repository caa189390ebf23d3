pub mod catalog;
pub mod channel;
pub mod clock;
pub mod config;
pub mod epoch;
pub mod error;
pub mod live;
pub mod persistence;
pub mod playlist;
pub mod resolver;
pub mod station;
pub mod sync;
pub mod types;

pub use catalog::Catalog;
pub use clock::{Clock, ManualClock, SkewedClock, SystemClock};
pub use config::BroadcastConfig;
pub use epoch::{EpochAnchor, EpochAuthority, EpochRecord, HttpEpochAuthority, LocalEpochAuthority};
pub use error::{BroadcastError, Result};
pub use live::{LiveState, Manifest, SyncAnchor};
pub use persistence::{FileStore, MemoryStore, Persistence, SaveReport, StateStore};
pub use playlist::{Playlist, PlaylistDigest, PlaylistItem};
pub use resolver::{resolve, Position};
pub use station::{BroadcastStation, ChannelStatus, LoadOutcome, Station, StationEngine};
pub use sync::{Correction, DriftPolicy, LiveSync, LiveSyncController, PositionFeed, SyncState, VideoPlayer};
pub use types::{ChannelId, Epoch, TimeMs};
