use tokio::sync::oneshot;

use super::{ChannelStatus, LoadOutcome};
use crate::error::Result;
use crate::live::{LiveState, Manifest};
use crate::persistence::SaveReport;
use crate::playlist::Playlist;
use crate::resolver::Position;
use crate::types::{ChannelId, Epoch};

type Reply<T> = oneshot::Sender<T>;

/// Requests handled by the station engine, one at a time
#[derive(Debug)]
pub enum StationCommand {
	LoadPlaylist {
		playlist: Playlist,
		response: Reply<LoadOutcome>,
	},
	RemoveChannel {
		channel: ChannelId,
		response: Reply<bool>,
	},
	Position {
		channel: ChannelId,
		response: Reply<Result<Position>>,
	},
	JumpToVideo {
		channel: ChannelId,
		index: usize,
		offset: f64,
		response: Reply<Result<Position>>,
	},
	SeekBy {
		channel: ChannelId,
		seconds: f64,
		response: Reply<Result<Position>>,
	},
	Skip {
		channel: ChannelId,
		steps: i64,
		response: Reply<Result<Position>>,
	},
	GoLive {
		channel: ChannelId,
		response: Reply<Result<Position>>,
	},
	Status {
		channel: ChannelId,
		response: Reply<Result<ChannelStatus>>,
	},
	Channels {
		response: Reply<Vec<ChannelStatus>>,
	},
	LiveState {
		channel: ChannelId,
		include_next: bool,
		response: Reply<Result<LiveState>>,
	},
	Manifest {
		channel: ChannelId,
		response: Reply<Result<Manifest>>,
	},
	Epoch {
		response: Reply<Epoch>,
	},
	ResetEpoch {
		response: Reply<Result<Epoch>>,
	},
	Flush {
		response: Reply<Result<SaveReport>>,
	},
}
