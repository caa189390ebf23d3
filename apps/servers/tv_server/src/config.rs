use clap::Parser;
use retro_broadcast::BroadcastConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser, Clone, Debug, Serialize, Deserialize)]
#[command(author, version, about = "Retro TV broadcast timeline server", long_about = None)]
pub struct Config {
	/// Use JSON formatting for tracing
	#[arg(long, env = "LOG_JSON", default_value = "false")]
	pub log_json: bool,

	/// Log level
	#[arg(long, env = "RUST_LOG")]
	pub rust_log: Option<String>,

	/// Server host
	#[arg(long, env = "HOST", default_value = "127.0.0.1")]
	pub host: String,

	/// Server port
	#[arg(long, env = "PORT", default_value = "8080")]
	pub port: u16,

	/// Channel catalog (channels.json) loaded at start-up
	#[arg(long, env = "CATALOG_PATH")]
	pub catalog_path: Option<PathBuf>,

	/// Directory holding the persisted epoch and channel state
	#[arg(long, env = "STATE_DIR", default_value = "./state")]
	pub state_dir: PathBuf,

	/// Byte quota of the state directory
	#[arg(long, env = "STATE_QUOTA_BYTES")]
	pub state_quota_bytes: Option<u64>,

	/// Key of the epoch checksum
	#[arg(long, env = "EPOCH_SECRET", default_value = "retro-tv-epoch")]
	pub epoch_secret: String,

	/// Token required by the epoch reset endpoint; reset is disabled when unset
	#[arg(long, env = "ADMIN_TOKEN")]
	pub admin_token: Option<String>,

	/// IANA zone label attached to a newly minted epoch
	#[arg(long, env = "EPOCH_TIMEZONE")]
	pub epoch_timezone: Option<String>,

	#[command(flatten)]
	pub broadcast: BroadcastConfig,
}

impl Config {
	pub fn addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}
