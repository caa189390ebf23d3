mod anchor;
mod authority;
mod checksum;
mod http;

pub use anchor::EpochAnchor;
pub use authority::{EpochAuthority, LocalEpochAuthority, AUTHORITY_EPOCH_KEY};
pub use checksum::{sign_epoch, verify_epoch};
pub use http::{HttpEpochAuthority, ADMIN_TOKEN_HEADER};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Epoch;

/// Epoch as served by the authority endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochRecord {
	#[serde(rename = "epochISO8601")]
	pub epoch_iso8601: String,
	pub timezone: Option<String>,
	pub checksum: String,
}

impl EpochRecord {
	pub fn signed(epoch: &Epoch, secret: &str) -> Self {
		let iso = epoch.to_iso();
		Self {
			checksum: sign_epoch(secret, &iso),
			epoch_iso8601: iso,
			timezone: epoch.timezone.clone(),
		}
	}

	pub fn epoch(&self) -> Result<Epoch> {
		Epoch::parse(&self.epoch_iso8601, self.timezone.clone())
	}

	pub fn verify(&self, secret: &str) -> bool {
		verify_epoch(secret, &self.epoch_iso8601, &self.checksum)
	}
}
