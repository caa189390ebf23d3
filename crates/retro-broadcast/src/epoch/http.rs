use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{EpochAuthority, EpochRecord};
use crate::error::Result;

/// Header carrying the administrative token for privileged epoch operations
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Epoch authority reached over HTTP (`GET /api/epoch`, `POST /api/epoch/reset`)
#[derive(Debug, Clone)]
pub struct HttpEpochAuthority {
	client: reqwest::Client,
	base_url: String,
	admin_token: Option<String>,
}

impl HttpEpochAuthority {
	pub fn new(base_url: impl Into<String>) -> Result<Self> {
		let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
		Ok(Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			admin_token: None,
		})
	}

	pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
		self.admin_token = Some(token.into());
		self
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}
}

#[async_trait]
impl EpochAuthority for HttpEpochAuthority {
	#[instrument(skip(self), fields(base = %self.base_url))]
	async fn fetch(&self) -> Result<EpochRecord> {
		let record = self.client.get(self.url("/api/epoch")).send().await?.error_for_status()?.json::<EpochRecord>().await?;
		debug!(epoch = %record.epoch_iso8601, "fetched epoch");
		Ok(record)
	}

	#[instrument(skip(self), fields(base = %self.base_url))]
	async fn reset(&self) -> Result<EpochRecord> {
		let mut request = self.client.post(self.url("/api/epoch/reset"));
		if let Some(token) = &self.admin_token {
			request = request.header(ADMIN_TOKEN_HEADER, token);
		}
		let record = request.send().await?.error_for_status()?.json::<EpochRecord>().await?;
		Ok(record)
	}
}
