use axum::extract::FromRef;
use axum::Router;
use retro_broadcast::epoch::{EpochAuthority, LocalEpochAuthority};
use retro_broadcast::{BroadcastStation, Catalog, Clock, FileStore, StateStore, SystemClock};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;

pub use config::Config;
pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
	pub config: Arc<Config>,
	pub station: BroadcastStation,
	pub authority: Arc<dyn EpochAuthority>,
	pub clock: Arc<dyn Clock>,
}

impl AppState {
	/// State backed by the on-disk store and the system clock
	pub async fn build(config: Arc<Config>) -> retro_broadcast::Result<Self> {
		let store = FileStore::open(&config.state_dir).await?.with_quota(config.state_quota_bytes);
		Self::with_parts(config, Arc::new(store), Arc::new(SystemClock)).await
	}

	pub async fn with_parts(config: Arc<Config>, store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> retro_broadcast::Result<Self> {
		let authority: Arc<dyn EpochAuthority> = Arc::new(
			LocalEpochAuthority::new(Arc::clone(&store), Arc::clone(&clock), config.epoch_secret.clone()).with_timezone(config.epoch_timezone.clone()),
		);

		let station = BroadcastStation::start(config.broadcast.clone(), Arc::clone(&clock), Arc::clone(&authority), store, Some(config.epoch_secret.clone())).await?;

		if let Some(path) = &config.catalog_path {
			let catalog = Catalog::load(path).await?;
			let outcomes = station.load_catalog(catalog).await?;
			info!(channels = outcomes.len(), path = %path.display(), "catalog loaded");
		}

		Ok(Self {
			config,
			station,
			authority,
			clock,
		})
	}
}

impl FromRef<AppState> for Arc<Config> {
	fn from_ref(app_state: &AppState) -> Self {
		Arc::clone(&app_state.config)
	}
}

impl FromRef<AppState> for BroadcastStation {
	fn from_ref(app_state: &AppState) -> Self {
		app_state.station.clone()
	}
}

pub fn app(state: AppState) -> Router {
	Router::new()
		.merge(routes::health::get_health())
		.merge(routes::epoch::epoch())
		.merge(routes::channels::channels())
		.merge(routes::live::live())
		.with_state(state)
		.layer(TraceLayer::new_for_http())
}
