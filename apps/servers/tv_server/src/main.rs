use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{filter::EnvFilter, fmt::format::JsonFields, layer::SubscriberExt, util::SubscriberInitExt, Layer};
use tv_server::{app, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
	dotenv::dotenv().ok();
	let config = Config::parse();
	let _ = init_tracing(&config);

	config.broadcast.validate()?;
	let config = Arc::new(config);
	let state = AppState::build(Arc::clone(&config)).await?;
	let station = state.station.clone();

	let listener = TcpListener::bind(config.addr()).await?;
	tracing::info!("listening on {}", listener.local_addr()?);

	let shutdown_token = CancellationToken::new();
	let signal_shutdown_token = shutdown_token.clone();
	tokio::spawn(async move {
		tokio::signal::ctrl_c().await.ok();
		tracing::info!("Received Ctrl+C, initiating shutdown...");
		signal_shutdown_token.cancel();
	});

	let server_token = shutdown_token.clone();
	axum::serve(listener, app(state))
		.with_graceful_shutdown(async move {
			server_token.cancelled().await;
		})
		.await?;
	tracing::info!("Server stopped");

	// Final flush of channel state happens inside the engine on shutdown
	match tokio::time::timeout(Duration::from_secs(5), station.shutdown()).await {
		Ok(()) => tracing::info!("Graceful shutdown completed"),
		Err(_) => tracing::error!("Shutdown timeout - forcing exit"),
	}

	Ok(())
}

fn init_tracing(config: &Config) -> Option<()> {
	let filter = EnvFilter::try_new(config.rust_log.as_deref()?).ok()?;

	tracing_subscriber::registry()
		.with(if config.log_json {
			Box::new(
				tracing_subscriber::fmt::layer()
					.fmt_fields(JsonFields::default())
					.event_format(tracing_subscriber::fmt::format().json().flatten_event(true).with_span_list(false))
					.with_filter(filter),
			) as Box<dyn Layer<_> + Send + Sync>
		} else {
			Box::new(tracing_subscriber::fmt::layer().event_format(tracing_subscriber::fmt::format().pretty()).with_filter(filter))
		})
		.try_init()
		.ok()
}
