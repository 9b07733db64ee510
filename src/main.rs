use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod config;
mod metrics;
mod resolver;
mod routes;
mod upstream;

use config::Config;
use routes::{create_router, AppState};
use upstream::darksky::DarkSkyClient;
use upstream::mock::{MockForecastProvider, MockPollenProvider};
use upstream::pollen::PollenApiClient;
use upstream::{ForecastProvider, PollenProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_pollen_proxy=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Bad flags or environment stop us before anything binds
    let config = Config::load()?;

    let (forecast_client, pollen_client): (Arc<dyn ForecastProvider>, Arc<dyn PollenProvider>) =
        if config.mock_upstream {
            tracing::warn!("Serving generated data, upstream providers will not be called");
            (
                Arc::new(MockForecastProvider::new()),
                Arc::new(MockPollenProvider::new(config.pollen_format)),
            )
        } else {
            (
                Arc::new(DarkSkyClient::new(&config)?),
                Arc::new(PollenApiClient::new(&config)?),
            )
        };

    let port = config.port;
    tracing::info!(
        pollen_format = %config.pollen_format,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        purge_interval_secs = config.purge_interval.as_secs(),
        "Configuration loaded"
    );

    let state = AppState::new(Arc::new(config), forecast_client, pollen_client);
    let purgers = state.spawn_purgers();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    tracing::info!("Starting server on :{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for purger in purgers {
        purger.abort();
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
