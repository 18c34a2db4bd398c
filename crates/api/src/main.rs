use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use winechat_api::{build_router, state::AppState};
use winechat_config::Settings;
use winechat_services::TranslationSettingsDao;
use winechat_translation::providers::ProviderSet;
use winechat_translation::{InMemorySettingsStore, SettingsStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    init_tracing(settings.log.json);

    let providers = ProviderSet::from_settings(&settings.providers, &settings.pipeline)?;
    let store = settings_store(&settings).await?;

    let addr = format!("{}:{}", settings.app.host, settings.app.port);
    let state = AppState::new(settings, providers, store);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Translation server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,winechat=debug"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn settings_store(settings: &Settings) -> anyhow::Result<Arc<dyn SettingsStore>> {
    if settings.database.url.is_empty() {
        warn!("No database configured, translation preferences are kept in memory");
        return Ok(Arc::new(InMemorySettingsStore::new()));
    }
    let db = winechat_db::connect(&settings.database)
        .await
        .context("Failed to connect to MongoDB")?;
    Ok(Arc::new(TranslationSettingsDao::new(&db)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(%e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
