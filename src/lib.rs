pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{
    config::{SessionBackend, Settings},
    redis::RedisHandle,
    state::{AppState, Collaborators},
    telemetry,
};
use crate::services::extraction::DocumentTextExtractor;
use crate::services::generation::ChatCompletionsGenerator;
use crate::services::rendering::PdfRenderer;
use crate::services::sessions::{MemorySessionStore, RedisSessionStore, SessionStore};
use crate::services::storage;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; continuing without cache");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let collaborators = collaborators(&settings, &redis).await?;
    let state = AppState::new(settings, db_pool, redis.clone(), collaborators);

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        sessions = state.settings().sessions().backend.as_str(),
        "Gradeflow API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

async fn collaborators(settings: &Settings, redis: &RedisHandle) -> anyhow::Result<Collaborators> {
    let sessions: Arc<dyn SessionStore> = match settings.sessions().backend {
        SessionBackend::Memory => Arc::new(MemorySessionStore::default()),
        SessionBackend::Redis => Arc::new(RedisSessionStore::new(redis.clone())),
    };

    Ok(Collaborators {
        generator: Arc::new(ChatCompletionsGenerator::from_settings(settings)?),
        extractor: Arc::new(DocumentTextExtractor::from_settings(settings)?),
        renderer: Arc::new(PdfRenderer),
        files: storage::from_settings(settings).await?,
        sessions,
    })
}
