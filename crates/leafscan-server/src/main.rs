mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use leafscan_api::AppStateInner;
use leafscan_identify::{CatalogIdentifier, OpenAiIdentifier, PlantIdentifier};
use leafscan_store::fs::IMAGE_URL_PREFIX;
use leafscan_store::sqlite::Database;
use leafscan_store::{
    BlobClient, FileStore, HttpBlobClient, MemoryBlobClient, MemoryStore, ObjectStore,
    RecordStore, SqliteStore,
};

use crate::config::{Config, StorageKind};

/// Every workspace crate logs at debug unless `RUST_LOG` says otherwise.
const DEFAULT_LOG_FILTER: &str = "leafscan=debug,leafscan_api=debug,leafscan_identify=debug,\
                                  leafscan_store=debug,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = Config::from_env()?;

    let (store, images) = open_store(&config).await?;
    let identifier = open_identifier(&config)?;
    let state = AppStateInner::new(store, identifier);

    let mut app: Router = leafscan_api::router(state);
    if let Some(dir) = images {
        info!("Serving plant images from {}", dir.display());
        app = app.nest_service(IMAGE_URL_PREFIX, ServeDir::new(dir));
    }
    let app = app
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Leafscan listening on {} ({} storage)", addr, config.storage);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// The selected backend, plus the image directory to expose when it keeps
/// images on local disk.
async fn open_store(
    config: &Config,
) -> anyhow::Result<(Arc<dyn RecordStore>, Option<PathBuf>)> {
    let mut images = None;
    let store: Arc<dyn RecordStore> = match config.storage {
        StorageKind::Memory => Arc::new(MemoryStore::new()),
        StorageKind::File => {
            let store = FileStore::new(config.data_dir.clone()).await?;
            info!("Plant records stored under {}", store.root().display());
            images = Some(store.images_dir());
            Arc::new(store)
        }
        StorageKind::Object => {
            let client: Arc<dyn BlobClient> = match &config.object_url {
                Some(url) => {
                    info!("Object storage at {}", url);
                    Arc::new(HttpBlobClient::new(url, config.object_token.clone())?)
                }
                None => {
                    warn!("LEAFSCAN_OBJECT_URL not set, keeping objects in memory");
                    Arc::new(MemoryBlobClient::new())
                }
            };
            Arc::new(ObjectStore::new(client))
        }
        StorageKind::Sqlite => Arc::new(SqliteStore::new(Database::open(&config.db_path)?)),
    };
    Ok((store, images))
}

fn open_identifier(config: &Config) -> anyhow::Result<Arc<dyn PlantIdentifier>> {
    match &config.openai_api_key {
        Some(key) => {
            let identifier = OpenAiIdentifier::new(
                key.clone(),
                config.ai_model.clone(),
                config.ai_base_url.clone(),
            )?
            .with_region(config.ai_region.clone());
            info!("Identifying plants with {}", identifier.model());
            Ok(Arc::new(identifier))
        }
        None => {
            warn!("OPENAI_API_KEY not set, answering from the built-in houseplant catalog");
            Ok(Arc::new(CatalogIdentifier::new()))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_every_crate() {
        let targets: Vec<&str> = DEFAULT_LOG_FILTER
            .split(',')
            .filter_map(|directive| directive.split('=').next())
            .collect();
        for target in ["leafscan", "leafscan_api", "leafscan_identify", "leafscan_store"] {
            assert!(targets.contains(&target), "{} missing from {}", target, DEFAULT_LOG_FILTER);
        }
        assert!(DEFAULT_LOG_FILTER.parse::<tracing_subscriber::EnvFilter>().is_ok());
    }
}
