use staffdocs::{AppConfig, DocumentStore, LocalUploadStore};
use std::{process, sync::Arc};

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let addr = match config.socket_addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("{}", e);
            process::exit(1);
        }
    };

    let store: Arc<dyn DocumentStore> =
        match LocalUploadStore::new(config.upload_dir.clone(), &config.public_prefix) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::error!(
                    "Failed to initialize upload directory {}: {}",
                    config.upload_dir.display(),
                    e
                );
                process::exit(1);
            }
        };

    if config.auth_token.is_none() {
        tracing::warn!("AUTH_TOKEN not set, document routes are unauthenticated");
    }

    let app = staffdocs::app(store, &config);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            process::exit(1);
        }
    };

    tracing::info!(
        "Server running on {}, storing uploads in {}",
        addr,
        config.upload_dir.display()
    );

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        process::exit(1);
    }
}
