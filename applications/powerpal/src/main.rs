use powerpal::{
    auth::{AuthGateway, StoreAuthGateway},
    config::{Config, StoreBackend},
    create_router,
    store::{DocumentStore, InMemoryStore, PostgresStore},
    AppError, AppState, Analytics, Environment,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting powerpal service");

    // Load configuration
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());

    let config = Config::load(&config_path)?;
    info!("Configuration loaded from: {}", config_path);

    let store = open_store(&config).await?;
    let auth: Arc<dyn AuthGateway> =
        Arc::new(StoreAuthGateway::new(store.clone(), config.auth.clone()));
    let analytics = Analytics::new(Environment::Production, &config.analytics);

    if config.ingest.api_key.is_none() {
        info!("No ingest api_key configured, device push endpoint disabled");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(store, auth, config, analytics);
    let app = create_router(state);

    // Start HTTP server
    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "powerpal=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn open_store(config: &Config) -> Result<Arc<dyn DocumentStore>, AppError> {
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory document store; data is lost on restart");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let url = config
                .store
                .url
                .as_deref()
                .ok_or_else(|| AppError::Config("store.url is required".to_string()))?;
            let store = PostgresStore::connect(url, config.store.max_connections).await?;
            store.ensure_schema().await?;
            info!("Connected to Postgres document store");
            Ok(Arc::new(store))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
