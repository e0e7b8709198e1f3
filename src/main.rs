use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use argo_relay::config::Settings;
use argo_relay::conversation::create_conversation_store;
use argo_relay::postgres::PostgresPool;
use argo_relay::server::{create_app, AppState};
use argo_relay::shutdown::GracefulShutdown;
use argo_relay::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (tracing is configured from it)
    let settings = Settings::new()?;

    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    // Conversation store
    let postgres_pool = if settings.database.backend == "postgres" {
        let pool = PostgresPool::new(&settings.database).await?;
        tracing::info!(url = %pool.database_url_masked(), "Connected to PostgreSQL");
        Some(pool)
    } else {
        None
    };
    let store = create_conversation_store(&settings.database, postgres_pool.as_ref());
    store.initialize().await?;

    let state = AppState::new(settings.clone(), store, postgres_pool.clone());
    let registry = state.registry.clone();
    tracing::info!("Application state initialized");

    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler())
        .await?;

    // Upgraded connections outlive the listener; close them explicitly
    GracefulShutdown::new(registry).execute().await;

    if let Some(pool) = postgres_pool {
        pool.close().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
