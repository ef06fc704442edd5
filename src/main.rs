use std::sync::Arc;

use inkroom::config::Config;
use inkroom::state::AppState;
use inkroom::store::{BoardStore, MemoryStore, PgStore};
use inkroom::{db, routes};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let store: Arc<dyn BoardStore> = match &config.database_url {
        Some(url) => {
            let pool = db::init_pool(url, config.db_max_connections)
                .await
                .expect("database init failed");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store, nothing survives a restart");
            let memory = MemoryStore::new();
            if let Some(token) = &config.dev_session_token {
                let (user, board) = memory
                    .seed_demo(token)
                    .expect("seeding demo data failed");
                tracing::info!(user_id = %user.id, board_id = %board.id, "seeded demo user and board");
            }
            Arc::new(memory)
        }
    };

    let port = config.port;
    let state = AppState::new(store, config);
    let batcher = state.batcher.clone();

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "inkroom listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");

    tracing::info!("flushing pending board writes");
    batcher.settle_all().await;
    tracing::info!("inkroom shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
