use std::sync::Arc;

use friendhub::config::Config;
use friendhub::store::Store;
use friendhub::store::memory::MemoryStore;
use friendhub::store::postgres::PgStore;
use friendhub::{db, routes, services, state};

#[tokio::main]
async fn main() {
    // Missing .env is fine; the environment may be set by the process manager.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pool = db::init_pool(url, config.db_max_connections)
                .await
                .expect("database init failed");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; history is kept in memory and lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let groups = services::groups::hydrate(store.as_ref())
        .await
        .expect("group directory load failed");

    let port = config.port;
    let state = state::AppState::new(config, store, groups);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "friendhub listening");
    axum::serve(listener, app).await.expect("server failed");
}
