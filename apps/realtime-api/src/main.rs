use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use realtime_api::config::Config;
use realtime_api::db::kv::{KeyValueStore, MemoryStore};
use realtime_api::routes::ApiDoc;
use realtime_api::store::{InMemoryStore, PgStore, Store};
use realtime_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(url) => {
            let pool = realtime_api::db::pool::connect(url).expect("failed to create database pool");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (data is lost on restart)");
            Arc::new(InMemoryStore::new())
        }
    };

    // Tokens and tickets are written by the account service. In-process until
    // a shared KV backend is wired in.
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    tracing::info!(
        worker_id = config.worker_id,
        heartbeat_interval_ms = config.heartbeat_interval_ms,
        typing_ttl_ms = config.typing_ttl_ms,
        "realtime-api configured"
    );

    let state = AppState::new(store, kv, config);
    realtime_api::gateway::sweeper::spawn(state.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(realtime_api::routes::router())
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "realtime-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
