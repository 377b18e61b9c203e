use std::net::SocketAddr;
use std::sync::Arc;

use axum::{http, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use taskroom::catalog::TaskCatalog;
use taskroom::gateway::{self, AppState};
use taskroom::registry::RoomRegistry;
use taskroom::{config, telemetry};

async fn healthz() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    // Fatal if missing or malformed: the game cannot run without tasks.
    let catalog = TaskCatalog::load(&config::tasks_path())?;
    info!(tasks = catalog.len(), "task catalog loaded");

    let state = AppState {
        registry: Arc::new(RoomRegistry::new()),
        catalog: Arc::new(catalog),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(gateway::ws_handler))
        .layer(
            CorsLayer::new()
                .allow_methods([http::Method::GET, http::Method::POST])
                .allow_headers([http::header::CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config::server_addr();
    info!("listening on http://{}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
