//! `api` crate: HTTP surface over the trigger dispatcher and the execution
//! store.
//!
//! Exposes:
//!   POST   /api/v1/triggers/:trigger_type
//!   GET    /api/v1/executions/in-flight
//!   GET    /api/v1/executions/:id
//!   GET    /api/v1/workflows/:id/executions

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use engine::{ExecutionStore, TriggerDispatcher};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: TriggerDispatcher,
    pub store: Arc<dyn ExecutionStore>,
}

impl AppState {
    pub fn new(dispatcher: TriggerDispatcher) -> Self {
        let store = Arc::clone(dispatcher.executor().store());
        Self { dispatcher, store }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/triggers/:trigger_type", post(handlers::triggers::fire))
        .route("/api/v1/executions/in-flight", get(handlers::executions::in_flight))
        .route("/api/v1/executions/:id", get(handlers::executions::get))
        .route(
            "/api/v1/workflows/:id/executions",
            get(handlers::executions::list_for_workflow),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP API listening");
    axum::serve(listener, router(state)).await
}
