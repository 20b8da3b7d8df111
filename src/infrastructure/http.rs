//! HTTP transport publishing the inventory service.
//!
//! Every handler answers 200; failures are already folded into empty
//! inventories and the `-1` power sentinel by the service.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::application::{InventoryService, ProxyStatus};
use crate::domain::{AppError, Result};

/// Build the router with all endpoints under `base_path`.
pub fn router(service: Arc<InventoryService>, base_path: &str) -> Router {
    let api = Router::new()
        .route("/inventory", get(inventory_handler))
        .route("/version", get(version_handler))
        .route("/status", get(status_handler))
        .route("/power", get(power_handler).put(set_power_handler));

    let app = if base_path == "/" || base_path.is_empty() {
        api
    } else {
        Router::new().nest(base_path, api)
    };

    app.layer(TraceLayer::new_for_http()).with_state(service)
}

async fn inventory_handler(State(service): State<Arc<InventoryService>>) -> Json<Vec<String>> {
    Json(service.inventory().await)
}

async fn version_handler(State(service): State<Arc<InventoryService>>) -> Json<&'static str> {
    Json(service.version())
}

/// Body of `PUT {path}/power`.
#[derive(Debug, Deserialize)]
struct PowerRequest {
    power_mw: u32,
}

async fn power_handler(State(service): State<Arc<InventoryService>>) -> Json<i64> {
    Json(service.power().await)
}

async fn set_power_handler(
    State(service): State<Arc<InventoryService>>,
    Json(request): Json<PowerRequest>,
) -> Json<i64> {
    Json(service.set_power(request.power_mw).await)
}

async fn status_handler(State(service): State<Arc<InventoryService>>) -> Json<ProxyStatus> {
    Json(service.status().await)
}

/// Bind `addr` and serve until `shutdown` resolves.
///
/// # Errors
/// Returns error if the address cannot be bound or the server fails.
pub async fn serve(
    service: Arc<InventoryService>,
    addr: &str,
    base_path: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::io(format!("Failed to bind {addr}"), e))?;

    tracing::info!(endpoint = %format!("http://{addr}{base_path}"), "Service published");

    axum::serve(listener, router(service, base_path))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AppError::Transport {
            message: e.to_string(),
        })
}
