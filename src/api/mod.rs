//! REST API
//!
//! Thin axum handlers over [`Portal`]: they authenticate, decode the request,
//! call one service operation and serialize the result. All authorization
//! decisions stay in the services.

pub mod account_routes;
pub mod auth;
pub mod billing_routes;
pub mod complaint_routes;
pub mod error;

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::portal::Portal;

pub use auth::CurrentActor;
pub use error::{ApiError, ApiResult};

pub type AppState = Arc<Portal>;

/// Full application router with tracing and CORS.
pub fn create_router(portal: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(account_routes::router())
        .merge(complaint_routes::router())
        .merge(billing_routes::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(portal)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
