//! API gateway: HTTP REST and WebSocket transport over the session core.
//!
//! The gateway stays thin. Request handlers validate nothing themselves;
//! they resolve the caller and hand off to the lifecycle manager or the
//! delivery engine, which own the semantics.

pub mod auth;
pub mod error;
pub mod rest;
pub mod state;
pub mod websocket;

pub use error::{GatewayError, GatewayResult};
pub use state::GatewayState;

use axum::{http::Method, Router};
use tower_http::cors::{Any, CorsLayer};

/// Assemble the application router with all routes and CORS.
pub fn create_router(state: GatewayState) -> Router {
    Router::new()
        .merge(rest::create_rest_routes())
        .merge(websocket::create_websocket_routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers(Any),
        )
        .with_state(state)
}
