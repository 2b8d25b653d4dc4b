//! HTTP middleware layers

use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};

/// CORS for the embedded recipe cards.
///
/// Cards run on arbitrary publisher origins and only send anonymous ids.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}
