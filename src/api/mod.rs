use axum::http::{Method, header};
use axum::{Router, routing::post};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::query_engine::QueryEngine;
use crate::storage::Storage;

pub mod handlers;
pub mod models;

/// Router exposing `POST /api/search` over `query_engine`.
pub fn create_router<S: Storage + 'static>(query_engine: Arc<QueryEngine<S>>) -> Router {
    // browser front ends live on other origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/search", post(handlers::search_handler::<S>))
        .with_state(query_engine)
        .layer(cors)
}
