use axum::extract::rejection::JsonRejection;
use axum::{Json, extract::State, http::StatusCode};
use std::sync::Arc;

use crate::query_engine::QueryEngine;
use crate::storage::Storage;

use super::models::{RecordResult, SearchRequest, SearchResponse};

pub async fn search_handler<S: Storage + 'static>(
    State(query_engine): State<Arc<QueryEngine<S>>>,
    request: Result<Json<SearchRequest>, JsonRejection>,
) -> (StatusCode, Json<SearchResponse>) {
    let Ok(Json(request)) = request else {
        return (
            StatusCode::BAD_REQUEST,
            Json(SearchResponse::failure("Invalid input")),
        );
    };
    if request.term.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(SearchResponse::failure("Invalid input")),
        );
    }

    match query_engine.search(&request.term).await {
        Ok(records) => {
            let results: Vec<RecordResult> = records.into_iter().map(RecordResult::from).collect();
            (
                StatusCode::OK,
                Json(SearchResponse {
                    success: true,
                    message: "Search results".to_string(),
                    data: Some(results),
                }),
            )
        }
        Err(e) => {
            log::error!("search for {:?} failed: {:#}", request.term, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SearchResponse::failure("Search failed")),
            )
        }
    }
}
