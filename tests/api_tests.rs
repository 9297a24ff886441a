use anyhow::Result;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::Router;
use mongodb::bson::DateTime;
use std::sync::Arc;
use tower::ServiceExt;

use trawl::analyzer::TextAnalyzer;
use trawl::api::create_router;
use trawl::api::models::SearchResponse;
use trawl::data_models::{CrawlRecord, ParsedPage, Settings};
use trawl::indexer::Indexer;
use trawl::query_engine::QueryEngine;
use trawl::storage::MemoryStore;

async fn app() -> Result<Router> {
    let store = Arc::new(MemoryStore::new(Settings::default()));
    let mut record = CrawlRecord::new("https://a.org/".to_string());
    let page = ParsedPage {
        title: "Hello World".to_string(),
        description: "A greeting".to_string(),
        ..ParsedPage::default()
    };
    record.apply_crawl(true, 200, &page, DateTime::now());
    store.put_record(record).await;

    let analyzer = Arc::new(TextAnalyzer::standard());
    Indexer::new(store.clone(), analyzer.clone()).run_index().await?;
    Ok(create_router(Arc::new(QueryEngine::new(store, analyzer))))
}

async fn post_search(app: Router, body: &str) -> Result<(StatusCode, SearchResponse)> {
    let request = Request::builder()
        .method("POST")
        .uri("/api/search")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))?;
    let response = app.oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

#[tokio::test]
async fn test_search_returns_matching_records() -> Result<()> {
    let (status, response) = post_search(app().await?, r#"{"term":"hello"}"#).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(response.success);
    assert_eq!(response.message, "Search results");

    let data = response.data.unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].url, "https://a.org/");
    assert_eq!(data[0].title, "Hello World");
    assert_eq!(data[0].description, "A greeting");
    assert_eq!(data[0].response_code, 200);
    assert!(data[0].last_tested.is_some());
    Ok(())
}

#[tokio::test]
async fn test_no_match_is_an_empty_list() -> Result<()> {
    let (status, response) = post_search(app().await?, r#"{"term":"zebra"}"#).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(response.success);
    assert_eq!(response.data.map(|d| d.len()), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_blank_term_is_rejected() -> Result<()> {
    let (status, response) = post_search(app().await?, r#"{"term":"   "}"#).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!response.success);
    assert!(response.data.is_none());
    Ok(())
}

#[tokio::test]
async fn test_malformed_body_is_rejected() -> Result<()> {
    let (status, response) = post_search(app().await?, r#"{"query":"hello"}"#).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response.message, "Invalid input");

    let (status, _) = post_search(app().await?, "not json").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
