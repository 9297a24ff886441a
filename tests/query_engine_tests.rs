use anyhow::Result;
use mongodb::bson::DateTime;
use std::collections::HashSet;
use std::sync::Arc;

use trawl::analyzer::TextAnalyzer;
use trawl::data_models::{CrawlRecord, ParsedPage, Settings};
use trawl::indexer::Indexer;
use trawl::query_engine::QueryEngine;
use trawl::storage::MemoryStore;

mod test_helpers {
    use super::*;

    pub fn crawled(url: &str, title: &str) -> CrawlRecord {
        let mut record = CrawlRecord::new(url.to_string());
        let page = ParsedPage {
            title: title.to_string(),
            ..ParsedPage::default()
        };
        record.apply_crawl(true, 200, &page, DateTime::now());
        record
    }

    /// Stores `records`, indexes them, and returns a query engine over the result.
    pub async fn indexed(records: Vec<CrawlRecord>) -> Result<QueryEngine<MemoryStore>> {
        let store = Arc::new(MemoryStore::new(Settings::default()));
        for record in records {
            store.put_record(record).await;
        }
        let analyzer = Arc::new(TextAnalyzer::standard());
        Indexer::new(store.clone(), analyzer.clone())
            .run_index()
            .await?;
        Ok(QueryEngine::new(store, analyzer))
    }

    pub fn urls(records: &[CrawlRecord]) -> HashSet<&str> {
        records.iter().map(|r| r.url.as_str()).collect()
    }
}

use test_helpers::*;

#[tokio::test]
async fn test_indexed_title_is_found() -> Result<()> {
    let engine = indexed(vec![crawled("https://a.org/", "Hello World")]).await?;

    let results = engine.search("hello").await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].url, "https://a.org/");
    assert_eq!(results[0].page_title, "Hello World");
    Ok(())
}

#[tokio::test]
async fn test_query_is_case_insensitive() -> Result<()> {
    let engine = indexed(vec![crawled("https://a.org/", "hello world")]).await?;
    assert_eq!(engine.search("HELLO").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_partial_term_matches_by_substring() -> Result<()> {
    let engine = indexed(vec![crawled("https://a.org/", "Hello World")]).await?;
    assert_eq!(engine.search("hel").await?.len(), 1);
    assert_eq!(engine.search("orl").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_query_and_document_share_stems() -> Result<()> {
    let engine = indexed(vec![crawled("https://a.org/", "Connecting people")]).await?;
    assert_eq!(engine.search("connected").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_no_match_is_empty() -> Result<()> {
    let engine = indexed(vec![crawled("https://a.org/", "Hello World")]).await?;
    assert!(engine.search("zebra").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_query_without_terms_is_empty() -> Result<()> {
    let engine = indexed(vec![crawled("https://a.org/", "Hello World")]).await?;
    assert!(engine.search("").await?.is_empty());
    assert!(engine.search("   ").await?.is_empty());
    assert!(engine.search("the and of").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_multiple_terms_are_a_union() -> Result<()> {
    let engine = indexed(vec![
        crawled("https://a.org/", "Hello World"),
        crawled("https://b.org/", "Hello Rust"),
        crawled("https://c.org/", "Goodbye"),
    ])
    .await?;

    let results = engine.search("world rust").await?;
    assert_eq!(urls(&results), HashSet::from(["https://a.org/", "https://b.org/"]));
    Ok(())
}

#[tokio::test]
async fn test_results_are_unique_by_record() -> Result<()> {
    let engine = indexed(vec![
        crawled("https://a.org/", "Hello World"),
        crawled("https://b.org/", "Hello Rust"),
    ])
    .await?;

    // both records match every term
    let results = engine.search("hello hello org").await?;
    assert_eq!(results.len(), 2);
    assert_eq!(urls(&results), HashSet::from(["https://a.org/", "https://b.org/"]));
    Ok(())
}

#[tokio::test]
async fn test_unindexed_records_are_not_found() -> Result<()> {
    let store = Arc::new(MemoryStore::new(Settings::default()));
    store.put_record(crawled("https://a.org/", "Hello World")).await;
    let engine = QueryEngine::new(store, Arc::new(TextAnalyzer::standard()));

    assert!(engine.search("hello").await?.is_empty());
    Ok(())
}
