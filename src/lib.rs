//! Crawl a growing set of URLs, index their metadata, and answer keyword
//! searches over the result.
//!
//! The two jobs, [`crawler::Crawler::run_crawl`] and
//! [`indexer::Indexer::run_index`], are meant to be triggered on a schedule by
//! something outside this crate. Both talk to durable state only through
//! [`storage::Storage`].

pub mod analyzer;
pub mod api;
pub mod config;
pub mod crawler;
pub mod data_models;
pub mod db;
pub mod extractor;
pub mod fetcher;
pub mod indexer;
pub mod query_engine;
pub mod storage;
