use anyhow::{Result, anyhow};
use mongodb::bson::oid::ObjectId;
use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::data_models::{CrawlRecord, RecordId, SearchToken, Settings, TokenDocument, TokenId};

/// Operations the crawl and index pipelines need from durable storage.
///
/// Every write is atomic per record; nothing here spans records in a
/// transaction. Implementations must treat a duplicate URL insert as a
/// no-op and make `associate_documents` idempotent.
pub trait Storage: Send + Sync {
    /// Up to `limit` records that have never been crawled, in no particular order.
    fn get_untested(&self, limit: i64) -> impl Future<Output = Result<Vec<CrawlRecord>>> + Send;

    /// Writes the crawl-result fields of `record`, keyed by its id.
    fn update_result(&self, record: &CrawlRecord) -> impl Future<Output = Result<()>> + Send;

    /// Adds a new untested record for `url`; `false` if the URL is already known.
    fn insert_if_absent(&self, url: &str) -> impl Future<Output = Result<bool>> + Send;

    fn get_tested_unindexed(&self) -> impl Future<Output = Result<Vec<CrawlRecord>>> + Send;

    fn set_indexed(&self, ids: &[RecordId]) -> impl Future<Output = Result<()>> + Send;

    fn get_settings(&self) -> impl Future<Output = Result<Settings>> + Send;

    fn find_or_create_token(&self, value: &str) -> impl Future<Output = Result<TokenId>> + Send;

    fn associate_documents(
        &self,
        token_id: TokenId,
        record_ids: &[RecordId],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Records associated with any stored token whose value contains `term`.
    fn query_tokens_by_substring(
        &self,
        term: &str,
    ) -> impl Future<Output = Result<Vec<CrawlRecord>>> + Send;
}

#[derive(Default)]
struct MemoryState {
    records: Vec<CrawlRecord>,
    tokens: Vec<SearchToken>,
    associations: BTreeSet<TokenDocument>,
    settings: Option<Settings>,
    failing_urls: HashSet<String>,
}

/// In-process [`Storage`] with the same uniqueness and idempotency rules as
/// the MongoDB store. Counts every write so callers can assert on side effects.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                settings: Some(settings),
                ..MemoryState::default()
            }),
            writes: AtomicUsize::new(0),
        }
    }

    /// A store with no settings document; `get_settings` fails.
    pub fn without_settings() -> Self {
        Self::default()
    }

    pub async fn seed(&self, urls: &[&str]) -> Vec<RecordId> {
        let mut state = self.state.lock().await;
        let mut ids = Vec::with_capacity(urls.len());
        for url in urls {
            if state.records.iter().any(|r| r.url == *url) {
                continue;
            }
            let record = CrawlRecord::new(url.to_string());
            ids.push(record.id);
            state.records.push(record);
        }
        ids
    }

    /// Inserts a fully-formed record as-is, bypassing the write counter.
    pub async fn put_record(&self, record: CrawlRecord) {
        self.state.lock().await.records.push(record);
    }

    /// Makes every subsequent `update_result` for `url` fail.
    pub async fn fail_writes_for(&self, url: &str) {
        self.state.lock().await.failing_urls.insert(url.to_string());
    }

    pub async fn set_settings(&self, settings: Settings) {
        self.state.lock().await.settings = Some(settings);
    }

    pub async fn records(&self) -> Vec<CrawlRecord> {
        self.state.lock().await.records.clone()
    }

    pub async fn record_by_url(&self, url: &str) -> Option<CrawlRecord> {
        self.state
            .lock()
            .await
            .records
            .iter()
            .find(|r| r.url == url)
            .cloned()
    }

    pub async fn token_values(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .tokens
            .iter()
            .map(|t| t.value.clone())
            .collect()
    }

    pub async fn association_count(&self) -> usize {
        self.state.lock().await.associations.len()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn count_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Storage for MemoryStore {
    async fn get_untested(&self, limit: i64) -> Result<Vec<CrawlRecord>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .filter(|r| r.last_tested.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_result(&self, record: &CrawlRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.failing_urls.contains(&record.url) {
            return Err(anyhow!("injected write failure for {}", record.url));
        }
        let existing = state
            .records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| anyhow!("no crawl record with id {}", record.id))?;
        existing.success = record.success;
        existing.response_code = record.response_code;
        existing.crawl_duration_micros = record.crawl_duration_micros;
        existing.page_title = record.page_title.clone();
        existing.page_description = record.page_description.clone();
        existing.headings = record.headings.clone();
        existing.last_tested = record.last_tested;
        drop(state);
        self.count_write();
        Ok(())
    }

    async fn insert_if_absent(&self, url: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.records.iter().any(|r| r.url == url) {
            return Ok(false);
        }
        state.records.push(CrawlRecord::new(url.to_string()));
        drop(state);
        self.count_write();
        Ok(true)
    }

    async fn get_tested_unindexed(&self) -> Result<Vec<CrawlRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .filter(|r| r.last_tested.is_some() && !r.indexed)
            .cloned()
            .collect())
    }

    async fn set_indexed(&self, ids: &[RecordId]) -> Result<()> {
        let mut state = self.state.lock().await;
        for record in state.records.iter_mut().filter(|r| ids.contains(&r.id)) {
            record.indexed = true;
        }
        drop(state);
        self.count_write();
        Ok(())
    }

    async fn get_settings(&self) -> Result<Settings> {
        self.state
            .lock()
            .await
            .settings
            .clone()
            .ok_or_else(|| anyhow!("search settings have not been initialised"))
    }

    async fn find_or_create_token(&self, value: &str) -> Result<TokenId> {
        let mut state = self.state.lock().await;
        if let Some(token) = state.tokens.iter().find(|t| t.value == value) {
            return Ok(token.id);
        }
        let token = SearchToken {
            id: ObjectId::new(),
            value: value.to_string(),
        };
        let id = token.id;
        state.tokens.push(token);
        drop(state);
        self.count_write();
        Ok(id)
    }

    async fn associate_documents(&self, token_id: TokenId, record_ids: &[RecordId]) -> Result<()> {
        let mut state = self.state.lock().await;
        for record_id in record_ids {
            state.associations.insert(TokenDocument {
                token_id,
                record_id: *record_id,
            });
        }
        drop(state);
        self.count_write();
        Ok(())
    }

    async fn query_tokens_by_substring(&self, term: &str) -> Result<Vec<CrawlRecord>> {
        let state = self.state.lock().await;
        let mut out = Vec::new();
        for token in state.tokens.iter().filter(|t| t.value.contains(term)) {
            for assoc in state.associations.iter().filter(|a| a.token_id == token.id) {
                if let Some(record) = state.records.iter().find(|r| r.id == assoc.record_id) {
                    out.push(record.clone());
                }
            }
        }
        Ok(out)
    }
}
