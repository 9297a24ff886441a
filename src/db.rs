use anyhow::{Context, Result};
use futures::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions, ReturnDocument};
use mongodb::{
    Client, Collection, Database as MongoDatabase, IndexModel,
    bson::{Document, doc, from_document, oid::ObjectId, to_document},
};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;

use crate::config::CONFIG;
use crate::data_models::{CrawlRecord, RecordId, SearchToken, Settings, TokenDocument, TokenId};
use crate::storage::Storage;

/// Collection names as constants for consistency
pub mod collections {
    pub const CRAWL_RECORDS: &str = "crawl_records";
    pub const SEARCH_TOKENS: &str = "search_tokens";
    pub const TOKEN_DOCUMENTS: &str = "token_documents";
    pub const SEARCH_SETTINGS: &str = "search_settings";
}

const SETTINGS_DOC_ID: i32 = 1;
const DUPLICATE_KEY: i32 = 11000;

/// Main database wrapper providing connection management and collection access
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    db: MongoDatabase,
}

impl Database {
    /// Create a new Database instance with custom URI and database name.
    /// Useful for testing with a different database.
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        let client_options = ClientOptions::parse(uri)
            .await
            .context("Failed to parse MongoDB connection string")?;

        let client =
            Client::with_options(client_options).context("Failed to create MongoDB client")?;

        // Ping the database to verify connection
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .context("Failed to connect to MongoDB")?;

        log::info!("Connected to MongoDB database: {}", db_name);

        let db = client.database(db_name);

        Ok(Self { client, db })
    }

    /// Create a Database instance using environment configuration
    pub async fn from_config() -> Result<Self> {
        Self::new(&CONFIG.mongo_uri, &CONFIG.mongo_db_name).await
    }

    /// Get a typed collection by name
    pub fn collection<T>(&self, name: &str) -> Collection<T>
    where
        T: Send + Sync,
    {
        self.db.collection(name)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn crawl_records(&self) -> Collection<CrawlRecord> {
        self.collection(collections::CRAWL_RECORDS)
    }

    pub fn search_tokens(&self) -> Collection<SearchToken> {
        self.collection(collections::SEARCH_TOKENS)
    }

    pub fn token_documents(&self) -> Collection<TokenDocument> {
        self.collection(collections::TOKEN_DOCUMENTS)
    }

    pub fn search_settings(&self) -> Collection<Document> {
        self.collection(collections::SEARCH_SETTINGS)
    }

    /// Creates the unique and lookup indexes the store relies on. Safe to repeat.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.crawl_records()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "url": 1 })
                    .options(unique())
                    .build(),
            )
            .await
            .context("Failed to create url index")?;
        self.crawl_records()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "last_tested": 1, "indexed": 1 })
                    .build(),
            )
            .await
            .context("Failed to create crawl state index")?;
        self.search_tokens()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "value": 1 })
                    .options(unique())
                    .build(),
            )
            .await
            .context("Failed to create token value index")?;
        self.token_documents()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "token_id": 1, "record_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await
            .context("Failed to create token association index")?;

        log::debug!("MongoDB indexes are in place");
        Ok(())
    }
}

pub(crate) fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    ) || matches!(
        // findAndModify reports a duplicate key as a command error
        err.kind.as_ref(),
        ErrorKind::Command(e) if e.code == DUPLICATE_KEY
    )
}

// =============================================================================
// Generic operations
// =============================================================================

pub struct Repository<T>
where
    T: Send + Sync,
{
    collection: Collection<T>,
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    pub fn new(collection: Collection<T>) -> Self {
        Self { collection }
    }

    /// Find all documents matching a filter, at most `limit` if given
    pub async fn find(&self, filter: Document, limit: Option<i64>) -> Result<Vec<T>> {
        let mut action = self.collection.find(filter);
        if let Some(limit) = limit {
            action = action.limit(limit);
        }
        let cursor = action.await.context("Failed to execute find query")?;

        cursor
            .try_collect()
            .await
            .context("Failed to collect results")
    }

    /// Update a document by ObjectId
    pub async fn update_by_id(&self, id: ObjectId, update: Document) -> Result<bool> {
        let filter = doc! { "_id": id };
        let result = self
            .collection
            .update_one(filter, doc! { "$set": update })
            .await
            .context("Failed to update document")?;

        Ok(result.matched_count > 0)
    }

    /// Update multiple documents matching a filter
    pub async fn update_many(&self, filter: Document, update: Document) -> Result<u64> {
        let result = self
            .collection
            .update_many(filter, doc! { "$set": update })
            .await
            .context("Failed to update documents")?;

        Ok(result.modified_count)
    }
}

// =============================================================================
// Crawl record operations
// =============================================================================

pub struct CrawlRecordRepo {
    repo: Repository<CrawlRecord>,
}

impl CrawlRecordRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            repo: Repository::new(db.crawl_records()),
        }
    }

    /// At most `limit` untested records. Mongo reads a zero limit as "no
    /// limit" and a negative one as a single batch, so both return nothing here.
    pub async fn list_untested(&self, limit: i64) -> Result<Vec<CrawlRecord>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        self.repo
            .find(doc! { "last_tested": null }, Some(limit))
            .await
    }

    pub async fn list_tested_unindexed(&self) -> Result<Vec<CrawlRecord>> {
        self.repo
            .find(
                doc! { "last_tested": { "$ne": null }, "indexed": false },
                None,
            )
            .await
    }

    pub async fn list_by_ids(&self, ids: &[RecordId]) -> Result<Vec<CrawlRecord>> {
        self.repo
            .find(doc! { "_id": { "$in": ids.to_vec() } }, None)
            .await
    }

    /// Writes only the crawl-result fields; `url`, `indexed` and `created_at` are untouched.
    pub async fn update_crawl_result(&self, record: &CrawlRecord) -> Result<()> {
        let matched = self
            .repo
            .update_by_id(
                record.id,
                doc! {
                    "success": record.success,
                    "response_code": record.response_code,
                    "crawl_duration_micros": record.crawl_duration_micros,
                    "page_title": &record.page_title,
                    "page_description": &record.page_description,
                    "headings": &record.headings,
                    "last_tested": record.last_tested,
                },
            )
            .await?;
        if !matched {
            anyhow::bail!("no crawl record with id {}", record.id);
        }
        Ok(())
    }

    pub async fn insert_if_absent(&self, url: &str) -> Result<bool> {
        let mut fresh = to_document(&CrawlRecord::new(url.to_string()))?;
        fresh.remove("url");

        let result = self
            .repo
            .collection
            .update_one(doc! { "url": url }, doc! { "$setOnInsert": fresh })
            .upsert(true)
            .await;
        match result {
            Ok(res) => Ok(res.upserted_id.is_some()),
            // Lost a race against a concurrent insert of the same URL.
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e).context("Failed to insert crawl record"),
        }
    }

    pub async fn mark_many_as_indexed(&self, ids: &[RecordId]) -> Result<u64> {
        self.repo
            .update_many(
                doc! { "_id": { "$in": ids.to_vec() } },
                doc! { "indexed": true },
            )
            .await
    }
}

// =============================================================================
// Token operations
// =============================================================================

pub struct TokenRepo {
    tokens: Collection<SearchToken>,
    associations: Collection<TokenDocument>,
}

impl TokenRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            tokens: db.search_tokens(),
            associations: db.token_documents(),
        }
    }

    pub async fn find_or_create(&self, value: &str) -> Result<TokenId> {
        let upsert = || {
            self.tokens
                .find_one_and_update(
                    doc! { "value": value },
                    doc! { "$setOnInsert": { "value": value } },
                )
                .upsert(true)
                .return_document(ReturnDocument::After)
        };
        let token = match upsert().await {
            Ok(token) => token,
            // A concurrent upsert created it first; the retry will find it.
            Err(e) if is_duplicate_key(&e) => upsert().await?,
            Err(e) => return Err(e).context("Failed to upsert search token"),
        };
        token
            .map(|t| t.id)
            .ok_or_else(|| anyhow::anyhow!("token upsert for {value:?} returned no document"))
    }

    pub async fn associate(&self, token_id: TokenId, record_ids: &[RecordId]) -> Result<()> {
        for &record_id in record_ids {
            let row = doc! { "token_id": token_id, "record_id": record_id };
            let result = self
                .associations
                .update_one(row.clone(), doc! { "$setOnInsert": row })
                .upsert(true)
                .await;
            match result {
                Ok(_) => {}
                Err(e) if is_duplicate_key(&e) => {}
                Err(e) => return Err(e).context("Failed to associate token with record"),
            }
        }
        Ok(())
    }

    /// Record ids associated with tokens containing `term`, one entry per association.
    pub async fn record_ids_matching(&self, term: &str) -> Result<Vec<RecordId>> {
        let tokens: Vec<SearchToken> = self
            .tokens
            .find(doc! { "value": { "$regex": regex::escape(term) } })
            .await
            .context("Failed to query tokens")?
            .try_collect()
            .await?;
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let token_ids: Vec<TokenId> = tokens.iter().map(|t| t.id).collect();
        let rows: Vec<TokenDocument> = self
            .associations
            .find(doc! { "token_id": { "$in": token_ids } })
            .await
            .context("Failed to query token associations")?
            .try_collect()
            .await?;
        Ok(rows.into_iter().map(|r| r.record_id).collect())
    }
}

// =============================================================================
// Settings
// =============================================================================

pub struct SettingsRepo {
    collection: Collection<Document>,
}

impl SettingsRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.search_settings(),
        }
    }

    pub async fn get(&self) -> Result<Settings> {
        let raw = self
            .collection
            .find_one(doc! { "_id": SETTINGS_DOC_ID })
            .await
            .context("Failed to read search settings")?
            .ok_or_else(|| anyhow::anyhow!("search settings have not been initialised"))?;
        from_document(raw).context("Malformed search settings document")
    }

    /// Writes `defaults` only if no settings document exists yet.
    pub async fn ensure_defaults(&self, defaults: &Settings) -> Result<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": SETTINGS_DOC_ID },
                doc! { "$setOnInsert": to_document(defaults)? },
            )
            .upsert(true)
            .await
            .context("Failed to initialise search settings")?;
        Ok(result.upserted_id.is_some())
    }
}

// =============================================================================
// Storage backed by MongoDB
// =============================================================================

pub struct MongoStore {
    records: CrawlRecordRepo,
    tokens: TokenRepo,
    settings: SettingsRepo,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        Self {
            records: CrawlRecordRepo::new(db),
            tokens: TokenRepo::new(db),
            settings: SettingsRepo::new(db),
        }
    }

    pub async fn ensure_default_settings(&self) -> Result<bool> {
        self.settings.ensure_defaults(&Settings::default()).await
    }
}

impl Storage for MongoStore {
    async fn get_untested(&self, limit: i64) -> Result<Vec<CrawlRecord>> {
        self.records.list_untested(limit).await
    }

    async fn update_result(&self, record: &CrawlRecord) -> Result<()> {
        self.records.update_crawl_result(record).await
    }

    async fn insert_if_absent(&self, url: &str) -> Result<bool> {
        self.records.insert_if_absent(url).await
    }

    async fn get_tested_unindexed(&self) -> Result<Vec<CrawlRecord>> {
        self.records.list_tested_unindexed().await
    }

    async fn set_indexed(&self, ids: &[RecordId]) -> Result<()> {
        let updated = self.records.mark_many_as_indexed(ids).await?;
        log::debug!("Marked {} of {} records as indexed", updated, ids.len());
        Ok(())
    }

    async fn get_settings(&self) -> Result<Settings> {
        self.settings.get().await
    }

    async fn find_or_create_token(&self, value: &str) -> Result<TokenId> {
        self.tokens.find_or_create(value).await
    }

    async fn associate_documents(&self, token_id: TokenId, record_ids: &[RecordId]) -> Result<()> {
        self.tokens.associate(token_id, record_ids).await
    }

    async fn query_tokens_by_substring(&self, term: &str) -> Result<Vec<CrawlRecord>> {
        let ids = self.tokens.record_ids_matching(term).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let by_id: HashMap<RecordId, CrawlRecord> = self
            .records
            .list_by_ids(&ids)
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }
}

// =============================================================================
// Test utilities
// =============================================================================
