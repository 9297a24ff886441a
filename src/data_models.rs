use std::time::Duration;

use mongodb::bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

pub type RecordId = ObjectId;
pub type TokenId = ObjectId;

/// One URL and the outcome of its latest crawl.
///
/// `last_tested == None` means the URL has never been crawled. `indexed` only
/// ever goes from `false` to `true`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CrawlRecord {
    #[serde(rename = "_id")]
    pub id: RecordId,

    pub url: String,
    pub success: bool,
    pub response_code: i32,
    pub crawl_duration_micros: i64,
    pub page_title: String,
    pub page_description: String,
    pub headings: String,
    pub last_tested: Option<DateTime>,
    pub indexed: bool,
    pub created_at: DateTime,
}

impl CrawlRecord {
    pub fn new(url: String) -> CrawlRecord {
        CrawlRecord {
            id: ObjectId::new(),
            url,
            success: false,
            response_code: 0,
            crawl_duration_micros: 0,
            page_title: "".to_string(),
            page_description: "".to_string(),
            headings: "".to_string(),
            last_tested: None,
            indexed: false,
            created_at: DateTime::now(),
        }
    }

    /// Copies the outcome of one crawl attempt onto the record.
    pub fn apply_crawl(
        &mut self,
        success: bool,
        response_code: i32,
        page: &ParsedPage,
        tested_at: DateTime,
    ) {
        self.success = success;
        self.response_code = response_code;
        self.crawl_duration_micros = i64::try_from(page.duration.as_micros()).unwrap_or(i64::MAX);
        self.page_title = page.title.clone();
        self.page_description = page.description.clone();
        self.headings = page.headings.clone();
        self.last_tested = Some(tested_at);
    }

    /// Text fed to the analyzer at index time: url, title, description, headings.
    pub fn indexable_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.url, self.page_title, self.page_description, self.headings
        )
    }
}

/// A normalized term as persisted in storage.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SearchToken {
    #[serde(rename = "_id")]
    pub id: TokenId,
    pub value: String,
}

/// Row of the token <-> record join relation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokenDocument {
    pub token_id: TokenId,
    pub record_id: RecordId,
}

/// Crawl settings owned by the admin surface; read-only here.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    pub batch_amount: i64,
    pub search_on: bool,
    pub add_new: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_amount: 10,
            search_on: true,
            add_new: true,
        }
    }
}

/// Structured data pulled out of one fetched page. Never persisted as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    pub title: String,
    pub description: String,
    pub headings: String,
    pub internal_links: Vec<String>,
    pub external_links: Vec<String>,
    pub duration: Duration,
}
