use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::data_models::CrawlRecord;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub term: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<Vec<RecordResult>>,
}

impl SearchResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordResult {
    pub id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub headings: String,
    pub response_code: i32,
    pub last_tested: Option<String>,
}

impl From<CrawlRecord> for RecordResult {
    fn from(record: CrawlRecord) -> Self {
        Self {
            id: record.id.to_hex(),
            url: record.url,
            title: record.page_title,
            description: record.page_description,
            headings: record.headings,
            response_code: record.response_code,
            last_tested: record
                .last_tested
                .and_then(|t| DateTime::<Utc>::from_timestamp_millis(t.timestamp_millis()))
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson;

    #[test]
    fn test_record_result_from_crawl_record() {
        let mut record = CrawlRecord::new("https://a.org/".to_string());
        record.page_title = "Hello".to_string();
        record.response_code = 200;
        record.last_tested = Some(bson::DateTime::from_millis(1_700_000_000_123));

        let id = record.id.to_hex();
        let result = RecordResult::from(record);
        assert_eq!(result.id, id);
        assert_eq!(result.title, "Hello");
        assert_eq!(
            result.last_tested.as_deref(),
            Some("2023-11-14T22:13:20.123Z")
        );
    }

    #[test]
    fn test_untested_record_has_no_timestamp() {
        let result = RecordResult::from(CrawlRecord::new("https://a.org/".to_string()));
        assert!(result.last_tested.is_none());
    }
}
