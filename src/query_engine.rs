use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;

use crate::analyzer::TextAnalyzer;
use crate::data_models::{CrawlRecord, RecordId};
use crate::storage::Storage;

/// Concatenates result lists, keeping the first occurrence of each record id.
pub fn union_by_id<I>(lists: I) -> Vec<CrawlRecord>
where
    I: IntoIterator<Item = Vec<CrawlRecord>>,
{
    let mut seen: HashSet<RecordId> = HashSet::new();
    let mut out = Vec::new();
    for list in lists {
        for record in list {
            if seen.insert(record.id) {
                out.push(record);
            }
        }
    }
    out
}

pub struct QueryEngine<S: Storage> {
    storage: Arc<S>,
    analyzer: Arc<TextAnalyzer>,
}

impl<S: Storage> QueryEngine<S> {
    pub fn new(storage: Arc<S>, analyzer: Arc<TextAnalyzer>) -> Self {
        Self { storage, analyzer }
    }

    pub fn analyzer(&self) -> &TextAnalyzer {
        &self.analyzer
    }

    /// Records matching any query term. A term matches every stored token
    /// that contains it, so "hel" finds pages indexed under "hello".
    ///
    /// Results are unranked and unique by record id. No match is an empty
    /// list, not an error.
    pub async fn search(&self, query: &str) -> Result<Vec<CrawlRecord>> {
        // Analyze the query text using the same pipeline as documents
        let mut terms = self.analyzer.terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut seen_terms = HashSet::new();
        terms.retain(|t| seen_terms.insert(t.clone()));

        let mut per_term = Vec::with_capacity(terms.len());
        for term in &terms {
            let hits = self.storage.query_tokens_by_substring(term).await?;
            log::debug!("query term {term:?} matched {} records", hits.len());
            per_term.push(hits);
        }
        Ok(union_by_id(per_term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str) -> CrawlRecord {
        CrawlRecord::new(url.to_string())
    }

    #[test]
    fn test_union_by_id_keeps_first_occurrence() {
        let a = record("https://a.com/");
        let b = record("https://b.com/");
        let c = record("https://c.com/");
        let got = union_by_id(vec![
            vec![a.clone(), b.clone(), a.clone()],
            vec![c.clone(), b.clone()],
        ]);
        let urls: Vec<&str> = got.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com/", "https://b.com/", "https://c.com/"]);
    }

    #[test]
    fn test_union_by_id_empty() {
        assert!(union_by_id(Vec::<Vec<CrawlRecord>>::new()).is_empty());
        assert!(union_by_id(vec![vec![], vec![]]).is_empty());
    }
}
