use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::analyzer::TextAnalyzer;
use crate::data_models::{CrawlRecord, RecordId};
use crate::storage::Storage;

/// In-memory postings for one index run: term -> record ids in the order
/// they were seen.
///
/// A record id is skipped only when it equals the last id already in that
/// term's list. Indexing [A, A] gives [A]; indexing [A, B, A] gives [A, B, A].
/// Storage associations are idempotent, so the leftover repeats are harmless.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Postings {
    lists: BTreeMap<String, Vec<RecordId>>,
}

impl Postings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, term: &str, id: RecordId) {
        let postings = self.lists.entry(term.to_string()).or_default();
        if postings.last() == Some(&id) {
            return;
        }
        postings.push(id);
    }

    /// Runs the record's indexable text through `analyzer` and adds every term.
    /// Returns the number of terms produced.
    pub fn add_record(&mut self, analyzer: &TextAnalyzer, record: &CrawlRecord) -> usize {
        let tokens = analyzer.analyze(&record.indexable_text());
        for token in &tokens {
            self.add(&token.term, record.id);
        }
        tokens.len()
    }

    pub fn get(&self, term: &str) -> Option<&[RecordId]> {
        self.lists.get(term).map(|v| v.as_slice())
    }

    /// Terms in sorted order with their postings.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[RecordId])> {
        self.lists.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexReport {
    pub records: usize,
    pub terms: usize,
    pub postings: usize,
}

/// Turns crawled-but-unindexed records into stored tokens.
pub struct Indexer<S: Storage> {
    storage: Arc<S>,
    text_analyzer: Arc<TextAnalyzer>,
}

impl<S: Storage> Indexer<S> {
    pub fn new(storage: Arc<S>, text_analyzer: Arc<TextAnalyzer>) -> Self {
        Self {
            storage,
            text_analyzer,
        }
    }

    /// One index run: build postings for every tested, unindexed record,
    /// merge them into storage, then flag the records as indexed.
    ///
    /// If the merge fails the records stay unindexed and are picked up again
    /// by the next run.
    pub async fn run_index(&self) -> Result<IndexReport> {
        log::info!("started search indexing");

        let records = self
            .storage
            .get_tested_unindexed()
            .await
            .context("failed to load unindexed records")?;
        log::info!("{} records to index", records.len());
        if records.is_empty() {
            return Ok(IndexReport::default());
        }

        let postings = self.build(&records);
        let written = self.merge(&postings).await?;

        let ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();
        self.storage
            .set_indexed(&ids)
            .await
            .context("failed to mark records as indexed")?;

        let report = IndexReport {
            records: records.len(),
            terms: postings.len(),
            postings: written,
        };
        log::info!(
            "search indexing finished: {} records, {} terms, {} postings",
            report.records,
            report.terms,
            report.postings
        );
        Ok(report)
    }

    pub fn build(&self, records: &[CrawlRecord]) -> Postings {
        let mut postings = Postings::new();
        let mut total_tokens = 0;
        for record in records {
            total_tokens += postings.add_record(&self.text_analyzer, record);
        }
        log::debug!(
            "Extracted {} tokens ({} distinct) from {} records",
            total_tokens,
            postings.len(),
            records.len()
        );
        postings
    }

    /// Writes every term and its record associations. Returns the number of
    /// postings entries handed to storage.
    pub async fn merge(&self, postings: &Postings) -> Result<usize> {
        let mut written = 0;
        for (term, ids) in postings.iter() {
            let token_id = self
                .storage
                .find_or_create_token(term)
                .await
                .with_context(|| format!("failed to store token {term:?}"))?;
            self.storage
                .associate_documents(token_id, ids)
                .await
                .with_context(|| format!("failed to associate records with {term:?}"))?;
            written += ids.len();
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    #[test]
    fn test_adjacent_repeat_is_suppressed() {
        let a = ObjectId::new();
        let mut postings = Postings::new();
        postings.add("hello", a);
        postings.add("hello", a);
        assert_eq!(postings.get("hello"), Some(&[a][..]));
    }

    #[test]
    fn test_non_adjacent_repeat_is_kept() {
        let (a, b) = (ObjectId::new(), ObjectId::new());
        let mut postings = Postings::new();
        postings.add("hello", a);
        postings.add("hello", b);
        postings.add("hello", a);
        assert_eq!(postings.get("hello"), Some(&[a, b, a][..]));
    }

    #[test]
    fn test_terms_are_independent() {
        let (a, b) = (ObjectId::new(), ObjectId::new());
        let mut postings = Postings::new();
        postings.add("x", a);
        postings.add("y", a);
        postings.add("x", b);
        postings.add("y", a);
        assert_eq!(postings.get("x"), Some(&[a, b][..]));
        assert_eq!(postings.get("y"), Some(&[a][..]));
        assert_eq!(postings.iter().map(|(t, _)| t).collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn test_repeated_word_in_one_record() {
        let analyzer = TextAnalyzer::standard();
        let mut record = CrawlRecord::new("https://a.com/".to_string());
        record.page_title = "rust rust rust".to_string();
        let mut postings = Postings::new();
        // http, com, rust x3 ("a" is a stop word)
        assert_eq!(postings.add_record(&analyzer, &record), 5);
        assert_eq!(postings.get("rust"), Some(&[record.id][..]));
    }
}
