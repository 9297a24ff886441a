use anyhow::{Context, Result};
use dashmap::DashMap;
use futures::{StreamExt, stream};
use mongodb::bson::DateTime;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

use crate::config::CONFIG;
use crate::data_models::{CrawlRecord, ParsedPage};
use crate::extractor::extract;
use crate::fetcher::{FetchOutcome, Fetcher};
use crate::storage::Storage;

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Records fetched at once. 1 keeps the run strictly sequential.
    pub concurrency: usize,
    /// Simultaneous fetches allowed against one host.
    pub per_host: usize,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            per_host: 1,
        }
    }
}

impl CrawlOptions {
    pub fn from_config() -> Self {
        Self {
            concurrency: CONFIG.crawl_concurrency.max(1),
            per_host: CONFIG.per_host_limit.max(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlReport {
    /// Search was switched off; nothing was fetched or written.
    pub skipped: bool,
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub write_failures: usize,
    pub discovered: usize,
    pub inserted: usize,
}

struct RecordOutcome {
    success: bool,
    written: bool,
    page: Option<ParsedPage>,
}

/// Crawls batches of untested URLs and writes the results back.
///
/// A record is marked tested whether or not its crawl succeeded, and is never
/// selected again. Failed URLs stay failed until something resets
/// `last_tested`.
pub struct Crawler<S: Storage> {
    storage: Arc<S>,
    fetcher: Fetcher,
    options: CrawlOptions,
    host_permits: DashMap<String, Arc<Semaphore>>,
}

impl<S: Storage> Crawler<S> {
    pub fn new(storage: Arc<S>, fetcher: Fetcher, options: CrawlOptions) -> Crawler<S> {
        Crawler {
            storage,
            fetcher,
            options,
            host_permits: DashMap::new(),
        }
    }

    /// One crawl run. Errors only when settings or the batch cannot be read;
    /// per-URL and per-write failures are logged and counted.
    pub async fn run_crawl(&self) -> Result<CrawlReport> {
        log::info!("started crawl run");

        let settings = self
            .storage
            .get_settings()
            .await
            .context("failed to read search settings")?;
        if !settings.search_on {
            log::info!("search is turned off, nothing to crawl");
            return Ok(CrawlReport {
                skipped: true,
                ..CrawlReport::default()
            });
        }

        if settings.batch_amount <= 0 {
            log::info!("batch amount is {}, nothing to crawl", settings.batch_amount);
            return Ok(CrawlReport::default());
        }

        let batch = self
            .storage
            .get_untested(settings.batch_amount)
            .await
            .context("failed to load untested urls")?;
        // one timestamp for the whole run
        let tested_at = DateTime::now();

        let mut report = CrawlReport {
            selected: batch.len(),
            ..CrawlReport::default()
        };
        log::info!("crawling {} untested urls", batch.len());

        let outcomes: Vec<RecordOutcome> = stream::iter(batch)
            .map(|record| self.crawl_record(record, tested_at))
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        let mut candidates = BTreeSet::new();
        for outcome in outcomes {
            if outcome.success {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
            if !outcome.written {
                report.write_failures += 1;
            }
            if let Some(page) = outcome.page {
                candidates.extend(page.internal_links);
                candidates.extend(page.external_links);
            }
        }
        report.discovered = candidates.len();

        if !settings.add_new {
            log::info!(
                "adding new urls is disabled, discarding {} discovered urls",
                candidates.len()
            );
        } else {
            for url in &candidates {
                match self.storage.insert_if_absent(url).await {
                    Ok(true) => report.inserted += 1,
                    Ok(false) => {}
                    Err(e) => log::error!("error adding new url {url}, error: {:#}", e),
                }
            }
        }

        log::info!(
            "crawl run finished: {} selected, {} succeeded, {} failed, {} write failures, {} new urls",
            report.selected,
            report.succeeded,
            report.failed,
            report.write_failures,
            report.inserted
        );
        Ok(report)
    }

    async fn crawl_record(&self, mut record: CrawlRecord, tested_at: DateTime) -> RecordOutcome {
        log::info!("crawling url: {}", record.url);
        let (success, response_code, page) = self.visit(&record.url).await;
        record.apply_crawl(success, response_code, &page, tested_at);

        let written = match self.storage.update_result(&record).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("error saving crawl result for {}, error: {:#}", record.url, e);
                false
            }
        };

        RecordOutcome {
            success,
            written,
            page: success.then_some(page),
        }
    }

    /// Fetches and, for HTML, extracts one URL: `(success, response_code, page)`.
    pub async fn visit(&self, url: &str) -> (bool, i32, ParsedPage) {
        let permit = self.acquire_host(url).await;
        let outcome = self.fetcher.fetch(url).await;
        drop(permit);

        match outcome {
            FetchOutcome::Html {
                response_code,
                body,
            } => match extract(&body, url) {
                Ok(page) => (true, response_code, page),
                Err(e) => {
                    log::warn!("error parsing html {url}, error: {:#}", e);
                    (false, response_code, ParsedPage::default())
                }
            },
            // fetched fine, just nothing to extract
            FetchOutcome::NonHtml { response_code, .. } => {
                (true, response_code, ParsedPage::default())
            }
            FetchOutcome::HttpStatus { response_code }
            | FetchOutcome::Failed { response_code, .. } => {
                (false, response_code, ParsedPage::default())
            }
        }
    }

    async fn acquire_host(&self, url: &str) -> Option<OwnedSemaphorePermit> {
        let host = Url::parse(url).ok()?.host_str()?.to_string();
        let semaphore = self
            .host_permits
            .entry(host)
            .or_insert_with(|| Arc::new(Semaphore::new(self.options.per_host.max(1))))
            .clone();
        semaphore.acquire_owned().await.ok()
    }
}
