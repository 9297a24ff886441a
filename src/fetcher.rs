use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::config::CONFIG;

/// What happened when a URL was requested. Fetching never fails with an
/// error; every outcome is one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// No usable response: connect error, timeout, or the body could not be read.
    /// `response_code` is 0 unless a status line had already arrived.
    Failed { response_code: i32, error: String },
    /// Any status other than 200. The body is not read.
    HttpStatus { response_code: i32 },
    /// 200 with a content type other than `text/html`.
    NonHtml {
        response_code: i32,
        content_type: String,
    },
    Html { response_code: i32, body: String },
}

impl FetchOutcome {
    pub fn response_code(&self) -> i32 {
        match self {
            FetchOutcome::Failed { response_code, .. }
            | FetchOutcome::HttpStatus { response_code }
            | FetchOutcome::NonHtml { response_code, .. }
            | FetchOutcome::Html { response_code, .. } => *response_code,
        }
    }
}

pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    pub fn from_config() -> Result<Self> {
        Self::new(CONFIG.fetch_timeout, &CONFIG.user_agent)
    }

    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let res = match self.client.get(url).send().await {
            Ok(res) => res,
            Err(e) => {
                log::warn!("error fetching page {url}, error: {:#}", e);
                return FetchOutcome::Failed {
                    response_code: 0,
                    error: e.to_string(),
                };
            }
        };

        let status = res.status();
        let response_code = i32::from(status.as_u16());
        if status != StatusCode::OK {
            log::info!("{url} answered with status {status}");
            return FetchOutcome::HttpStatus { response_code };
        }

        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.to_ascii_lowercase().starts_with("text/html") {
            log::info!("{url} is not html ({content_type:?}), skipping extraction");
            return FetchOutcome::NonHtml {
                response_code,
                content_type,
            };
        }

        match res.text().await {
            Ok(body) => FetchOutcome::Html {
                response_code,
                body,
            },
            Err(e) => {
                log::warn!("error reading body of {url}, error: {:#}", e);
                FetchOutcome::Failed {
                    response_code,
                    error: e.to_string(),
                }
            }
        }
    }
}
