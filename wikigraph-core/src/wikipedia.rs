//! Wikipedia producer: related titles and summaries for a topic
//!
//! Provides a `TopicSource` trait with one implementation:
//! - **WikipediaClient**: MediaWiki Action API (`prop=links`, `prop=extracts`)
//!
//! Transient failures (transport errors, HTTP 429/5xx) are retried with
//! exponential backoff; a missing article is reported immediately.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::WikipediaConfig;
use crate::error::GraphError;

/// Upper bound on `plcontinue` pages followed for a single article.
const MAX_CONTINUATIONS: usize = 50;

// ============================================================================
// TopicSource trait
// ============================================================================

/// Producer of related titles for a central topic.
#[async_trait]
pub trait TopicSource: Send + Sync {
    /// Titles of the articles linked from `title`, in API order.
    async fn related_titles(&self, title: &str) -> Result<Vec<String>, GraphError>;

    /// Plain-text introduction of the article `title`.
    async fn summary(&self, title: &str) -> Result<String, GraphError>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum WikipediaError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("MediaWiki error {code}: {info}")]
    MediaWiki { code: String, info: String },

    #[error("Article '{title}' not found")]
    ArticleNotFound { title: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Wikipedia request failed after {attempts} attempts: {last}")]
    RetryExhausted { attempts: usize, last: String },
}

impl WikipediaError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            WikipediaError::Http(_) => true,
            WikipediaError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

// ============================================================================
// MediaWiki API structs (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    query: Option<QueryBody>,
    #[serde(rename = "continue", default)]
    continuation: Option<Continuation>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    links: Vec<PageLink>,
    #[serde(default)]
    extract: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageLink {
    title: String,
}

#[derive(Debug, Deserialize)]
struct Continuation {
    plcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    info: String,
}

// ============================================================================
// WikipediaClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct WikipediaClient {
    client: Client,
    config: WikipediaConfig,
}

impl WikipediaClient {
    pub fn new(config: WikipediaConfig) -> Result<Self, WikipediaError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a client against a custom API endpoint (for testing / mirrors)
    pub fn with_api_url(
        mut config: WikipediaConfig,
        api_url: impl Into<String>,
    ) -> Result<Self, WikipediaError> {
        config.api_url = api_url.into();
        Self::new(config)
    }

    /// All namespace-0 links of `title`, following continuation pages.
    pub async fn fetch_links(&self, title: &str) -> Result<Vec<String>, WikipediaError> {
        let mut titles = Vec::new();
        let mut cont: Option<String> = None;

        for _ in 0..MAX_CONTINUATIONS {
            let mut params = vec![
                ("prop", "links".to_string()),
                ("titles", title.to_string()),
                ("plnamespace", "0".to_string()),
                ("pllimit", "max".to_string()),
            ];
            if let Some(token) = &cont {
                params.push(("plcontinue", token.clone()));
            }

            let response = self.query(&params).await?;
            let page = first_page(title, response.query)?;
            titles.extend(page.links.into_iter().map(|l| l.title));

            cont = response.continuation.and_then(|c| c.plcontinue);
            if cont.is_none() {
                tracing::debug!(title, links = titles.len(), "Fetched Wikipedia links");
                return Ok(titles);
            }
        }

        tracing::warn!(
            title,
            links = titles.len(),
            "Stopped following link continuation after {} pages",
            MAX_CONTINUATIONS
        );
        Ok(titles)
    }

    /// Plain-text intro extract of `title`; empty when the page has none.
    pub async fn fetch_summary(&self, title: &str) -> Result<String, WikipediaError> {
        let params = vec![
            ("prop", "extracts".to_string()),
            ("titles", title.to_string()),
            ("exintro", "1".to_string()),
            ("explaintext", "1".to_string()),
        ];
        let response = self.query(&params).await?;
        let page = first_page(title, response.query)?;
        Ok(page.extract.unwrap_or_default().trim().to_string())
    }

    async fn query(&self, params: &[(&str, String)]) -> Result<QueryResponse, WikipediaError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.config.max_retries);

        let result = RetryIf::spawn(
            retry_strategy,
            || self.query_once(params),
            |e: &WikipediaError| e.is_transient(),
        )
        .await;

        match result {
            Ok(response) => Ok(response),
            Err(e) if e.is_transient() => {
                // The first request plus one per retry
                let attempts = self.config.max_retries + 1;
                tracing::error!(
                    attempts,
                    error = %e,
                    "All Wikipedia retry attempts failed"
                );
                Err(WikipediaError::RetryExhausted {
                    attempts,
                    last: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn query_once(&self, params: &[(&str, String)]) -> Result<QueryResponse, WikipediaError> {
        let response = self
            .client
            .get(&self.config.api_url)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("redirects", "1"),
            ])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(code = status.as_u16(), "Wikipedia API returned error status");
            return Err(WikipediaError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let body: QueryResponse = response.json().await?;
        if let Some(err) = body.error {
            return Err(WikipediaError::MediaWiki {
                code: err.code,
                info: err.info,
            });
        }
        Ok(body)
    }
}

fn first_page(title: &str, query: Option<QueryBody>) -> Result<Page, WikipediaError> {
    let page = query
        .and_then(|q| q.pages.into_iter().next())
        .ok_or_else(|| WikipediaError::InvalidResponse("no pages in query result".to_string()))?;

    if page.missing || page.invalid {
        return Err(WikipediaError::ArticleNotFound {
            title: title.to_string(),
        });
    }
    if page.title != title {
        tracing::debug!(requested = title, resolved = %page.title, "Title normalized by Wikipedia");
    }
    Ok(page)
}

#[async_trait]
impl TopicSource for WikipediaClient {
    async fn related_titles(&self, title: &str) -> Result<Vec<String>, GraphError> {
        Ok(self.fetch_links(title).await?)
    }

    async fn summary(&self, title: &str) -> Result<String, GraphError> {
        Ok(self.fetch_summary(title).await?)
    }

    fn name(&self) -> &str {
        "wikipedia"
    }
}

// ============================================================================
// TESTS
// ============================================================================
