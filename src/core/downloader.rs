//! HTTP and file access for butterfly-tags
//!
//! Fetches tag catalogues from a local directory or an HTTP base URL and
//! submits Overpass QL queries. All requests share one pooled client.

use std::time::Duration;

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder, StatusCode};

use crate::core::error::{Error, Result};
use crate::core::index::Language;
use crate::core::query::GENERIC_QUERY_TIMEOUT;
use crate::core::source::{resolve_source, Dataset, SourceConfig, TagSource};

/// Maximum number of retry attempts for network errors
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Extra client-side time granted on top of the Overpass server timeout
const OVERPASS_GRACE_SECS: u64 = 30;

/// Global HTTP client with optimizations
static GLOBAL_CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .tcp_keepalive(Duration::from_secs(60))
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(Duration::from_secs(30)) // Catalogue request timeout
        .connect_timeout(Duration::from_secs(10))
        .user_agent(format!("butterfly-tags/{}", env!("BUTTERFLY_VERSION")))
        .build()
        .expect("Failed to create HTTP client")
});

/// Execute an operation with retry logic for network errors.
///
/// Up to three retries, waiting 1s, 2s then 4s. Any other error is
/// returned immediately.
pub async fn retry_on_network_error<F, Fut, T>(operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(Error::NetworkError(msg)) if attempt < MAX_RETRY_ATTEMPTS => {
                attempt += 1;
                let delay = BASE_RETRY_DELAY_MS * (1 << (attempt - 1));
                warn!("⚠️  Network error (attempt {attempt}): {msg}. Retrying in {delay}ms...");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Map a non-success status to an error naming what was requested
fn create_helpful_http_error(url: &str, status: StatusCode) -> Error {
    match status {
        StatusCode::NOT_FOUND => {
            let name = url.rsplit('/').next().filter(|name| !name.is_empty()).unwrap_or(url);
            Error::SourceNotFound(name.to_string())
        }
        StatusCode::GATEWAY_TIMEOUT => Error::HttpError(format!(
            "Overpass server overloaded ({status}) at {url}. Try again later or narrow the bounding box"
        )),
        StatusCode::TOO_MANY_REQUESTS => Error::HttpError(format!(
            "Rate limited by {url} ({status}). Wait before sending more queries"
        )),
        _ => Error::HttpError(format!("Request to {url} failed: {status}")),
    }
}

/// Catalogue and Overpass access for one configuration
#[derive(Debug, Clone)]
pub struct Downloader {
    config: SourceConfig,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader {
    /// Create a new downloader with default configuration
    pub fn new() -> Self {
        Self {
            config: SourceConfig::default(),
        }
    }

    /// Create a new downloader with custom configuration
    pub fn with_config(config: SourceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Read the CSV text of a catalogue
    pub async fn fetch_catalogue(&self, language: Language, dataset: Dataset) -> Result<String> {
        let source = resolve_source(language, dataset, &self.config);
        info!("📥 Loading {language} tag catalogue from {source}");
        fetch_text(&source).await
    }

    /// Submit an Overpass QL query and return the raw XML response
    pub async fn post_query(&self, query: &str) -> Result<String> {
        post_query(&self.config.overpass_url, query).await
    }
}

/// Read a source as text, retrying HTTP fetches on network errors
pub async fn fetch_text(source: &TagSource) -> Result<String> {
    match source {
        TagSource::File { path } => match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::SourceNotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        },
        TagSource::Http { url } => {
            let client = &*GLOBAL_CLIENT;
            retry_on_network_error(|| async {
                let response = client.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(create_helpful_http_error(url, status));
                }
                let text = response.text().await?;
                debug!("Fetched {} bytes from {url}", text.len());
                Ok(text)
            })
            .await
        }
    }
}

/// POST `query` as `text/plain` to an Overpass endpoint
pub async fn post_query(endpoint: &str, query: &str) -> Result<String> {
    let client = &*GLOBAL_CLIENT;
    debug!("🌐 POST {endpoint} ({} bytes)", query.len());

    let response = client
        .post(endpoint)
        .header(reqwest::header::CONTENT_TYPE, "text/plain")
        .timeout(Duration::from_secs(u64::from(GENERIC_QUERY_TIMEOUT) + OVERPASS_GRACE_SECS))
        .body(query.to_string())
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(create_helpful_http_error(endpoint, status));
    }

    Ok(response.text().await?)
}
