use crate::feed::icon::resolve_icon;
use crate::feed::parser::parse_document;
use crate::markup::MarkupError;
use crate::model::{FeedDraft, ParsedFeed, RefreshRequest};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Default cap on a fetched body.
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Transport-level failures of a [`Fetcher`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("Response too large")]
    ResponseTooLarge,
    #[error("Empty response")]
    Empty,
}

/// Why one feed refresh failed. Each variant carries a human-readable message
/// that ends up as the feed's error text.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Download failed: {0}")]
    Download(#[from] FetchError),
    /// The declared codeset is unknown or the body is not valid in it.
    #[error("Could not convert from {0}")]
    Transcode(String),
    /// Unrecognized root element, or RSS 1.0.
    #[error("{0}")]
    UnsupportedFormat(String),
    #[error("Malformed feed: {0}")]
    MalformedMarkup(String),
    /// The refresh task died before producing a result.
    #[error("Refresh aborted: {0}")]
    Aborted(String),
}

impl From<MarkupError> for RefreshError {
    fn from(e: MarkupError) -> Self {
        match e {
            MarkupError::Rejected(msg) => RefreshError::UnsupportedFormat(msg),
            other => RefreshError::MalformedMarkup(other.to_string()),
        }
    }
}

/// Byte-fetch primitive used by refreshes and icon lookups.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url`, giving up after `timeout`.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

/// [`Fetcher`] over a shared `reqwest` client with a body size cap.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, max_bytes: usize) -> Self {
        Self { client, max_bytes }
    }

    async fn get_body(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }
        read_limited_bytes(response, self.max_bytes).await
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        // The whole exchange, body included, shares one deadline.
        let bytes = tokio::time::timeout(timeout, self.get_body(url))
            .await
            .map_err(|_| FetchError::Timeout)??;

        if bytes.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(bytes)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

/// Turns a fetched body into text.
///
/// With no declared codeset the body must be UTF-8 (a BOM is dropped).
/// Otherwise it is transcoded from the named encoding.
pub fn decode_body(bytes: &[u8], codeset: Option<&str>) -> Result<String, RefreshError> {
    let Some(label) = codeset.filter(|c| !c.is_empty()) else {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        return String::from_utf8(bytes.to_vec())
            .map_err(|e| RefreshError::MalformedMarkup(e.to_string()));
    };

    let encoding = encoding_rs::Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| RefreshError::Transcode(label.to_owned()))?;
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(RefreshError::Transcode(label.to_owned()));
    }
    Ok(text.into_owned())
}

/// Knobs shared by every refresh a registry starts.
#[derive(Debug, Clone, Copy)]
pub struct RefreshOptions {
    pub timeout: Duration,
    /// Edge length, in pixels, of cached feed icons.
    pub icon_size: u32,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            icon_size: 16,
        }
    }
}

/// One background refresh: fetch, decode, parse, then resolve the icon if
/// none is cached yet.
///
/// Touches no shared state; the caller applies the result.
pub async fn load_feed(
    fetcher: &dyn Fetcher,
    request: &RefreshRequest,
    options: RefreshOptions,
) -> Result<ParsedFeed, RefreshError> {
    let bytes = fetcher.fetch(&request.url, options.timeout).await?;
    let text = decode_body(&bytes, request.codeset.as_deref())?;

    let mut draft = FeedDraft::new(&request.read_ids);
    parse_document(&text, &mut draft)?;
    let mut parsed = draft.finish();

    tracing::debug!(
        feed = %request.url,
        items = parsed.items.len(),
        "Feed parsed"
    );

    if request.want_icon {
        // The icon is found through the site link, so it waits for the parse.
        let link = if parsed.meta.link.is_empty() {
            request.link.as_str()
        } else {
            parsed.meta.link.as_str()
        };
        parsed.icon = resolve_icon(fetcher, link, options).await;
    }

    Ok(parsed)
}
