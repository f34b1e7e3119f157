use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect, Client, Response, StatusCode};
use url::Url;
use webclick_logging::webclick_trace;

pub const DEFAULT_USER_AGENT: &str = concat!("webclick/", env!("CARGO_PKG_VERSION"));

/// Media types that are parsed for links.
const MARKUP_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    /// Budget for the whole fetch, redirects and body included.
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Markup of one page and where it actually came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    pub original_url: String,
    pub final_url: String,
    pub redirect_count: usize,
    pub content_type: Option<String>,
    pub byte_len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn too_large(max_bytes: u64, actual: u64) -> Self {
        Self::new(
            FailureKind::TooLarge {
                max_bytes,
                actual: Some(actual),
            },
            "response too large",
        )
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else {
            FailureKind::Network
        };
        Self::new(kind, err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureKind {
    #[error("invalid url")]
    InvalidUrl,
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("timeout")]
    Timeout,
    #[error("too many redirects")]
    RedirectLimitExceeded,
    #[error("body larger than {max_bytes} bytes")]
    TooLarge { max_bytes: u64, actual: Option<u64> },
    #[error("unsupported content type {content_type}")]
    UnsupportedContentType { content_type: String },
    #[error("network error")]
    Network,
}

impl FailureKind {
    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FailureKind::Timeout | FailureKind::Network => true,
            FailureKind::HttpStatus(code) => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// Retrieves the raw markup of one page.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError>;
}

/// HTTP fetcher over one pooled client. Redirects are followed here rather
/// than inside reqwest so that every hop is counted.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
    settings: FetchSettings,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .user_agent(settings.user_agent.clone())
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    async fn fetch_within_budget(&self, url: &str) -> Result<FetchOutput, FetchError> {
        let start = Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let (response, redirect_count) = self.follow_redirects(start).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if let Some(declared) = content_type.as_deref() {
            if !is_markup(declared) {
                return Err(FetchError::new(
                    FailureKind::UnsupportedContentType {
                        content_type: declared.to_string(),
                    },
                    "not an html document",
                ));
            }
        }

        let final_url = response.url().to_string();
        let bytes = read_capped(response, self.settings.max_bytes).await?;
        Ok(FetchOutput {
            metadata: FetchMetadata {
                original_url: url.to_string(),
                final_url,
                redirect_count,
                content_type,
                byte_len: bytes.len() as u64,
            },
            bytes,
        })
    }

    async fn follow_redirects(&self, mut current: Url) -> Result<(Response, usize), FetchError> {
        let mut hops = 0;
        loop {
            let response = self.client.get(current.clone()).send().await?;
            let Some(target) = redirect_target(&response) else {
                return Ok((response, hops));
            };
            if hops == self.settings.redirect_limit {
                return Err(FetchError::new(
                    FailureKind::RedirectLimitExceeded,
                    format!("more than {hops} redirects"),
                ));
            }
            let next = current
                .join(target)
                .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
            webclick_trace!("{current} redirects to {next}");
            current = next;
            hops += 1;
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        let budget = self.settings.request_timeout;
        let output = tokio::time::timeout(budget, self.fetch_within_budget(url))
            .await
            .map_err(|_| FetchError::new(FailureKind::Timeout, format!("no answer within {budget:?}")))??;
        webclick_trace!(
            "fetched {} ({} bytes, {} redirects)",
            output.metadata.final_url,
            output.metadata.byte_len,
            output.metadata.redirect_count
        );
        Ok(output)
    }
}

fn redirect_target(response: &Response) -> Option<&str> {
    let status = response.status();
    if !status.is_redirection() || status == StatusCode::NOT_MODIFIED {
        return None;
    }
    response.headers().get(LOCATION)?.to_str().ok()
}

fn is_markup(content_type: &str) -> bool {
    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    MARKUP_TYPES
        .iter()
        .any(|markup| markup.eq_ignore_ascii_case(media_type))
}

async fn read_capped(response: Response, max_bytes: u64) -> Result<Vec<u8>, FetchError> {
    if let Some(declared) = response.content_length() {
        if declared > max_bytes {
            return Err(FetchError::too_large(max_bytes, declared));
        }
    }
    let mut body = Vec::new();
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        let received = (body.len() + chunk.len()) as u64;
        if received > max_bytes {
            return Err(FetchError::too_large(max_bytes, received));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::is_markup;

    #[test]
    fn markup_detection_ignores_parameters_and_case() {
        assert!(is_markup("text/html; charset=utf-8"));
        assert!(is_markup("Application/XHTML+XML"));
        assert!(!is_markup("application/json"));
        assert!(!is_markup(""));
    }
}
