use std::sync::Arc;

use url::Url;
use webclick_core::{normalize_url, ChildLink, UrlError};
use webclick_logging::{webclick_debug, webclick_warn};

use crate::decode::decode_html;
use crate::fetch::{FailureKind, FetchError, Fetcher};
use crate::links::{extract_links, LinkFilter};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Url(#[from] UrlError),
    #[error("could not fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("{url} is not renderable markup: {reason}")]
    Parse { url: String, reason: String },
}

/// Produces exactly one level of outbound links for a page.
#[async_trait::async_trait]
pub trait LinkResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<Vec<ChildLink>, ResolveError>;
}

/// Fetches the page over HTTP and extracts its anchors.
pub struct HttpLinkResolver {
    fetcher: Arc<dyn Fetcher>,
    filter: LinkFilter,
}

impl HttpLinkResolver {
    pub fn new(fetcher: Arc<dyn Fetcher>, filter: LinkFilter) -> Self {
        Self { fetcher, filter }
    }
}

#[async_trait::async_trait]
impl LinkResolver for HttpLinkResolver {
    async fn resolve(&self, url: &str) -> Result<Vec<ChildLink>, ResolveError> {
        let requested = normalize_url(url)?;
        let output = self.fetcher.fetch(&requested).await.map_err(|source| {
            if let FailureKind::UnsupportedContentType { content_type } = &source.kind {
                ResolveError::Parse {
                    url: requested.clone(),
                    reason: format!("content type {content_type}"),
                }
            } else {
                if source.kind.is_transient() {
                    webclick_warn!("{requested}: {source}; expanding again may succeed");
                } else {
                    webclick_debug!("{requested}: {source}");
                }
                ResolveError::Fetch {
                    url: requested.clone(),
                    source,
                }
            }
        })?;

        let decoded = decode_html(&output.bytes, output.metadata.content_type.as_deref());
        if decoded.had_errors {
            webclick_debug!(
                "{requested}: malformed {} sequences replaced",
                decoded.encoding_label
            );
        }
        if !decoded.html.contains('<') {
            return Err(ResolveError::Parse {
                url: requested,
                reason: "no markup in response body".to_string(),
            });
        }

        // Links are relative to where the redirects ended.
        let page_url = Url::parse(&output.metadata.final_url).map_err(|err| ResolveError::Parse {
            url: requested.clone(),
            reason: err.to_string(),
        })?;
        let mut links = extract_links(&decoded.html, &page_url, &self.filter);
        links.retain(|link| link.url != requested);

        webclick_debug!(
            "resolved {} links on {} (final {})",
            links.len(),
            requested,
            page_url
        );
        Ok(links)
    }
}
