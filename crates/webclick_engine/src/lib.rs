//! WebClick engine: fetching and link discovery, the discovery cache, page
//! rendering through headless Chrome, packaging, and the archive job manager.
mod browser;
mod cache;
mod config;
mod decode;
mod engine;
mod explore;
mod fetch;
mod filename;
mod jobs;
mod links;
mod package;
mod persist;
mod render;
mod resolve;

pub use browser::{find_browser_executable, BrowserHandle, IsolatedPage, CHROMIUM_PATH_ENV};
pub use cache::{CacheEntry, DiscoveryCache};
pub use config::{DiscoveryConfig, EngineConfig, FetchConfig, JobsConfig, RenderConfig};
pub use decode::{decode_html, DecodedHtml};
pub use engine::Engine;
pub use explore::{collapse, expand, ExpandError};
pub use fetch::{
    FailureKind, FetchError, FetchMetadata, FetchOutput, FetchSettings, Fetcher, ReqwestFetcher,
    DEFAULT_USER_AGENT,
};
pub use filename::{short_url, ArtifactNamer};
pub use jobs::{JobError, JobManager, JobSettings};
pub use links::{extract_links, LinkFilter};
pub use package::{
    archive_file_name, manifest_file_name, FailedPage, PackageError, Packager,
};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use render::{
    check_capturable, consent_candidates, BannerOutcome, Capture, CaptureFormat, ChromeRenderer,
    PageRenderer, RenderError, RenderSettings, ScrollOutcome, CONSENT_PHRASES,
    DEFAULT_CONSENT_SELECTORS,
};
pub use resolve::{HttpLinkResolver, LinkResolver, ResolveError};
