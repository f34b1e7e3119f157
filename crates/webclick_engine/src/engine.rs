use std::sync::Arc;

use webclick_core::{ChildLink, JobId, LinkTree, NodeId};

use crate::cache::DiscoveryCache;
use crate::config::EngineConfig;
use crate::explore::{self, ExpandError};
use crate::fetch::{FetchError, ReqwestFetcher};
use crate::jobs::{JobError, JobManager};
use crate::package::Packager;
use crate::render::{ChromeRenderer, PageRenderer};
use crate::resolve::{HttpLinkResolver, LinkResolver, ResolveError};

/// Discovery and archiving behind one cheaply clonable handle.
#[derive(Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    cache: Arc<DiscoveryCache>,
    jobs: JobManager,
}

impl Engine {
    /// Production wiring: reqwest for discovery, headless Chrome for capture.
    /// The browser is only launched by the first capture.
    pub fn new(config: EngineConfig) -> Result<Self, FetchError> {
        let fetcher = Arc::new(ReqwestFetcher::new(config.fetch_settings())?);
        let resolver = Arc::new(HttpLinkResolver::new(fetcher, config.link_filter()));
        let renderer = Arc::new(ChromeRenderer::new(config.render_settings()));
        Ok(Self::with_parts(config, resolver, renderer))
    }

    pub fn with_parts(
        config: EngineConfig,
        resolver: Arc<dyn LinkResolver>,
        renderer: Arc<dyn PageRenderer>,
    ) -> Self {
        let packager = Packager::new(config.output_dir.clone());
        let jobs = JobManager::new(renderer, packager, config.job_settings());
        Self {
            config: Arc::new(config),
            cache: Arc::new(DiscoveryCache::new(resolver)),
            jobs,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &DiscoveryCache {
        &self.cache
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    /// Children of one page, served from the cache when already known.
    pub async fn resolve_links(&self, url: &str) -> Result<Vec<ChildLink>, ResolveError> {
        let entry = self.cache.get_or_resolve(url).await?;
        Ok(entry.links.clone())
    }

    pub async fn expand(&self, tree: &mut LinkTree, node: NodeId) -> Result<usize, ExpandError> {
        explore::expand(tree, node, &self.cache).await
    }

    /// Starts over for a new root scrape.
    pub fn clear_discovery(&self) {
        self.cache.clear();
    }

    pub fn submit_archive(&self, root_url: &str, urls: &[String]) -> Result<JobId, JobError> {
        self.jobs.submit(root_url, urls)
    }

    pub async fn shutdown(&self) {
        self.jobs.shutdown().await;
    }
}
