use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fetch::{FetchSettings, DEFAULT_USER_AGENT};
use crate::jobs::JobSettings;
use crate::links::LinkFilter;
use crate::render::{CaptureFormat, RenderSettings};

/// Everything the engine can be tuned with. Every field has a default, so a
/// partial config file only names what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub output_dir: PathBuf,
    pub fetch: FetchConfig,
    pub discovery: DiscoveryConfig,
    pub render: RenderConfig,
    pub jobs: JobsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::default_with_output(PathBuf::from("output"))
    }
}

impl EngineConfig {
    pub fn default_with_output(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            fetch: FetchConfig::default(),
            discovery: DiscoveryConfig::default(),
            render: RenderConfig::default(),
            jobs: JobsConfig::default(),
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_millis(self.fetch.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.fetch.request_timeout_ms),
            redirect_limit: self.fetch.redirect_limit,
            max_bytes: self.fetch.max_bytes,
            user_agent: self.fetch.user_agent.clone(),
        }
    }

    pub fn link_filter(&self) -> LinkFilter {
        LinkFilter {
            max_links: self.discovery.max_links_per_page,
            same_host_only: self.discovery.same_host_only,
            skip_binary_links: self.discovery.skip_binary_links,
        }
    }

    pub fn render_settings(&self) -> RenderSettings {
        let render = &self.render;
        RenderSettings {
            navigation_timeout: Duration::from_millis(render.navigation_timeout_ms),
            network_quiet: Duration::from_millis(render.network_quiet_ms),
            render_timeout: Duration::from_millis(render.render_timeout_ms),
            settle_delay: Duration::from_millis(render.settle_delay_ms),
            scroll_pause: Duration::from_millis(render.scroll_pause_ms),
            max_scroll_rounds: render.max_scroll_rounds,
            viewport: (render.viewport_width, render.viewport_height),
            format: render.format,
            consent_selectors: render.consent_selectors.clone(),
            hide_sticky_elements: render.hide_sticky_elements,
            expand_collapsibles: render.expand_collapsibles,
            chrome_executable: render.chrome_executable.clone(),
        }
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            workers: self.jobs.workers.max(1),
            max_retries: self.jobs.max_retries,
            retry_backoff: Duration::from_millis(self.jobs.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub max_links_per_page: usize,
    pub same_host_only: bool,
    pub skip_binary_links: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let filter = LinkFilter::default();
        Self {
            max_links_per_page: filter.max_links,
            same_host_only: filter.same_host_only,
            skip_binary_links: filter.skip_binary_links,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub navigation_timeout_ms: u64,
    pub network_quiet_ms: u64,
    pub render_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub scroll_pause_ms: u64,
    pub max_scroll_rounds: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub format: CaptureFormat,
    pub consent_selectors: Vec<String>,
    pub hide_sticky_elements: bool,
    pub expand_collapsibles: bool,
    pub chrome_executable: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 90_000,
            network_quiet_ms: 500,
            render_timeout_ms: 180_000,
            settle_delay_ms: 2_000,
            scroll_pause_ms: 250,
            max_scroll_rounds: 25,
            viewport_width: 1920,
            viewport_height: 1080,
            format: CaptureFormat::Png,
            consent_selectors: Vec::new(),
            hide_sticky_elements: false,
            expand_collapsibles: false,
            chrome_executable: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub workers: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            max_retries: 2,
            retry_backoff_ms: 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_runtime_settings() {
        let config = EngineConfig::default();
        assert_eq!(config.render_settings(), RenderSettings::default());
        assert_eq!(config.job_settings(), JobSettings::default());
        assert_eq!(config.link_filter(), LinkFilter::default());
        let fetch = config.fetch_settings();
        assert_eq!(fetch.request_timeout, FetchSettings::default().request_timeout);
        assert_eq!(fetch.max_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"render":{"format":"pdf"},"jobs":{"workers":0}}"#).unwrap();
        assert_eq!(config.render.format, CaptureFormat::Pdf);
        assert_eq!(config.render.viewport_width, 1920);
        assert_eq!(config.job_settings().workers, 1);
        assert_eq!(config.output_dir, PathBuf::from("output"));
    }
}
