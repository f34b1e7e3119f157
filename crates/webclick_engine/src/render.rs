use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, PrintToPdfParams};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use webclick_core::{check_supported_scheme, is_web_url, normalize_url, UrlError};
use webclick_logging::{webclick_debug, webclick_info};

use crate::browser::{browser_error, BrowserHandle, LaunchSlot};

/// Selectors tried, in order, to get rid of consent and interstitial overlays.
pub const DEFAULT_CONSENT_SELECTORS: &[&str] = &[
    "#onetrust-reject-all-handler",
    "#onetrust-accept-btn-handler",
    "#CybotCookiebotDialogBodyButtonDecline",
    "#CybotCookiebotDialogBodyLevelButtonLevelOptinAllowAll",
    "button[data-testid=\"uc-deny-all-button\"]",
    "button[data-testid=\"uc-accept-all-button\"]",
    ".fc-cta-do-not-consent",
    ".fc-cta-consent",
    "button[id*=\"reject\"]",
    "button[class*=\"reject\"]",
    "button[id*=\"agree\"]",
    "button[class*=\"agree\"]",
    "button[class*=\"dismiss\"]",
    "button[class*=\"close\"]",
    ".cookie-consent button",
];

/// Phrases the text fallback looks for on buttons and links, lowercase.
pub const CONSENT_PHRASES: &[&str] = &[
    "reject all",
    "decline all",
    "only necessary",
    "necessary only",
    "accept all",
    "accept cookies",
    "i agree",
    "agree",
    "alle ablehnen",
    "ablehnen",
    "nur notwendige",
    "alle akzeptieren",
    "akzeptieren",
    "zustimmen",
    "einverstanden",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    #[default]
    Png,
    Pdf,
}

impl CaptureFormat {
    pub fn extension(self) -> &'static str {
        match self {
            CaptureFormat::Png => "png",
            CaptureFormat::Pdf => "pdf",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    /// Budget for loading the page and waiting for its network to go quiet.
    pub navigation_timeout: Duration,
    /// How long no request may be in flight before the page counts as loaded.
    pub network_quiet: Duration,
    pub render_timeout: Duration,
    pub settle_delay: Duration,
    pub scroll_pause: Duration,
    pub max_scroll_rounds: u32,
    pub viewport: (u32, u32),
    pub format: CaptureFormat,
    /// Tried before the built-in list.
    pub consent_selectors: Vec<String>,
    pub hide_sticky_elements: bool,
    pub expand_collapsibles: bool,
    pub chrome_executable: Option<PathBuf>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(90),
            network_quiet: Duration::from_millis(500),
            render_timeout: Duration::from_secs(180),
            settle_delay: Duration::from_secs(2),
            scroll_pause: Duration::from_millis(250),
            max_scroll_rounds: 25,
            viewport: (1920, 1080),
            format: CaptureFormat::Png,
            consent_selectors: Vec::new(),
            hide_sticky_elements: false,
            expand_collapsibles: false,
            chrome_executable: None,
        }
    }
}

/// A rendered full-page artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub url: String,
    pub title: Option<String>,
    pub format: CaptureFormat,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("cannot capture {url}: unsupported scheme {scheme:?}")]
    UnsupportedScheme { url: String, scheme: String },
    #[error(transparent)]
    InvalidUrl(UrlError),
    #[error("navigation to {url} timed out after {after:?}")]
    NavigationTimeout { url: String, after: Duration },
    #[error("rendering {url} timed out after {after:?}")]
    RenderTimeout { url: String, after: Duration },
    #[error("browser error: {0}")]
    Browser(String),
    #[error("could not launch browser: {0}")]
    Launch(String),
}

impl RenderError {
    /// Timeouts and browser hiccups are worth another attempt; bad targets
    /// and a missing browser are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RenderError::NavigationTimeout { .. }
                | RenderError::RenderTimeout { .. }
                | RenderError::Browser(_)
        )
    }
}

impl From<UrlError> for RenderError {
    fn from(err: UrlError) -> Self {
        match err {
            UrlError::UnsupportedScheme { scheme, input } => {
                RenderError::UnsupportedScheme { url: input, scheme }
            }
            other => RenderError::InvalidUrl(other),
        }
    }
}

/// Validates a capture target and returns it normalized.
pub fn check_capturable(url: &str) -> Result<String, RenderError> {
    check_supported_scheme(url)?;
    let normalized = normalize_url(url)?;
    if !is_web_url(&normalized) {
        let scheme = normalized
            .split_once(':')
            .map(|(scheme, _)| scheme.to_string())
            .unwrap_or_default();
        return Err(RenderError::UnsupportedScheme {
            url: url.to_string(),
            scheme,
        });
    }
    Ok(normalized)
}

/// Turns one URL into a full-page capture.
#[async_trait::async_trait]
pub trait PageRenderer: Send + Sync {
    async fn capture(&self, url: &str) -> Result<Capture, RenderError>;

    /// Releases whatever the renderer holds between jobs.
    async fn shutdown(&self) {}
}

/// Outcome of the overlay dismissal step. Finding nothing is normal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BannerOutcome {
    Dismissed { selector: String },
    DismissedByText { text: String },
    NoneFound,
}

/// Request lifecycle seen on a page, keyed by CDP request id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NetworkActivity {
    Started(String),
    Settled(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NetworkOutcome {
    Quiet { requests: usize },
    /// The page stopped reporting events, usually because it was closed.
    Closed,
}

/// Waits until no request has been in flight for `quiet`.
///
/// A redirect reuses its request id, so ids are tracked as a set rather than
/// counted. Requests that never settle keep this waiting; callers bound it.
pub(crate) async fn wait_for_network_quiet<S>(mut activity: S, quiet: Duration) -> NetworkOutcome
where
    S: Stream<Item = NetworkActivity> + Unpin,
{
    let mut in_flight = HashSet::new();
    let mut requests = 0;
    loop {
        let next = if in_flight.is_empty() {
            match tokio::time::timeout(quiet, activity.next()).await {
                Ok(next) => next,
                Err(_) => return NetworkOutcome::Quiet { requests },
            }
        } else {
            activity.next().await
        };
        match next {
            Some(NetworkActivity::Started(id)) => {
                if in_flight.insert(id) {
                    requests += 1;
                }
            }
            Some(NetworkActivity::Settled(id)) => {
                in_flight.remove(&id);
            }
            None => return NetworkOutcome::Closed,
        }
    }
}

/// Merged request events of `page`. Subscribe before navigating so the
/// document request itself is seen.
async fn network_activity(
    page: &Page,
) -> Result<BoxStream<'static, NetworkActivity>, RenderError> {
    let started = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(browser_error)?
        .map(|event| NetworkActivity::Started(event.request_id.inner().clone()));
    let finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .map_err(browser_error)?
        .map(|event| NetworkActivity::Settled(event.request_id.inner().clone()));
    let failed = page
        .event_listener::<EventLoadingFailed>()
        .await
        .map_err(browser_error)?
        .map(|event| NetworkActivity::Settled(event.request_id.inner().clone()));
    Ok(stream::select_all([started.boxed(), finished.boxed(), failed.boxed()]).boxed())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollOutcome {
    Stable { height: f64, rounds: u32 },
    CapReached { height: f64 },
}

/// Prioritised selector list: configured selectors first, then the built-in ones.
pub fn consent_candidates(configured: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(configured.len() + DEFAULT_CONSENT_SELECTORS.len());
    let builtin = DEFAULT_CONSENT_SELECTORS.iter().map(|s| s.to_string());
    for selector in configured.iter().cloned().chain(builtin) {
        let selector = selector.trim().to_string();
        if !selector.is_empty() && !out.contains(&selector) {
            out.push(selector);
        }
    }
    out
}

/// Something whose content height can be measured and scrolled.
#[async_trait::async_trait]
pub(crate) trait ScrollSurface: Send + Sync {
    async fn content_height(&self) -> Result<f64, RenderError>;
    async fn scroll_to(&self, y: f64) -> Result<(), RenderError>;
}

/// Scrolls to the bottom until the content height stops growing, at most
/// `max_rounds` times, then returns to the top.
pub(crate) async fn settle_scroll_height(
    surface: &dyn ScrollSurface,
    pause: Duration,
    max_rounds: u32,
) -> Result<ScrollOutcome, RenderError> {
    let mut height = surface.content_height().await?;
    let mut outcome = ScrollOutcome::CapReached { height };
    for round in 1..=max_rounds {
        surface.scroll_to(height).await?;
        tokio::time::sleep(pause).await;
        let next = surface.content_height().await?;
        if next <= height {
            outcome = ScrollOutcome::Stable { height, rounds: round };
            break;
        }
        height = next;
        outcome = ScrollOutcome::CapReached { height };
    }
    surface.scroll_to(0.0).await?;
    Ok(outcome)
}

const CONTENT_HEIGHT_JS: &str = "Math.max(document.body ? document.body.scrollHeight : 0, \
     document.documentElement ? document.documentElement.scrollHeight : 0)";

const HIDE_STICKY_JS: &str = r#"(() => {
  document.querySelectorAll('header, footer, .fixed, .sticky, .banner, .navbar').forEach(el => {
    el.style.setProperty('display', 'none', 'important');
  });
  document.querySelectorAll('*').forEach(el => {
    const pos = getComputedStyle(el).position;
    if (pos === 'fixed' || pos === 'sticky') { el.style.setProperty('position', 'static', 'important'); }
  });
  return true;
})()"#;

const EXPAND_COLLAPSIBLES_JS: &str = r#"(() => {
  document.querySelectorAll('details').forEach(el => { el.open = true; });
  document.querySelectorAll('[aria-expanded="false"]').forEach(el => {
    try { el.click(); } catch (e) {}
  });
  return true;
})()"#;

const FIT_MEDIA_JS: &str = r#"(() => {
  document.querySelectorAll('img, video').forEach(el => {
    el.style.maxWidth = '100%';
    el.style.height = 'auto';
    el.style.objectFit = 'contain';
  });
  return true;
})()"#;

fn consent_text_js(phrases: &[&str]) -> String {
    let list = serde_json::to_string(phrases).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
  const phrases = {list};
  const candidates = document.querySelectorAll('button, a, [role="button"], input[type="button"], input[type="submit"]');
  for (const phrase of phrases) {{
    for (const el of candidates) {{
      const text = (el.innerText || el.value || '').trim().toLowerCase();
      const visible = el.offsetParent !== null || getComputedStyle(el).position === 'fixed';
      if (visible && text.length > 0 && text.length < 60 && text.includes(phrase)) {{
        el.click();
        return text;
      }}
    }}
  }}
  return null;
}})()"#
    )
}

/// Renders pages with a lazily launched headless Chrome.
///
/// The browser is shared by all captures; each capture gets its own browser
/// context, released on every exit path. A browser whose connection died is
/// relaunched by the next capture.
pub struct ChromeRenderer {
    settings: RenderSettings,
    browser: LaunchSlot<BrowserHandle>,
}

impl ChromeRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            browser: LaunchSlot::new(),
        }
    }

    async fn run_steps(&self, page: &Page, url: &str) -> Result<Capture, RenderError> {
        let (width, height) = self.settings.viewport;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(width),
            i64::from(height),
            1.0,
            false,
        ))
        .await
        .map_err(browser_error)?;

        let activity = network_activity(page).await?;
        let navigation = self.settings.navigation_timeout;
        let load = async {
            page.goto(url).await.map_err(browser_error)?;
            let network = wait_for_network_quiet(activity, self.settings.network_quiet).await;
            Ok::<_, RenderError>(network)
        };
        match tokio::time::timeout(navigation, load).await {
            Ok(result) => {
                let network = result?;
                webclick_debug!("{url}: network {network:?}");
            }
            Err(_) => {
                return Err(RenderError::NavigationTimeout {
                    url: url.to_string(),
                    after: navigation,
                })
            }
        }

        let banner = self.dismiss_banners(page).await;
        webclick_debug!("{url}: banner dismissal {banner:?}");

        tokio::time::sleep(self.settings.settle_delay).await;
        self.tidy(page).await;

        let surface = PageSurface { page };
        let scroll = settle_scroll_height(
            &surface,
            self.settings.scroll_pause,
            self.settings.max_scroll_rounds,
        )
        .await?;
        webclick_debug!("{url}: scroll {scroll:?}");

        let title = page
            .get_title()
            .await
            .ok()
            .flatten()
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty());

        let bytes = match self.settings.format {
            CaptureFormat::Png => page
                .screenshot(
                    ScreenshotParams::builder()
                        .format(CaptureScreenshotFormat::Png)
                        .full_page(true)
                        .build(),
                )
                .await
                .map_err(browser_error)?,
            CaptureFormat::Pdf => page
                .pdf(PrintToPdfParams {
                    print_background: Some(true),
                    ..Default::default()
                })
                .await
                .map_err(browser_error)?,
        };

        Ok(Capture {
            url: url.to_string(),
            title,
            format: self.settings.format,
            bytes,
        })
    }

    /// Clicks the first matching overlay control; never fails.
    async fn dismiss_banners(&self, page: &Page) -> BannerOutcome {
        for selector in consent_candidates(&self.settings.consent_selectors) {
            let Ok(element) = page.find_element(selector.as_str()).await else {
                continue;
            };
            if element.click().await.is_ok() {
                return BannerOutcome::Dismissed { selector };
            }
        }
        let script = consent_text_js(CONSENT_PHRASES);
        match page.evaluate(script.as_str()).await {
            Ok(result) => match result.into_value::<Option<String>>() {
                Ok(Some(text)) => BannerOutcome::DismissedByText { text },
                _ => BannerOutcome::NoneFound,
            },
            Err(err) => {
                webclick_debug!("consent text heuristic failed: {err}");
                BannerOutcome::NoneFound
            }
        }
    }

    async fn tidy(&self, page: &Page) {
        let mut scripts = vec![FIT_MEDIA_JS];
        if self.settings.expand_collapsibles {
            scripts.push(EXPAND_COLLAPSIBLES_JS);
        }
        if self.settings.hide_sticky_elements {
            scripts.push(HIDE_STICKY_JS);
        }
        for script in scripts {
            if let Err(err) = page.evaluate(script).await {
                webclick_debug!("page tidying script failed: {err}");
            }
        }
    }
}

#[async_trait::async_trait]
impl PageRenderer for ChromeRenderer {
    async fn capture(&self, url: &str) -> Result<Capture, RenderError> {
        let url = check_capturable(url)?;
        let settings = &self.settings;
        let browser = self
            .browser
            .get_or_launch(|| {
                BrowserHandle::launch(
                    settings.chrome_executable.as_deref(),
                    settings.viewport,
                    settings.navigation_timeout,
                )
            })
            .await?;
        let isolated = browser.isolated_page().await?;

        let budget = self.settings.render_timeout;
        let result = match tokio::time::timeout(budget, self.run_steps(&isolated.page, &url)).await
        {
            Ok(result) => result,
            Err(_) => Err(RenderError::RenderTimeout {
                url: url.clone(),
                after: budget,
            }),
        };

        browser.release(isolated).await;
        result
    }

    async fn shutdown(&self) {
        if self.browser.take().await.is_some() {
            webclick_info!("headless browser released");
        }
    }
}

struct PageSurface<'a> {
    page: &'a Page,
}

#[async_trait::async_trait]
impl ScrollSurface for PageSurface<'_> {
    async fn content_height(&self) -> Result<f64, RenderError> {
        self.page
            .evaluate(CONTENT_HEIGHT_JS)
            .await
            .map_err(browser_error)?
            .into_value::<f64>()
            .map_err(|err| RenderError::Browser(err.to_string()))
    }

    async fn scroll_to(&self, y: f64) -> Result<(), RenderError> {
        self.page
            .evaluate(format!("window.scrollTo(0, {y}); true").as_str())
            .await
            .map_err(browser_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    struct GrowingPage {
        heights: StdMutex<Vec<f64>>,
        scrolls: StdMutex<Vec<f64>>,
    }

    impl GrowingPage {
        fn new(heights: &[f64]) -> Self {
            let mut heights = heights.to_vec();
            heights.reverse();
            Self {
                heights: StdMutex::new(heights),
                scrolls: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ScrollSurface for GrowingPage {
        async fn content_height(&self) -> Result<f64, RenderError> {
            let mut heights = self.heights.lock().unwrap();
            let next = if heights.len() > 1 {
                heights.pop().unwrap()
            } else {
                heights[0]
            };
            Ok(next)
        }

        async fn scroll_to(&self, y: f64) -> Result<(), RenderError> {
            self.scrolls.lock().unwrap().push(y);
            Ok(())
        }
    }

    #[tokio::test]
    async fn scrolling_stops_when_height_settles() {
        let page = GrowingPage::new(&[1000.0, 1800.0, 2400.0, 2400.0]);
        let outcome = settle_scroll_height(&page, Duration::ZERO, 25).await.unwrap();

        assert_eq!(
            outcome,
            ScrollOutcome::Stable {
                height: 2400.0,
                rounds: 3
            }
        );
        assert_eq!(
            *page.scrolls.lock().unwrap(),
            vec![1000.0, 1800.0, 2400.0, 0.0]
        );
    }

    #[tokio::test]
    async fn endless_pages_stop_at_the_round_cap() {
        let heights: Vec<f64> = (1..=100).map(|n| f64::from(n) * 500.0).collect();
        let page = GrowingPage::new(&heights);
        let outcome = settle_scroll_height(&page, Duration::ZERO, 4).await.unwrap();

        assert_eq!(outcome, ScrollOutcome::CapReached { height: 2500.0 });
        assert_eq!(page.scrolls.lock().unwrap().len(), 5);
    }

    fn started(id: &str) -> NetworkActivity {
        NetworkActivity::Started(id.to_string())
    }

    fn settled(id: &str) -> NetworkActivity {
        NetworkActivity::Settled(id.to_string())
    }

    #[tokio::test]
    async fn network_is_quiet_once_every_request_settled() {
        let activity = stream::iter(vec![
            started("doc"),
            started("app.js"),
            settled("doc"),
            // A redirect hop reports the same id again.
            started("app.js"),
            settled("app.js"),
        ])
        .chain(stream::pending());

        let outcome = wait_for_network_quiet(activity, Duration::from_millis(20)).await;
        assert_eq!(outcome, NetworkOutcome::Quiet { requests: 2 });
    }

    #[tokio::test]
    async fn late_requests_extend_the_wait() {
        let activity = stream::iter(vec![started("doc"), settled("doc")])
            .chain(stream::once(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                started("xhr")
            }))
            .chain(stream::once(async {
                tokio::time::sleep(Duration::from_millis(60)).await;
                settled("xhr")
            }))
            .chain(stream::pending())
            .boxed();

        let start = std::time::Instant::now();
        let outcome = wait_for_network_quiet(activity, Duration::from_millis(30)).await;
        assert_eq!(outcome, NetworkOutcome::Quiet { requests: 2 });
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn pending_request_keeps_the_page_loading() {
        let activity = stream::iter(vec![started("doc"), started("long-poll"), settled("doc")])
            .chain(stream::pending());

        let waited = tokio::time::timeout(
            Duration::from_millis(100),
            wait_for_network_quiet(activity, Duration::from_millis(10)),
        )
        .await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn closed_event_stream_ends_the_wait() {
        let activity = stream::iter(vec![started("doc")]);
        let outcome = wait_for_network_quiet(activity, Duration::from_millis(10)).await;
        assert_eq!(outcome, NetworkOutcome::Closed);
    }

    #[test]
    fn configured_selectors_come_first_without_duplicates() {
        let configured = vec![
            " #my-banner .no ".to_string(),
            "#onetrust-accept-btn-handler".to_string(),
            String::new(),
        ];
        let candidates = consent_candidates(&configured);

        assert_eq!(candidates[0], "#my-banner .no");
        assert_eq!(candidates[1], "#onetrust-accept-btn-handler");
        assert_eq!(candidates[2], DEFAULT_CONSENT_SELECTORS[0]);
        assert_eq!(candidates.len(), DEFAULT_CONSENT_SELECTORS.len() + 1);
    }

    #[test]
    fn mailto_and_tel_are_refused_before_any_browser_work() {
        for target in ["mailto:a@b.com", "tel:123"] {
            let err = check_capturable(target).unwrap_err();
            assert!(matches!(err, RenderError::UnsupportedScheme { .. }), "{target}");
            assert!(!err.is_retryable());
        }
        assert!(matches!(
            check_capturable("data:text/html,hi"),
            Err(RenderError::UnsupportedScheme { .. })
        ));
        assert_eq!(
            check_capturable("example.com/a#x").unwrap(),
            "https://example.com/a"
        );
    }

    #[test]
    fn only_transient_failures_retry() {
        let timeout = RenderError::NavigationTimeout {
            url: "https://a.test".into(),
            after: Duration::from_secs(1),
        };
        assert!(timeout.is_retryable());
        assert!(RenderError::Browser("crashed".into()).is_retryable());
        assert!(!RenderError::Launch("missing".into()).is_retryable());
    }
}
