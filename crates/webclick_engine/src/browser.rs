use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::Page;
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use webclick_logging::{webclick_debug, webclick_error, webclick_info, webclick_warn};

use crate::render::RenderError;

/// Environment variable that overrides browser discovery.
pub const CHROMIUM_PATH_ENV: &str = "CHROMIUM_PATH";

/// A launched headless browser and the task pumping its CDP events.
///
/// Dropping the handle aborts the event task; dropping the inner
/// [`Browser`] kills the child process.
pub struct BrowserHandle {
    browser: Browser,
    handler: JoinHandle<()>,
    connected: Arc<AtomicBool>,
}

impl BrowserHandle {
    pub async fn launch(
        executable: Option<&Path>,
        viewport: (u32, u32),
        request_timeout: Duration,
    ) -> Result<Self, RenderError> {
        let executable = match executable {
            Some(path) => path.to_path_buf(),
            None => find_browser_executable().ok_or_else(|| {
                RenderError::Launch(format!(
                    "no Chrome/Chromium found; set {CHROMIUM_PATH_ENV} or render.chrome_executable"
                ))
            })?,
        };
        webclick_info!("launching headless browser {}", executable.display());

        let config = BrowserConfig::builder()
            .chrome_executable(executable)
            .request_timeout(request_timeout)
            .window_size(viewport.0, viewport.1)
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-notifications")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--hide-scrollbars")
            .arg("--mute-audio")
            .build()
            .map_err(RenderError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| RenderError::Launch(err.to_string()))?;

        let connected = Arc::new(AtomicBool::new(true));
        let handler = {
            let connected = connected.clone();
            tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(err) = event {
                        webclick_error!("browser handler error: {err}");
                    }
                }
                connected.store(false, Ordering::SeqCst);
                webclick_debug!("browser event handler finished");
            })
        };

        Ok(Self {
            browser,
            handler,
            connected,
        })
    }

    /// Opens a blank page inside a fresh browser context, isolated from every
    /// other page's cookies and storage.
    pub async fn isolated_page(&self) -> Result<IsolatedPage, RenderError> {
        let context = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(browser_error)?
            .result
            .browser_context_id;
        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context.clone())
            .build()
            .map_err(RenderError::Browser)?;
        match self.browser.new_page(target).await {
            Ok(page) => Ok(IsolatedPage { page, context }),
            Err(err) => {
                self.dispose_context(context).await;
                Err(browser_error(err))
            }
        }
    }

    /// Closes the page and disposes of its context. Teardown failures are
    /// logged, never returned.
    pub async fn release(&self, isolated: IsolatedPage) {
        let IsolatedPage { page, context } = isolated;
        if let Err(err) = page.close().await {
            webclick_debug!("closing page failed: {err}");
        }
        self.dispose_context(context).await;
    }

    async fn dispose_context(&self, context: BrowserContextId) {
        if let Err(err) = self
            .browser
            .execute(DisposeBrowserContextParams::new(context))
            .await
        {
            webclick_warn!("disposing browser context failed: {err}");
        }
    }
}

impl Liveness for BrowserHandle {
    /// False once the CDP connection closed, e.g. after Chrome crashed.
    fn is_alive(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for BrowserHandle {
    fn drop(&mut self) {
        webclick_debug!("tearing down headless browser");
        self.handler.abort();
    }
}

/// One page plus the browser context that owns it.
pub struct IsolatedPage {
    pub page: Page,
    context: BrowserContextId,
}

pub(crate) trait Liveness {
    fn is_alive(&self) -> bool;
}

/// Holds one lazily launched resource and relaunches it once it died.
pub(crate) struct LaunchSlot<H> {
    slot: Mutex<Option<Arc<H>>>,
}

impl<H: Liveness> LaunchSlot<H> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub(crate) async fn get_or_launch<F, Fut>(&self, launch: F) -> Result<Arc<H>, RenderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<H, RenderError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.as_ref() {
            if handle.is_alive() {
                return Ok(handle.clone());
            }
            webclick_warn!("headless browser connection lost, relaunching");
            *slot = None;
        }
        let handle = Arc::new(launch().await?);
        *slot = Some(handle.clone());
        Ok(handle)
    }

    pub(crate) async fn take(&self) -> Option<Arc<H>> {
        self.slot.lock().await.take()
    }
}

pub(crate) fn browser_error(err: chromiumoxide::error::CdpError) -> RenderError {
    RenderError::Browser(err.to_string())
}

/// `CHROMIUM_PATH` first, then the usual install locations.
pub fn find_browser_executable() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        webclick_warn!(
            "{CHROMIUM_PATH_ENV} points to missing file {}",
            path.display()
        );
    }

    let candidates: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct FakeBrowser {
        generation: usize,
        alive: AtomicBool,
    }

    impl Liveness for FakeBrowser {
        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }

    async fn launch(launches: &AtomicUsize) -> Result<FakeBrowser, RenderError> {
        let generation = launches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(FakeBrowser {
            generation,
            alive: AtomicBool::new(true),
        })
    }

    #[tokio::test]
    async fn live_browser_is_reused() {
        let slot = LaunchSlot::new();
        let launches = AtomicUsize::new(0);

        let first = slot.get_or_launch(|| launch(&launches)).await.unwrap();
        let second = slot.get_or_launch(|| launch(&launches)).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dead_browser_is_relaunched() {
        let slot = LaunchSlot::new();
        let launches = AtomicUsize::new(0);

        let first = slot.get_or_launch(|| launch(&launches)).await.unwrap();
        first.alive.store(false, Ordering::SeqCst);
        let second = slot.get_or_launch(|| launch(&launches)).await.unwrap();

        assert_eq!(second.generation, 2);
        assert!(second.is_alive());
        let third = slot.get_or_launch(|| launch(&launches)).await.unwrap();
        assert!(Arc::ptr_eq(&second, &third));
    }

    #[tokio::test]
    async fn failed_launch_is_retried_next_time() {
        let slot: LaunchSlot<FakeBrowser> = LaunchSlot::new();
        let launches = AtomicUsize::new(0);

        let err = slot
            .get_or_launch(|| async { Err(RenderError::Launch("no chrome".into())) })
            .await
            .err()
            .unwrap();
        assert_eq!(err, RenderError::Launch("no chrome".into()));

        let browser = slot.get_or_launch(|| launch(&launches)).await.unwrap();
        assert_eq!(browser.generation, 1);
        assert!(slot.take().await.is_some());
        assert!(slot.take().await.is_none());
    }
}
