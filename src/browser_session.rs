//! # Browser Session Module
//!
//! Owns the one headless Chrome the process shares across requests.
//!
//! The browser is launched on first use, exactly once even when several
//! requests arrive together, and is never replaced afterwards. Requests never
//! touch the shared default profile: each one gets its own browser context
//! (an isolated, incognito-like profile) with its own download directory, and
//! disposes of it when done. [`BrowserSession::shutdown`] closes the browser
//! when the process stops.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    BrowserContextId, CloseParams, SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams, GetBrowserContextsParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{RetrievalError, Stage};
use crate::retriever::within;

/// Bound on disposing a context, so cleanup cannot hang a request
const DISPOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Chrome flags needed inside restricted containers.
/// chromiumoxide adds the `--` prefix itself.
const CONTAINER_ARGS: &[&str] = &[
    "disable-setuid-sandbox",
    "disable-dev-shm-usage",
    "disable-gpu",
    "mute-audio",
];

struct LaunchedBrowser {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

/// Lazily launched, process-wide headless browser
pub struct BrowserSession {
    chrome_path: Option<PathBuf>,
    launched: OnceCell<LaunchedBrowser>,
    closed: AtomicBool,
}

impl BrowserSession {
    /// Create a session; nothing is launched until the first request
    pub fn new(chrome_path: Option<PathBuf>) -> Self {
        Self {
            chrome_path,
            launched: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Whether the browser process has been started
    pub fn is_launched(&self) -> bool {
        self.launched.initialized()
    }

    /// The shared browser, launching it if this is the first use
    pub async fn browser(&self) -> Result<&Browser, RetrievalError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RetrievalError::SessionClosed);
        }
        let launched = self
            .launched
            .get_or_try_init(|| Self::launch(self.chrome_path.as_deref()))
            .await?;
        Ok(&launched.browser)
    }

    async fn launch(chrome_path: Option<&Path>) -> Result<LaunchedBrowser, RetrievalError> {
        info!("Launching headless browser");

        let mut builder = BrowserConfig::builder().new_headless_mode().no_sandbox();
        for arg in CONTAINER_ARGS {
            builder = builder.arg(*arg);
        }
        if let Some(path) = chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(RetrievalError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RetrievalError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(_event) = handler.next().await {}
            debug!("Browser handler stopped");
        });

        info!("Headless browser launched");
        Ok(LaunchedBrowser {
            browser,
            handler_task,
        })
    }

    /// Open an isolated browser context with a blank page.
    ///
    /// Downloads started from the page are saved into `download_dir`, which
    /// must be an absolute path. Preparing the context is bounded by
    /// `limit`; once the context exists it is disposed of on every failure,
    /// timeouts included.
    pub async fn open_context(
        &self,
        download_dir: &Path,
        limit: Duration,
    ) -> Result<BrowsingContext<'_>, RetrievalError> {
        let browser = self.browser().await?;

        // Not raced against `limit`: a dropped reply would leak the context.
        // The CDP request timeout still bounds it.
        let id = browser
            .execute(CreateBrowserContextParams::default())
            .await?
            .result
            .browser_context_id;
        debug!(context = ?id, "Browser context created");

        let setup = within(Stage::Launch, limit, async {
            let mut behavior = SetDownloadBehaviorParams::new(SetDownloadBehaviorBehavior::AllowAndName);
            behavior.browser_context_id = Some(id.clone());
            behavior.download_path = Some(download_dir.to_string_lossy().into_owned());
            behavior.events_enabled = Some(true);
            browser.execute(behavior).await?;

            let mut target = CreateTargetParams::new("about:blank");
            target.browser_context_id = Some(id.clone());
            Ok::<_, RetrievalError>(browser.new_page(target).await?)
        })
        .await;

        match setup {
            Ok(page) => Ok(BrowsingContext { browser, id, page }),
            Err(e) => {
                dispose_context(browser, id).await;
                Err(e)
            }
        }
    }

    /// Ids of the browser contexts currently open, empty if never launched
    pub async fn open_context_ids(&self) -> Result<Vec<BrowserContextId>, RetrievalError> {
        let Some(launched) = self.launched.get() else {
            return Ok(Vec::new());
        };
        Ok(launched
            .browser
            .execute(GetBrowserContextsParams::default())
            .await?
            .result
            .browser_context_ids)
    }

    /// Close the browser. Later requests fail with [`RetrievalError::SessionClosed`].
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let Some(launched) = self.launched.get() else {
            return;
        };
        match launched.browser.execute(CloseParams::default()).await {
            Ok(_) => info!("Headless browser closed"),
            Err(e) => warn!(error = %e, "Failed to close headless browser cleanly"),
        }
        launched.handler_task.abort();
    }
}

/// One request's private browser context and page
pub struct BrowsingContext<'a> {
    browser: &'a Browser,
    id: BrowserContextId,
    page: Page,
}

impl BrowsingContext<'_> {
    pub fn browser(&self) -> &Browser {
        self.browser
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Dispose of the context, closing its page
    pub async fn dispose(self) {
        dispose_context(self.browser, self.id).await;
    }
}

async fn dispose_context(browser: &Browser, id: BrowserContextId) {
    let dispose = browser.execute(DisposeBrowserContextParams::new(id.clone()));
    match tokio::time::timeout(DISPOSE_TIMEOUT, dispose).await {
        Ok(Ok(_)) => debug!(context = ?id, "Browser context disposed"),
        Ok(Err(e)) => warn!(context = ?id, error = %e, "Failed to dispose browser context"),
        Err(_) => warn!(context = ?id, "Timed out disposing browser context"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_is_lazy() {
        let session = BrowserSession::new(None);
        assert!(!session.is_launched());
    }

    #[tokio::test]
    async fn test_closed_session_refuses_without_launching() {
        let session = BrowserSession::new(Some(PathBuf::from("/nonexistent/chrome")));
        session.shutdown().await;

        let result = session.browser().await;
        assert!(matches!(result, Err(RetrievalError::SessionClosed)));
        assert!(!session.is_launched());

        let dir = tempfile::tempdir().unwrap();
        let context = session.open_context(dir.path(), Duration::from_secs(1)).await;
        assert!(matches!(context, Err(RetrievalError::SessionClosed)));
    }

    #[tokio::test]
    async fn test_unlaunched_session_has_no_contexts() {
        let session = BrowserSession::new(None);
        assert!(session.open_context_ids().await.unwrap().is_empty());
        assert!(!session.is_launched());
    }
}
