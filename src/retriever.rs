//! # Portal Retriever Module
//!
//! Drives the exam portal in a headless browser: open the admit card page,
//! type the form number, press submit and catch the PDF the portal sends
//! back as a download.
//!
//! Every call runs in its own browser context with a private staging
//! directory. The download only reaches its destination path once the
//! browser reports it complete, so a failed or partial download never
//! looks like a document.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
};
use chromiumoxide::cdp::browser_protocol::page::{EventLifecycleEvent, NavigateParams};
use chromiumoxide::page::Page;
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::admit_card_model::FormNumber;
use crate::browser_session::{BrowserSession, BrowsingContext};
use crate::errors::{RetrievalError, Stage};
use crate::pipeline::AdmitCardSource;
use crate::retrieval_config::{RetrievalConfig, WaitStrategy};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run one retrieval stage under its time bound
pub async fn within<T, F>(stage: Stage, limit: Duration, operation: F) -> Result<T, RetrievalError>
where
    F: Future<Output = Result<T, RetrievalError>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(RetrievalError::Timeout { stage, after: limit }),
    }
}

/// Pull items off a stream until `select` picks one; `None` if the stream ends
pub async fn first_match<S, T, R, F>(events: &mut S, mut select: F) -> Option<R>
where
    S: Stream<Item = T> + Unpin,
    F: FnMut(&T) -> Option<R>,
{
    while let Some(event) = events.next().await {
        if let Some(found) = select(&event) {
            return Some(found);
        }
    }
    None
}

/// Retrieves admit cards from the portal with a shared [`BrowserSession`]
pub struct PortalRetriever {
    session: Arc<BrowserSession>,
    config: RetrievalConfig,
}

impl PortalRetriever {
    pub fn new(session: Arc<BrowserSession>, config: RetrievalConfig) -> Self {
        Self { session, config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    async fn drive(
        &self,
        context: &BrowsingContext<'_>,
        form_number: &FormNumber,
        staging_dir: &Path,
        destination: &Path,
    ) -> Result<(), RetrievalError> {
        let timeouts = &self.config.timeouts;
        let page = context.page();

        within(Stage::Navigation, timeouts.navigation, self.open_portal(page)).await?;
        debug!(%form_number, "Portal form ready");

        within(Stage::Fill, timeouts.action, self.fill_form_number(page, form_number)).await?;

        let guid = within(Stage::Download, timeouts.download, self.submit_and_download(context)).await?;

        let downloaded = staging_dir.join(&guid);
        let size = tokio::fs::metadata(&downloaded).await?.len();
        if size == 0 {
            return Err(RetrievalError::NoDownload("portal sent an empty file".to_string()));
        }
        tokio::fs::rename(&downloaded, destination).await?;

        info!(%form_number, bytes = size, path = %destination.display(), "Admit card downloaded");
        Ok(())
    }

    async fn open_portal(&self, page: &Page) -> Result<(), RetrievalError> {
        let url = self.config.portal_url.as_str();
        match self.config.wait_strategy {
            WaitStrategy::Commit => {
                let response = page.execute(NavigateParams::new(url)).await?;
                if let Some(error) = response.result.error_text.as_ref() {
                    return Err(RetrievalError::Navigation(error.clone()));
                }
            }
            WaitStrategy::Load => {
                page.goto(url)
                    .await
                    .map_err(|e| RetrievalError::Navigation(e.to_string()))?;
            }
            WaitStrategy::NetworkIdle => {
                let frame = page.mainframe().await?;
                let lifecycle = page.event_listener::<EventLifecycleEvent>().await?;
                tokio::pin!(lifecycle);

                page.goto(url)
                    .await
                    .map_err(|e| RetrievalError::Navigation(e.to_string()))?;

                // Only count idleness of the new document, not of about:blank
                let mut new_document = false;
                first_match(&mut lifecycle, |event| {
                    if frame.as_ref().is_some_and(|f| *f != event.frame_id) {
                        return None;
                    }
                    match event.name.as_str() {
                        "init" => {
                            new_document = true;
                            None
                        }
                        "networkIdle" if new_document => Some(()),
                        _ => None,
                    }
                })
                .await
                .ok_or_else(|| RetrievalError::Navigation("page lifecycle events stopped".to_string()))?;
            }
        }

        while !element_ready(page, &self.config.input_selector).await {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(())
    }

    async fn fill_form_number(&self, page: &Page, form_number: &FormNumber) -> Result<(), RetrievalError> {
        let selector = &self.config.input_selector;
        let selector_js = js_string(selector);
        let value_js = js_string(form_number.as_str());
        let js = format!(
            r#"
            (() => {{
                const el = document.querySelector({selector_js});
                if (!el) return false;
                el.focus();
                el.value = {value_js};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()
            "#,
        );
        let filled: bool = page
            .evaluate(js)
            .await?
            .into_value()
            .map_err(|e| RetrievalError::Navigation(e.to_string()))?;
        if !filled {
            return Err(RetrievalError::ElementNotFound(selector.clone()));
        }
        Ok(())
    }

    async fn click_submit(&self, page: &Page) -> Result<(), RetrievalError> {
        let selector = &self.config.submit_selector;
        let button = page
            .find_element(selector.as_str())
            .await
            .map_err(|_| RetrievalError::ElementNotFound(selector.clone()))?;
        button.click().await?;
        Ok(())
    }

    /// Click submit and wait for the resulting download to finish.
    /// Returns the download's guid, which is also its file name in the staging directory.
    async fn submit_and_download(&self, context: &BrowsingContext<'_>) -> Result<String, RetrievalError> {
        let page = context.page();
        let browser = context.browser();
        let frame = page.mainframe().await?;

        // Subscribe before clicking; the download can start before click() returns
        let will_begin = browser.event_listener::<EventDownloadWillBegin>().await?;
        let progress = browser.event_listener::<EventDownloadProgress>().await?;
        tokio::pin!(will_begin);
        tokio::pin!(progress);

        self.click_submit(page).await?;

        let window = self
            .config
            .retry
            .first_attempt_window(self.config.timeouts.download);
        let guid = match window {
            Some(window) => match tokio::time::timeout(window, download_started(&mut will_begin, frame.as_ref())).await {
                Ok(started) => started?,
                Err(_) => {
                    self.reclick_if_pending(page).await?;
                    download_started(&mut will_begin, frame.as_ref()).await?
                }
            },
            None => download_started(&mut will_begin, frame.as_ref()).await?,
        };
        debug!(guid = %guid, "Download started");

        let finished = first_match(&mut progress, |event| {
            if event.guid != guid {
                return None;
            }
            match event.state {
                DownloadProgressState::Completed => Some(Ok(())),
                DownloadProgressState::Canceled => Some(Err(RetrievalError::NoDownload(
                    "download was canceled".to_string(),
                ))),
                _ => None,
            }
        })
        .await
        .unwrap_or_else(|| Err(RetrievalError::NoDownload("download events stopped".to_string())));
        finished?;

        Ok(guid)
    }

    /// Second and last click, only if submit still looks clickable
    async fn reclick_if_pending(&self, page: &Page) -> Result<(), RetrievalError> {
        if element_ready(page, &self.config.submit_selector).await {
            warn!("No download after first click, clicking submit once more");
            self.click_submit(page).await
        } else {
            debug!("Submit no longer visible, waiting for the pending download");
            Ok(())
        }
    }
}

impl AdmitCardSource for PortalRetriever {
    async fn fetch(&self, form_number: &FormNumber, destination: &Path) -> Result<(), RetrievalError> {
        let parent = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        // Removed on drop, together with any partial download
        let staging = tempfile::Builder::new().prefix(".download-").tempdir_in(parent)?;
        let staging_dir = tokio::fs::canonicalize(staging.path()).await?;

        info!(%form_number, "Retrieving admit card from portal");
        let launch_limit = self.config.timeouts.launch;
        within(Stage::Launch, launch_limit, self.session.browser()).await?;
        let context = self.session.open_context(&staging_dir, launch_limit).await?;

        let result = self.drive(&context, form_number, &staging_dir, destination).await;
        context.dispose().await;

        if let Err(e) = &result {
            warn!(%form_number, error = %e, "Admit card retrieval failed");
        }
        result
    }
}

async fn download_started<S>(
    events: &mut S,
    frame: Option<&chromiumoxide::cdp::browser_protocol::page::FrameId>,
) -> Result<String, RetrievalError>
where
    S: Stream<Item = Arc<EventDownloadWillBegin>> + Unpin,
{
    first_match(events, |event| {
        let ours = frame.map_or(true, |f| *f == event.frame_id);
        ours.then(|| event.guid.clone())
    })
    .await
    .ok_or_else(|| RetrievalError::NoDownload("download events stopped".to_string()))
}

/// Whether the element exists, is enabled and has a layout box
async fn element_ready(page: &Page, selector: &str) -> bool {
    let selector_js = js_string(selector);
    let js = format!(
        r#"
        (() => {{
            const el = document.querySelector({selector_js});
            if (!el || el.disabled) return false;
            const rect = el.getBoundingClientRect();
            return rect.width > 0 && rect.height > 0;
        }})()
        "#,
    );
    match page.evaluate(js).await {
        Ok(result) => result.into_value::<bool>().unwrap_or(false),
        // Evaluation fails while the page is navigating
        Err(_) => false,
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_within_reports_stage_on_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, RetrievalError>(())
        };
        let result = within(Stage::Download, Duration::from_millis(20), slow).await;
        match result {
            Err(RetrievalError::Timeout { stage, after }) => {
                assert_eq!(stage, Stage::Download);
                assert_eq!(after, Duration::from_millis(20));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_within_passes_through_results() {
        let ok = within(Stage::Fill, Duration::from_secs(1), async { Ok::<_, RetrievalError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = within(Stage::Fill, Duration::from_secs(1), async {
            Err::<(), _>(RetrievalError::ElementNotFound("#x".into()))
        })
        .await;
        assert!(matches!(err, Err(RetrievalError::ElementNotFound(_))));
    }

    #[tokio::test]
    async fn test_first_match_skips_unrelated_events() {
        let mut events = stream::iter(vec!["other", "mine", "later"]);
        let found = first_match(&mut events, |e| (*e == "mine").then_some(e.len())).await;
        assert_eq!(found, Some(4));

        // The stream continues after the match
        assert_eq!(events.next().await, Some("later"));
    }

    #[tokio::test]
    async fn test_first_match_none_when_stream_ends() {
        let mut events = stream::iter(vec![1, 2, 3]);
        assert_eq!(first_match(&mut events, |e| (*e > 10).then_some(())).await, None);
    }

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string("#txtchallanNo"), "\"#txtchallanNo\"");
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
    }
}
