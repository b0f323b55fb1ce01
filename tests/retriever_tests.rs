//! # Retriever Tests
//!
//! Drives `PortalRetriever` with a real headless Chrome against a small
//! portal served locally. Ignored by default; run with
//! `cargo test --test retriever_tests -- --ignored` on a machine with Chrome
//! (set `CHROME_PATH` if it is not auto-detected).

use admit_card_bot::admit_card_model::{Field, FormNumber};
use admit_card_bot::browser_session::BrowserSession;
use admit_card_bot::errors::{RetrievalError, Stage};
use admit_card_bot::pipeline::AdmitCardSource;
use admit_card_bot::retrieval_config::{RetrievalConfig, RetryPolicy, StageTimeouts, WaitStrategy};
use admit_card_bot::retriever::PortalRetriever;
use admit_card_bot::text_processing::StudentRecordExtractor;
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const SAMPLE_PDF: &[u8] = include_bytes!("fixtures/admit_card_sample.pdf");
const KNOWN_FORM_NUMBER: &str = "123456";

const FORM_PAGE: &str = r#"<!doctype html>
<html><body>
<form id="admit" method="post" action="/admit-card">
  <input id="txtchallanNo" name="challan" type="text">
  <button id="btnGetResult" type="submit">Get Admit Card</button>
</form>
</body></html>"#;

// Swallows the first click, like a postback that was not wired up yet
const STUBBORN_FORM_PAGE: &str = r#"<!doctype html>
<html><body>
<form id="admit" method="post" action="/admit-card">
  <input id="txtchallanNo" name="challan" type="text">
  <button id="btnGetResult" type="button">Get Admit Card</button>
</form>
<script>
  let clicks = 0;
  document.getElementById('btnGetResult').addEventListener('click', () => {
    clicks += 1;
    if (clicks > 1) document.getElementById('admit').submit();
  });
</script>
</body></html>"#;

const EMPTY_FORM_PAGE: &str = r#"<!doctype html>
<html><body>
<form id="admit" method="post" action="/empty-card">
  <input id="txtchallanNo" name="challan" type="text">
  <button id="btnGetResult" type="submit">Get Admit Card</button>
</form>
</body></html>"#;

fn attachment(body: &'static [u8]) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"AdmitCard.pdf\""),
        ],
        body,
    )
        .into_response()
}

async fn admit_card(Form(form): Form<HashMap<String, String>>) -> Response {
    match form.get("challan").map(String::as_str) {
        Some(KNOWN_FORM_NUMBER) => attachment(SAMPLE_PDF),
        _ => Html("<html><body><p>No record found</p></body></html>").into_response(),
    }
}

async fn empty_card() -> Response {
    attachment(b"")
}

async fn start_portal() -> SocketAddr {
    let app = Router::new()
        .route("/form", get(|| async { Html(FORM_PAGE) }))
        .route("/stubborn-form", get(|| async { Html(STUBBORN_FORM_PAGE) }))
        .route("/empty-form", get(|| async { Html(EMPTY_FORM_PAGE) }))
        .route("/admit-card", post(admit_card))
        .route("/empty-card", post(empty_card));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn portal_config(addr: SocketAddr, path: &str, retry: RetryPolicy) -> RetrievalConfig {
    RetrievalConfig {
        portal_url: format!("http://{addr}{path}"),
        wait_strategy: WaitStrategy::Load,
        timeouts: StageTimeouts {
            launch: Duration::from_secs(30),
            navigation: Duration::from_secs(15),
            action: Duration::from_secs(5),
            download: Duration::from_secs(6),
        },
        retry,
        ..RetrievalConfig::default()
    }
}

fn create_session() -> Arc<BrowserSession> {
    Arc::new(BrowserSession::new(std::env::var_os("CHROME_PATH").map(PathBuf::from)))
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "needs a local Chrome"]
    async fn test_downloads_admit_card() {
        let addr = start_portal().await;
        let session = create_session();
        let retriever = PortalRetriever::new(
            Arc::clone(&session),
            portal_config(addr, "/form", RetryPolicy::default()),
        );
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("admit_card_123456.pdf");

        let form_number = FormNumber::parse(KNOWN_FORM_NUMBER).unwrap();
        retriever.fetch(&form_number, &destination).await.unwrap();

        let bytes = std::fs::read(&destination).unwrap();
        assert_eq!(bytes, SAMPLE_PDF);
        // The staging directory is gone, only the document remains
        assert_eq!(files_in(dir.path()), vec![destination.clone()]);

        let record = StudentRecordExtractor::new().extract_from_document(&destination);
        assert_eq!(record.get(Field::Name), "JOHN DOE");

        session.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "needs a local Chrome"]
    async fn test_unknown_number_times_out_in_download_stage() {
        let addr = start_portal().await;
        let session = create_session();
        let retriever = PortalRetriever::new(
            Arc::clone(&session),
            portal_config(addr, "/form", RetryPolicy::default()),
        );
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("admit_card_999.pdf");

        let form_number = FormNumber::parse("999").unwrap();
        let result = retriever.fetch(&form_number, &destination).await;

        assert!(
            matches!(result, Err(RetrievalError::Timeout { stage: Stage::Download, .. })),
            "{result:?}"
        );
        assert!(files_in(dir.path()).is_empty());

        session.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "needs a local Chrome"]
    async fn test_ignored_first_click_is_retried_once() {
        let addr = start_portal().await;
        let session = create_session();
        let retry = RetryPolicy {
            reclick_after: Some(Duration::from_secs(1)),
        };
        let retriever = PortalRetriever::new(Arc::clone(&session), portal_config(addr, "/stubborn-form", retry));
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("admit_card_123456.pdf");

        let form_number = FormNumber::parse(KNOWN_FORM_NUMBER).unwrap();
        retriever.fetch(&form_number, &destination).await.unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), SAMPLE_PDF);

        session.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "needs a local Chrome"]
    async fn test_ignored_first_click_without_retry_times_out() {
        let addr = start_portal().await;
        let session = create_session();
        let retriever = PortalRetriever::new(
            Arc::clone(&session),
            portal_config(addr, "/stubborn-form", RetryPolicy::disabled()),
        );
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("admit_card_123456.pdf");

        let form_number = FormNumber::parse(KNOWN_FORM_NUMBER).unwrap();
        let result = retriever.fetch(&form_number, &destination).await;

        assert!(matches!(result, Err(RetrievalError::Timeout { stage: Stage::Download, .. })));
        assert!(files_in(dir.path()).is_empty());

        session.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "needs a local Chrome"]
    async fn test_empty_download_is_rejected() {
        let addr = start_portal().await;
        let session = create_session();
        let retriever = PortalRetriever::new(
            Arc::clone(&session),
            portal_config(addr, "/empty-form", RetryPolicy::default()),
        );
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("admit_card_123456.pdf");

        let form_number = FormNumber::parse(KNOWN_FORM_NUMBER).unwrap();
        let result = retriever.fetch(&form_number, &destination).await;

        assert!(matches!(result, Err(RetrievalError::NoDownload(_))), "{result:?}");
        assert!(files_in(dir.path()).is_empty());

        session.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "needs a local Chrome"]
    async fn test_contexts_are_disposed_on_every_exit() {
        let addr = start_portal().await;
        let session = create_session();
        session.browser().await.unwrap();
        let baseline = session.open_context_ids().await.unwrap().len();

        let retriever = PortalRetriever::new(
            Arc::clone(&session),
            portal_config(addr, "/form", RetryPolicy::disabled()),
        );
        let dir = tempfile::tempdir().unwrap();

        let found = FormNumber::parse(KNOWN_FORM_NUMBER).unwrap();
        retriever.fetch(&found, &dir.path().join("found.pdf")).await.unwrap();
        assert_eq!(session.open_context_ids().await.unwrap().len(), baseline);

        let missing = FormNumber::parse("999").unwrap();
        assert!(retriever.fetch(&missing, &dir.path().join("missing.pdf")).await.is_err());
        assert_eq!(session.open_context_ids().await.unwrap().len(), baseline);

        // Context setup that runs out of time still disposes of the context
        let staging = tempfile::tempdir().unwrap();
        let result = session.open_context(staging.path(), Duration::ZERO).await;
        assert!(matches!(result, Err(RetrievalError::Timeout { stage: Stage::Launch, .. })));
        assert_eq!(session.open_context_ids().await.unwrap().len(), baseline);

        session.shutdown().await;
    }
}
