//! End-to-end crawl behavior against a local mock HTTP server.

use clap::Parser;
use deepscan::controls::{Cli, CrawlControls};
use deepscan::runtime;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use url::Url;

fn controls(server_url: &str, term: &str, max_pages: usize) -> CrawlControls {
    let cli = Cli::parse_from([
        "deepscan",
        "--request-delay-ms",
        "0",
        "--max-pages",
        &max_pages.to_string(),
        "--thread-count",
        "4",
    ]);
    cli.build_controls(
        Url::parse(&format!("{server_url}/")).expect("mock server url parses"),
        term.to_string(),
    )
}

fn html_page(body: &str) -> (&'static str, String) {
    ("text/html; charset=utf-8", format!("<html><body>{body}</body></html>"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn crawl_finds_term_and_respects_filters() {
    let mut server = mockito::Server::new_async().await;

    // "/" links to /a (twice), a banned PDF, and an off-site page.
    let (ct, root_body) = html_page(concat!(
        r#"<a href="/a">a</a> <a href="/a#section">a again</a>"#,
        r#" <a href="/b.pdf">report</a>"#,
        r#" <a href="https://elsewhere.invalid/x">external</a>"#,
    ));
    let root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", ct)
        .with_body(root_body)
        .create_async()
        .await;

    let (ct, a_body) = html_page(r#"<p>hello world</p> <a href="/c">c</a>"#);
    let page_a = server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", ct)
        .with_body(a_body)
        .create_async()
        .await;

    let (ct, c_body) = html_page("<p>nothing to see</p>");
    let page_c = server
        .mock("GET", "/c")
        .with_status(200)
        .with_header("content-type", ct)
        .with_body(c_body)
        .create_async()
        .await;

    // The banned extension must never be requested, let alone parsed.
    let banned = server
        .mock("GET", "/b.pdf")
        .expect(0)
        .create_async()
        .await;

    let summary = runtime::run_crawl(
        controls(&server.url(), "hello", 3),
        Arc::new(AtomicBool::new(false)),
    )
    .await
    .expect("crawl completes");

    assert_eq!(summary.pages_scanned, 3);
    assert_eq!(summary.pages_fetched, 3);
    assert_eq!(summary.pages_matched, 1);
    assert_eq!(summary.matches.len(), 1);
    assert!(summary.matches[0].url.ends_with("/a"));
    assert!(summary.matches[0].snippets[0].contains("hello world"));
    assert!(!summary.cancelled);
    assert!(summary.budget_exhausted);

    // Each page exactly once, despite the duplicate and fragment links.
    root.assert_async().await;
    page_a.assert_async().await;
    page_c.assert_async().await;
    banned.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_html_content_is_never_matched() {
    let mut server = mockito::Server::new_async().await;

    let (ct, root_body) = html_page(r#"<a href="/data">data</a>"#);
    let root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", ct)
        .with_body(root_body)
        .create_async()
        .await;

    // The term appears in the body, but the content type disqualifies it
    // before any parse or match attempt.
    let data = server
        .mock("GET", "/data")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"note": "hello world"}"#)
        .create_async()
        .await;

    let summary = runtime::run_crawl(
        controls(&server.url(), "hello", 10),
        Arc::new(AtomicBool::new(false)),
    )
    .await
    .expect("crawl completes");

    assert_eq!(summary.pages_scanned, 2);
    assert_eq!(summary.pages_fetched, 1);
    assert_eq!(summary.pages_matched, 0);
    assert!(summary.matches.is_empty());

    root.assert_async().await;
    data.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn persistent_server_errors_use_every_attempt_then_fail() {
    let mut server = mockito::Server::new_async().await;

    // Three attempts total: the first request plus two backed-off retries.
    let flaky = server
        .mock("GET", "/")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let summary = runtime::run_crawl(
        controls(&server.url(), "hello", 5),
        Arc::new(AtomicBool::new(false)),
    )
    .await
    .expect("fetch failures never abort the crawl");

    assert_eq!(summary.pages_scanned, 1);
    assert_eq!(summary.pages_fetched, 0);
    assert_eq!(summary.pages_failed, 1);
    assert!(summary.matches.is_empty());

    flaky.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn budget_caps_fetches_on_a_link_farm() {
    let mut server = mockito::Server::new_async().await;

    // Every page links to five more; only max_pages fetches may happen.
    let links: String = (0..5)
        .map(|i| format!(r#"<a href="/page/{i}">p{i}</a> "#))
        .collect();
    let (ct, body) = html_page(&links);

    let root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", ct)
        .with_body(body.clone())
        .create_async()
        .await;
    let farm = server
        .mock("GET", mockito::Matcher::Regex("^/page/".to_string()))
        .with_status(200)
        .with_header("content-type", ct)
        .with_body(body)
        .expect(2)
        .create_async()
        .await;

    let summary = runtime::run_crawl(
        controls(&server.url(), "needle", 3),
        Arc::new(AtomicBool::new(false)),
    )
    .await
    .expect("crawl completes");

    assert_eq!(summary.pages_scanned, 3);
    assert!(summary.budget_exhausted);
    assert!(summary.matches.is_empty());

    root.assert_async().await;
    farm.assert_async().await;
}
