//! Crawl coordination: worker pool, budget enforcement, quiescence
//! detection, cancellation, and the final summary.

use crate::budget::CrawlBudget;
use crate::controls::CrawlControls;
use crate::fetch::{self, FetchError, Fetched, RetryPolicy};
use crate::frontier::{CrawlItem, Frontier};
use crate::html::{self, ExtractError};
use crate::normalizer;
use crate::search;
use crate::visited::VisitedSet;
use futures_util::future::join_all;
use reqwest::Client;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Builder;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

type DynError = Box<dyn Error + Send + Sync>;

/// A page whose visible text contained the search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    /// Normalized page URL.
    pub url: String,
    /// One context snippet per occurrence of the term.
    pub snippets: Vec<String>,
}

/// Counters and results returned when the crawl stops.
#[derive(Debug)]
pub struct CrawlSummary {
    /// Pages that consumed a budget slot (fetch attempted).
    pub pages_scanned: usize,
    /// Pages that came back as parseable HTML.
    pub pages_fetched: usize,
    /// Pages whose text matched the search term.
    pub pages_matched: usize,
    /// Pages that failed after exhausting retries.
    pub pages_failed: usize,
    /// True when the crawl stopped on external cancellation.
    pub cancelled: bool,
    /// True when the page budget ran out.
    pub budget_exhausted: bool,
    /// The match records, in no particular order.
    pub matches: Vec<MatchRecord>,
}

/// Entry point used by the binary: builds the multi-thread runtime, installs
/// the Ctrl-C listener, and drives the crawl to completion.
pub fn run(controls: CrawlControls) -> Result<CrawlSummary, DynError> {
    let runtime = Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async {
        let stop_requested = Arc::new(AtomicBool::new(false));
        let signal_stop = Arc::clone(&stop_requested);
        let signal_task = tokio::spawn(async move {
            // Repeat interrupts are absorbed: cancellation is idempotent.
            while tokio::signal::ctrl_c().await.is_ok() {
                if !signal_stop.swap(true, Ordering::AcqRel) {
                    warn!("cancellation requested; draining in-flight fetches");
                }
            }
        });

        let summary = run_crawl(controls, stop_requested).await;
        signal_task.abort();
        summary
    })
}

/// Runs the crawl with an externally owned cancellation flag.
///
/// Fails before any worker starts when the configuration is unusable; once
/// workers are running the crawl can only complete, exhaust its budget, or
/// get cancelled.
pub async fn run_crawl(
    controls: CrawlControls,
    stop_requested: Arc<AtomicBool>,
) -> Result<CrawlSummary, DynError> {
    if controls.thread_count() == 0 {
        return Err("thread count must be at least 1".into());
    }
    if controls.search_term().trim().is_empty() {
        return Err("search term must not be empty".into());
    }

    let start = Instant::now();
    let state = AppState::new(controls, stop_requested)?;

    // An unresolvable start host is a startup failure, surfaced before any
    // worker spawns; per-page DNS hiccups later are ordinary fetch errors.
    if !state.stop_requested.load(Ordering::Acquire) {
        let host = state.controls.allowed_host().to_string();
        let port = state
            .controls
            .start_url()
            .port_or_known_default()
            .unwrap_or(443);
        if let Err(err) = tokio::net::lookup_host((host.clone(), port)).await {
            return Err(format!("cannot resolve start host {host}: {err}").into());
        }
    }

    let seed = state.controls.start_url().as_str().to_string();
    state.visited.claim(&seed);
    state.frontier.push(CrawlItem::new(seed, 0));

    info!(
        term = state.controls.search_term(),
        host = state.controls.allowed_host(),
        max_pages = state.controls.max_pages(),
        "starting deep scan"
    );

    // First of {quiescence, cancellation} closes the frontier; close is
    // idempotent so the losing branch is harmless.
    let watchdog = {
        let frontier = Arc::clone(&state.frontier);
        let stop_requested = Arc::clone(&state.stop_requested);
        tokio::spawn(async move {
            tokio::select! {
                _ = frontier.idle() => debug!("frontier quiescent"),
                _ = wait_for_stop(stop_requested) => debug!("cancellation observed"),
            }
            frontier.close();
        })
    };

    let mut workers = Vec::with_capacity(state.controls.thread_count());
    for id in 0..state.controls.thread_count() {
        let state = state.clone();
        workers.push(tokio::spawn(worker_loop(id, state)));
    }

    join_all(workers).await;
    let _ = watchdog.await;

    state.metrics.report(start.elapsed());
    Ok(state.into_summary())
}

async fn wait_for_stop(stop_requested: Arc<AtomicBool>) {
    while !stop_requested.load(Ordering::Acquire) {
        sleep(STOP_POLL_INTERVAL).await;
    }
}

#[derive(Clone)]
struct AppState {
    frontier: Arc<Frontier>,
    visited: Arc<VisitedSet>,
    budget: Arc<CrawlBudget>,
    matches: Arc<Mutex<Vec<MatchRecord>>>,
    metrics: Arc<Metrics>,
    controls: Arc<CrawlControls>,
    client: Client,
    retry_policy: RetryPolicy,
    stop_requested: Arc<AtomicBool>,
}

impl AppState {
    fn new(controls: CrawlControls, stop_requested: Arc<AtomicBool>) -> Result<Self, DynError> {
        let client = fetch::build_client(controls.timeout())?;
        Ok(Self {
            frontier: Arc::new(Frontier::new()),
            visited: Arc::new(VisitedSet::new()),
            budget: Arc::new(CrawlBudget::new(controls.max_pages())),
            matches: Arc::new(Mutex::new(Vec::new())),
            metrics: Arc::new(Metrics::default()),
            retry_policy: RetryPolicy::new(controls.retries()),
            controls: Arc::new(controls),
            client,
            stop_requested,
        })
    }

    fn into_summary(self) -> CrawlSummary {
        let matches = {
            let mut guard = self.matches.lock().expect("match list lock poisoned");
            std::mem::take(&mut *guard)
        };
        CrawlSummary {
            pages_scanned: self.metrics.pages_scanned.load(Ordering::Relaxed),
            pages_fetched: self.metrics.pages_fetched.load(Ordering::Relaxed),
            pages_matched: self.metrics.pages_matched.load(Ordering::Relaxed),
            pages_failed: self.metrics.fetch_errors.load(Ordering::Relaxed)
                + self.metrics.parse_errors.load(Ordering::Relaxed),
            cancelled: self.stop_requested.load(Ordering::Acquire),
            budget_exhausted: self.budget.exhausted(),
            matches,
        }
    }
}

async fn worker_loop(worker_id: usize, state: AppState) {
    while let Some(item) = state.frontier.next_item().await {
        let _done = TaskDoneGuard::new(state.frontier.as_ref());
        if let Err(err) = process_item(&state, &item).await {
            warn!(worker = worker_id, url = %item.url, error = %err, "page failed");
            state.metrics.record_error(&err);
        }
    }
}

/// Processes one dequeued URL: reserve budget, fetch with retry, filter,
/// extract, evaluate the search predicate, and enqueue new in-scope links.
async fn process_item(state: &AppState, item: &CrawlItem) -> Result<(), TaskError> {
    if state.stop_requested.load(Ordering::Acquire) {
        return Ok(());
    }

    let base = Url::parse(&item.url).map_err(|_| TaskError::BadItemUrl(item.url.clone()))?;

    // Discovered links are extension-filtered before they are enqueued; this
    // covers the remaining way in, a seed URL pointing at a binary file.
    if state.controls.is_extension_banned(&base) {
        state.metrics.record_extension_skip();
        return Ok(());
    }

    let Some(page_number) = state.budget.reserve() else {
        state.metrics.record_budget_skip();
        return Ok(());
    };
    state.metrics.record_page_scanned();

    info!(
        depth = item.depth,
        "scanning page {page_number}/{}: {}",
        state.controls.max_pages(),
        item.url
    );

    let delay = state.controls.request_delay();
    if !delay.is_zero() {
        sleep(delay).await;
    }

    let body = match fetch::fetch_page(
        &state.client,
        &item.url,
        &state.retry_policy,
        &state.stop_requested,
    )
    .await
    {
        Ok(Fetched::Html { body }) => body,
        Ok(Fetched::NotHtml { content_type }) => {
            debug!(url = %item.url, content_type, "skipping non-html content");
            state.metrics.record_non_html_skip();
            return Ok(());
        }
        Err(FetchError::Cancelled) => return Ok(()),
        Err(err) => return Err(TaskError::Fetch(err)),
    };
    state.metrics.record_page_fetched();

    let content = html::extract(&body).map_err(TaskError::Extract)?;

    if search::matches(&content.text, state.controls.search_term()) {
        let snippets = search::snippets(
            &content.text,
            state.controls.search_term(),
            state.controls.snippet_radius(),
        );
        info!(url = %item.url, "match found");
        state.metrics.record_match();
        let mut matches = state.matches.lock().expect("match list lock poisoned");
        matches.push(MatchRecord {
            url: item.url.clone(),
            snippets,
        });
    }

    if state.budget.exhausted() {
        // No slot left for any discovered link; skip the expansion work.
        return Ok(());
    }

    for raw in &content.links {
        let Ok(candidate) = normalizer::normalize(&base, raw) else {
            // Malformed links are expected page content, not an error.
            continue;
        };
        if !state.controls.is_same_site(&candidate) {
            continue;
        }
        if state.controls.is_extension_banned(&candidate) {
            state.metrics.record_extension_skip();
            continue;
        }
        if !state.visited.claim(candidate.as_str()) {
            state.metrics.record_duplicate();
            continue;
        }
        if !state
            .frontier
            .push(CrawlItem::new(candidate.as_str(), item.depth + 1))
        {
            break;
        }
        state.metrics.record_link_enqueued();
    }

    Ok(())
}

/// Balances the frontier's unfinished-work count when a worker finishes an
/// item, no matter how processing exited.
struct TaskDoneGuard<'a> {
    frontier: &'a Frontier,
}

impl<'a> TaskDoneGuard<'a> {
    fn new(frontier: &'a Frontier) -> Self {
        Self { frontier }
    }
}

impl Drop for TaskDoneGuard<'_> {
    fn drop(&mut self) {
        self.frontier.task_done();
    }
}

#[derive(Debug)]
enum TaskError {
    Fetch(FetchError),
    Extract(ExtractError),
    BadItemUrl(String),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(err) => write!(f, "fetch failed: {err}"),
            Self::Extract(err) => write!(f, "extraction failed: {err}"),
            Self::BadItemUrl(url) => write!(f, "frontier item is not a url: {url}"),
        }
    }
}

#[derive(Default)]
struct Metrics {
    pages_scanned: AtomicUsize,
    pages_fetched: AtomicUsize,
    pages_matched: AtomicUsize,
    fetch_errors: AtomicUsize,
    parse_errors: AtomicUsize,
    skipped_non_html: AtomicUsize,
    skipped_extensions: AtomicUsize,
    skipped_over_budget: AtomicUsize,
    duplicate_links: AtomicUsize,
    links_enqueued: AtomicUsize,
}

impl Metrics {
    fn record_page_scanned(&self) {
        self.pages_scanned.fetch_add(1, Ordering::Relaxed);
    }

    fn record_page_fetched(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    fn record_match(&self) {
        self.pages_matched.fetch_add(1, Ordering::Relaxed);
    }

    fn record_non_html_skip(&self) {
        self.skipped_non_html.fetch_add(1, Ordering::Relaxed);
    }

    fn record_extension_skip(&self) {
        self.skipped_extensions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_budget_skip(&self) {
        self.skipped_over_budget.fetch_add(1, Ordering::Relaxed);
    }

    fn record_duplicate(&self) {
        self.duplicate_links.fetch_add(1, Ordering::Relaxed);
    }

    fn record_link_enqueued(&self) {
        self.links_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self, err: &TaskError) {
        match err {
            TaskError::Fetch(_) => {
                self.fetch_errors.fetch_add(1, Ordering::Relaxed);
            }
            TaskError::Extract(_) | TaskError::BadItemUrl(_) => {
                self.parse_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn report(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f32().max(f32::EPSILON);
        println!("--- crawl summary ({secs:.2}s) ---");
        println!(
            "pages scanned: {}",
            self.pages_scanned.load(Ordering::Relaxed)
        );
        println!(
            "pages fetched: {}",
            self.pages_fetched.load(Ordering::Relaxed)
        );
        println!(
            "pages matched: {}",
            self.pages_matched.load(Ordering::Relaxed)
        );
        println!("fetch errors: {}", self.fetch_errors.load(Ordering::Relaxed));
        println!("parse errors: {}", self.parse_errors.load(Ordering::Relaxed));
        println!(
            "non-html skips: {}",
            self.skipped_non_html.load(Ordering::Relaxed)
        );
        println!(
            "banned-extension skips: {}",
            self.skipped_extensions.load(Ordering::Relaxed)
        );
        println!(
            "over-budget skips: {}",
            self.skipped_over_budget.load(Ordering::Relaxed)
        );
        println!(
            "duplicate links: {}",
            self.duplicate_links.load(Ordering::Relaxed)
        );
        println!(
            "links enqueued: {}",
            self.links_enqueued.load(Ordering::Relaxed)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::Cli;
    use clap::Parser;

    fn controls_for(url: &str) -> CrawlControls {
        let cli = Cli::parse_from([
            "deepscan",
            "--request-delay-ms",
            "0",
            "--max-pages",
            "5",
            "--thread-count",
            "4",
        ]);
        cli.build_controls(Url::parse(url).unwrap(), "hello".to_string())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn zero_thread_count_is_a_startup_error() {
        let cli = Cli::parse_from(["deepscan", "--thread-count", "0"]);
        let controls = cli.build_controls(
            Url::parse("https://example.com/").unwrap(),
            "hello".to_string(),
        );
        let result = run_crawl(controls, Arc::new(AtomicBool::new(false))).await;
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn empty_search_term_is_a_startup_error() {
        let cli = Cli::parse_from(["deepscan"]);
        let controls = cli.build_controls(
            Url::parse("https://example.com/").unwrap(),
            "  ".to_string(),
        );
        let result = run_crawl(controls, Arc::new(AtomicBool::new(false))).await;
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pre_cancelled_crawl_terminates_without_fetching() {
        let stop = Arc::new(AtomicBool::new(true));
        let summary = run_crawl(controls_for("https://example.com/"), stop)
            .await
            .expect("cancelled crawl still returns a summary");

        assert!(summary.cancelled);
        assert_eq!(summary.pages_scanned, 0);
        assert!(summary.matches.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unreachable_host_is_a_failed_page_not_a_crash() {
        // Nothing listens on the discard port; the connection is refused
        // locally, so no traffic leaves the machine.
        let summary = run_crawl(
            controls_for("http://127.0.0.1:9/"),
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .expect("fetch failures never abort the crawl");

        assert_eq!(summary.pages_scanned, 1);
        assert_eq!(summary.pages_fetched, 0);
        assert_eq!(summary.pages_failed, 1);
        assert!(summary.matches.is_empty());
        assert!(!summary.cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unresolvable_start_host_fails_before_workers() {
        // The .invalid TLD never resolves.
        let result = run_crawl(
            controls_for("https://no-such-host.invalid/"),
            Arc::new(AtomicBool::new(false)),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn task_done_guard_balances_the_frontier() {
        let frontier = Frontier::new();
        frontier.push(CrawlItem::new("https://example.com/", 0));
        let _ = frontier.next_item().await;
        {
            let _guard = TaskDoneGuard::new(&frontier);
        }
        frontier.idle().await;
    }
}
