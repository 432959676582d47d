//! Crawl configuration and the command-line surface that builds it.

use clap::Parser;
use std::time::Duration;
use url::Url;

/// Default banned path suffixes: binary, media, and asset files that are
/// never HTML and not worth a request.
pub const DEFAULT_BANNED_EXTENSIONS: &str = ".png,.jpg,.jpeg,.gif,.pdf,.doc,.docx,\
.xls,.xlsx,.ppt,.pptx,.mp3,.mp4,.zip,.tar,.gz,.exe,.svg,.css,.js,.ico,.webp";

/// Immutable configuration shared by every worker for the crawl's lifetime.
#[derive(Clone, Debug)]
pub struct CrawlControls {
    start_url: Url,
    search_term: String,
    timeout: Duration,
    max_pages: usize,
    thread_count: usize,
    banned_extensions: Vec<String>,
    request_delay: Duration,
    snippet_radius: usize,
    retries: u32,
}

impl CrawlControls {
    /// Constructs a new set of crawl controls.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        start_url: Url,
        search_term: String,
        timeout: Duration,
        max_pages: usize,
        thread_count: usize,
        banned_extensions: Vec<String>,
        request_delay: Duration,
        snippet_radius: usize,
        retries: u32,
    ) -> Self {
        Self {
            start_url,
            search_term,
            timeout,
            max_pages,
            thread_count,
            banned_extensions,
            request_delay,
            snippet_radius,
            retries,
        }
    }

    /// The normalized URL the crawl starts from.
    pub fn start_url(&self) -> &Url {
        &self.start_url
    }

    /// The term pages are searched for.
    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    /// Host the crawl is restricted to (the start URL's host).
    pub fn allowed_host(&self) -> &str {
        self.start_url.host_str().unwrap_or_default()
    }

    /// Per-fetch network timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Hard ceiling on pages fetched this run.
    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Worker pool size.
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Path suffixes skipped without fetching.
    pub fn banned_extensions(&self) -> &[String] {
        &self.banned_extensions
    }

    /// Delay before each fetch.
    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }

    /// Characters of context kept around each match.
    pub fn snippet_radius(&self) -> usize {
        self.snippet_radius
    }

    /// Re-attempts after a transient fetch failure.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Domain restriction: same host and same effective port as the start URL.
    pub fn is_same_site(&self, url: &Url) -> bool {
        url.host_str() == self.start_url.host_str()
            && url.port_or_known_default() == self.start_url.port_or_known_default()
    }

    /// True when the URL's path ends in a banned suffix.
    pub fn is_extension_banned(&self, url: &Url) -> bool {
        let path = url.path().to_ascii_lowercase();
        self.banned_extensions.iter().any(|ext| path.ends_with(ext))
    }
}

/// Command-line interface for the crawler binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "deepscan",
    about = "Crawl a site and report pages containing a search term"
)]
pub struct Cli {
    /// Start URL; prompted for on stdin when omitted
    pub start_url: Option<String>,

    /// Search term; prompted for on stdin when omitted
    pub search_term: Option<String>,

    /// Per-fetch timeout in seconds
    #[arg(long, env = "DEEPSCAN_TIMEOUT_SECS", default_value_t = 8)]
    pub timeout_secs: u64,

    /// Maximum pages fetched per run
    #[arg(long, env = "DEEPSCAN_MAX_PAGES", default_value_t = 500)]
    pub max_pages: usize,

    /// Number of concurrent workers
    #[arg(long, env = "DEEPSCAN_THREADS", default_value_t = 20)]
    pub thread_count: usize,

    /// Path suffixes to skip, comma separated
    #[arg(long, env = "DEEPSCAN_BANNED_EXTENSIONS", default_value = DEFAULT_BANNED_EXTENSIONS)]
    pub banned_extensions: String,

    /// Milliseconds to wait before each fetch
    #[arg(long, env = "DEEPSCAN_REQUEST_DELAY_MS", default_value_t = 200)]
    pub request_delay_ms: u64,

    /// Characters of context around each match snippet
    #[arg(long, env = "DEEPSCAN_SNIPPET_RADIUS", default_value_t = 50)]
    pub snippet_radius: usize,

    /// Retries after a transient fetch failure
    #[arg(long, env = "DEEPSCAN_RETRIES", default_value_t = 2)]
    pub retries: u32,
}

impl Cli {
    /// Converts the parsed CLI plus the two required inputs into controls.
    pub fn build_controls(&self, start_url: Url, search_term: String) -> CrawlControls {
        CrawlControls::new(
            start_url,
            search_term,
            Duration::from_secs(self.timeout_secs),
            self.max_pages,
            self.thread_count,
            self.extensions_vec(),
            Duration::from_millis(self.request_delay_ms),
            self.snippet_radius,
            self.retries,
        )
    }

    fn extensions_vec(&self) -> Vec<String> {
        self.banned_extensions
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with('.') {
                    s
                } else {
                    format!(".{s}")
                }
            })
            .collect()
    }
}
