//! HTTP fetching with a classified, testable retry policy.

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;

const USER_AGENT: &str = "deepscan/0.1 (bounded site search crawler)";

/// Server statuses that indicate a transient condition worth backing off for.
const RETRYABLE_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Builds the pooled HTTP client every worker shares.
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(timeout)
        .build()
}

/// Outcome of a successful request.
#[derive(Debug)]
pub enum Fetched {
    /// An HTML response body, buffered for extraction and matching.
    Html {
        /// Raw response bytes.
        body: Vec<u8>,
    },
    /// A non-HTML response, skipped before any parse attempt.
    NotHtml {
        /// The reported Content-Type (empty when the header is missing).
        content_type: String,
    },
}

/// Errors a fetch attempt can fail with.
#[derive(Debug)]
pub enum FetchError {
    /// The per-attempt timeout elapsed.
    Timeout,
    /// Connection, DNS, or protocol failure.
    Network(reqwest::Error),
    /// A transient 5xx server status (500, 502, 503, 504).
    ServerError(u16),
    /// Any other non-success status; not retried.
    HttpStatus(u16),
    /// Cancellation was requested before the attempt started.
    Cancelled,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::Network(err) => write!(f, "network error: {err}"),
            Self::ServerError(status) => write!(f, "server error: HTTP {status}"),
            Self::HttpStatus(status) => write!(f, "unexpected status: HTTP {status}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl Error for FetchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Network(err) => Some(err),
            _ => None,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-issue the request immediately.
    RetryNow,
    /// Sleep, then re-issue.
    RetryAfter(Duration),
    /// Stop retrying and report the failure.
    GiveUp,
}

/// Retry policy: attempt ceiling, error classification, backoff curve.
///
/// Kept as a plain value so the behavior is unit-testable without a network.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_base: Duration,
}

impl RetryPolicy {
    /// Policy with `max_retries` re-attempts after the first failure.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_base: Duration::from_secs(1),
        }
    }

    /// Classifies a failure on 1-based attempt number `attempt`.
    ///
    /// Network trouble and timeouts are re-issued immediately; transient
    /// server errors back off exponentially (1s, 2s, ...); everything else
    /// fails at once.
    pub fn decide(&self, attempt: u32, error: &FetchError) -> RetryDecision {
        if attempt > self.max_retries {
            return RetryDecision::GiveUp;
        }
        match error {
            FetchError::Timeout | FetchError::Network(_) => RetryDecision::RetryNow,
            FetchError::ServerError(_) => RetryDecision::RetryAfter(self.backoff(attempt)),
            FetchError::HttpStatus(_) | FetchError::Cancelled => RetryDecision::GiveUp,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Fetches one URL, applying the retry policy until success or give-up.
///
/// `stop_requested` is consulted before every attempt and before every
/// backoff sleep; once set, the fetch aborts with [`FetchError::Cancelled`]
/// without issuing further requests.
pub async fn fetch_page(
    client: &Client,
    url: &str,
    policy: &RetryPolicy,
    stop_requested: &AtomicBool,
) -> Result<Fetched, FetchError> {
    let mut attempt = 0u32;
    loop {
        if stop_requested.load(Ordering::Acquire) {
            return Err(FetchError::Cancelled);
        }
        attempt += 1;

        let error = match attempt_fetch(client, url).await {
            Ok(fetched) => return Ok(fetched),
            Err(error) => error,
        };

        match policy.decide(attempt, &error) {
            RetryDecision::GiveUp => return Err(error),
            RetryDecision::RetryNow => {}
            RetryDecision::RetryAfter(delay) => {
                if stop_requested.load(Ordering::Acquire) {
                    return Err(FetchError::Cancelled);
                }
                sleep(delay).await;
            }
        }
    }
}

async fn attempt_fetch(client: &Client, url: &str) -> Result<Fetched, FetchError> {
    let response = client.get(url).send().await.map_err(classify)?;
    let status = response.status().as_u16();

    if RETRYABLE_STATUSES.contains(&status) {
        return Err(FetchError::ServerError(status));
    }
    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(status));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !content_type.contains("text/html") {
        return Ok(Fetched::NotHtml { content_type });
    }

    let body = response.bytes().await.map_err(classify)?;
    Ok(Fetched::Html {
        body: body.to_vec(),
    })
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err)
    }
}
