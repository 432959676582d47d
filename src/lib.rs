#![warn(missing_docs)]
//! Core library entry points for the deepscan crawler.

pub mod budget;
pub mod controls;
pub mod fetch;
pub mod frontier;
pub mod html;
pub mod normalizer;
pub mod runtime;
pub mod search;
pub mod visited;

pub use budget::CrawlBudget;
pub use controls::{Cli, CrawlControls, DEFAULT_BANNED_EXTENSIONS};
pub use fetch::{FetchError, RetryDecision, RetryPolicy};
pub use frontier::{CrawlItem, Frontier};
pub use normalizer::{normalize, normalize_start_url, NormalizeError};
pub use runtime::{run as run_crawler, CrawlSummary, MatchRecord};
pub use visited::VisitedSet;
