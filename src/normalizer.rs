//! URL canonicalization for frontier admission.
//!
//! Every URL entering the crawl passes through [`normalize`] first, so the
//! visited set and the frontier only ever see one spelling of a page address:
//! lowercase scheme and host, no fragment, and a trailing-slash-normalized
//! path. Equality on the returned string is equality of crawl targets.

use std::error::Error;
use std::fmt;
use url::Url;

/// Schemes a link may resolve to; anything else is rejected.
const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

/// Errors produced while canonicalizing a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// The input string was empty or whitespace.
    Empty,
    /// The input did not parse as a URL, even relative to its base.
    Malformed(String),
    /// The URL resolved to a non-HTTP(S) scheme such as `mailto:`.
    UnsupportedScheme(String),
    /// The URL carries no host to restrict the crawl to.
    MissingHost,
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty url"),
            Self::Malformed(raw) => write!(f, "malformed url: {raw}"),
            Self::UnsupportedScheme(scheme) => write!(f, "unsupported scheme: {scheme}"),
            Self::MissingHost => write!(f, "url has no host"),
        }
    }
}

impl Error for NormalizeError {}

/// Resolves `raw` relative to `base` and returns the canonical URL.
///
/// Fragments are stripped (two URLs differing only by `#...` name the same
/// page), the scheme and host are lowercased by the parser, and the path is
/// trailing-slash-normalized. Path and query keep their case. The returned
/// URL's `as_str()` is the comparable form used for claims and frontier
/// entries.
pub fn normalize(base: &Url, raw: &str) -> Result<Url, NormalizeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::Empty);
    }

    let mut resolved = base
        .join(trimmed)
        .map_err(|_| NormalizeError::Malformed(trimmed.to_string()))?;

    if !ALLOWED_SCHEMES.contains(&resolved.scheme()) {
        return Err(NormalizeError::UnsupportedScheme(
            resolved.scheme().to_string(),
        ));
    }
    if resolved.host_str().is_none() {
        return Err(NormalizeError::MissingHost);
    }

    resolved.set_fragment(None);
    let canonical = canonical_string(&resolved);
    Url::parse(&canonical).map_err(|_| NormalizeError::Malformed(trimmed.to_string()))
}

/// Canonicalizes the user-supplied start URL.
///
/// Unlike link normalization this tolerates a missing scheme, defaulting to
/// `https://` so a bare `example.com` works at the prompt.
pub fn normalize_start_url(raw: &str) -> Result<Url, NormalizeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::Empty);
    }

    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let mut parsed =
        Url::parse(&with_scheme).map_err(|_| NormalizeError::Malformed(trimmed.to_string()))?;
    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(NormalizeError::UnsupportedScheme(parsed.scheme().to_string()));
    }
    if parsed.host_str().is_none() {
        return Err(NormalizeError::MissingHost);
    }

    parsed.set_fragment(None);
    let canonical = canonical_string(&parsed);
    Url::parse(&canonical).map_err(|_| NormalizeError::Malformed(trimmed.to_string()))
}

/// Renders a parsed URL in its comparable form: `/x/` and `/x` collapse to
/// the same entry, an empty path becomes `/`, and the query survives.
fn canonical_string(url: &Url) -> String {
    let mut out = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }

    let path = url.path();
    let path = path.strip_suffix('/').filter(|p| !p.is_empty()).unwrap_or(path);
    if path.is_empty() {
        out.push('/');
    } else {
        out.push_str(path);
    }

    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    out
}
