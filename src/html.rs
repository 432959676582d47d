//! HTML extraction over buffered page bodies.
//!
//! Link extraction streams the body through a `lol_html` rewriter; visible
//! text uses a `scraper` DOM walk, which is the simpler tool for read-only
//! traversal and decodes entities during parsing.

use lol_html::{element, HtmlRewriter, OutputSink, Settings};
use scraper::{Html, Node};
use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::rc::Rc;

/// Tags whose subtree text is not user-visible page content.
const INVISIBLE_TAGS: [&str; 5] = ["script", "style", "nav", "footer", "header"];

/// Extraction results for one fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    /// `href` value of every anchor on the page, in document order.
    pub links: Vec<String>,
    /// Visible text with entities decoded and whitespace collapsed.
    pub text: String,
}

/// Errors surfaced while extracting page content.
#[derive(Debug)]
pub enum ExtractError {
    /// The HTML rewriter encountered markup it could not process.
    Rewrite(lol_html::errors::RewritingError),
    /// The link collector was still shared after the rewriter finished.
    CollectorInUse,
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rewrite(err) => write!(f, "html rewrite error: {err}"),
            Self::CollectorInUse => write!(f, "link collector still in use"),
        }
    }
}

impl Error for ExtractError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Rewrite(err) => Some(err),
            Self::CollectorInUse => None,
        }
    }
}

impl From<lol_html::errors::RewritingError> for ExtractError {
    fn from(err: lol_html::errors::RewritingError) -> Self {
        Self::Rewrite(err)
    }
}

/// Extracts anchors and visible text from a buffered HTML body.
pub fn extract(body: &[u8]) -> Result<PageContent, ExtractError> {
    Ok(PageContent {
        links: extract_links(body)?,
        text: visible_text(body),
    })
}

/// Collects the `href` value of every `<a>` element.
///
/// Anchors inside navigation or footer chrome count: they are still links
/// the crawl must follow, even though their text is excluded from matching.
pub fn extract_links(body: &[u8]) -> Result<Vec<String>, ExtractError> {
    let links: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let links_handle = Rc::clone(&links);

    let handler = element!("a[href]", move |el| {
        if let Some(href) = el.get_attribute("href") {
            // Attribute values arrive in source form; `&amp;` in a query
            // string must become `&` before URL resolution.
            let href = html_escape::decode_html_entities(&href).into_owned();
            links_handle.borrow_mut().push(href);
        }
        Ok(())
    });

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![handler],
            ..Settings::default()
        },
        NoopSink,
    );
    rewriter.write(body)?;
    rewriter.end()?;

    Rc::try_unwrap(links)
        .map(RefCell::into_inner)
        .map_err(|_| ExtractError::CollectorInUse)
}

/// Returns the page's visible text: text nodes outside script/style and
/// page chrome, whitespace runs collapsed to single spaces.
pub fn visible_text(body: &[u8]) -> String {
    let document = Html::parse_document(&String::from_utf8_lossy(body));

    let mut out = String::new();
    for node in document.tree.nodes() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let invisible = node.ancestors().any(|ancestor| {
            matches!(ancestor.value(), Node::Element(el) if INVISIBLE_TAGS.contains(&el.name()))
        });
        if !invisible {
            out.push_str(text);
            out.push(' ');
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct NoopSink;

impl OutputSink for NoopSink {
    fn handle_chunk(&mut self, _chunk: &[u8]) {}
}
