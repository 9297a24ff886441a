//! Pulls title, description, `<h1>` text and classified links out of a page.
//!
//! The document is walked once, depth-first, with an explicit stack so that
//! deeply nested markup cannot exhaust the call stack.

use html5ever::tendril::TendrilSink;
use html5ever::{Attribute, ns, parse_document};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

use crate::data_models::ParsedPage;

/// Upper bound on DOM nodes visited for a single page.
pub const MAX_NODES: usize = 500_000;

const HEADING_SEPARATOR: &str = ", ";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid base url {url:?}: {source}")]
    InvalidBase {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to read html: {0}")]
    Io(#[from] std::io::Error),

    #[error("document exceeds {0} nodes")]
    TooManyNodes(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    Internal(String),
    External(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Context {
    Body,
    Title,
    Heading(usize),
}

#[derive(Default)]
struct Collected {
    title: String,
    title_seen: bool,
    description: Option<String>,
    headings: Vec<String>,
    internal: Vec<String>,
    external: Vec<String>,
}

impl Collected {
    fn into_page(self, duration: Duration) -> ParsedPage {
        let headings = self
            .headings
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .collect::<Vec<&str>>()
            .join(HEADING_SEPARATOR);

        ParsedPage {
            title: self.title.trim().to_string(),
            description: self.description.unwrap_or_default(),
            headings,
            internal_links: self.internal,
            external_links: self.external,
            duration,
        }
    }
}

pub fn get_dom(html: &str) -> Result<RcDom, ExtractError> {
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut std::io::Cursor::new(html))?;
    Ok(dom)
}

/// Parses `html` and extracts page data. `base_url` is the fetched URL; it
/// resolves relative links and decides which links are internal.
pub fn extract(html: &str, base_url: &str) -> Result<ParsedPage, ExtractError> {
    extract_with_limit(html, base_url, MAX_NODES)
}

pub fn extract_with_limit(
    html: &str,
    base_url: &str,
    max_nodes: usize,
) -> Result<ParsedPage, ExtractError> {
    let base = Url::parse(base_url).map_err(|source| ExtractError::InvalidBase {
        url: base_url.to_string(),
        source,
    })?;
    let dom = get_dom(html)?;

    let started = Instant::now();
    let mut out = Collected::default();
    walk_html(&dom.document, &base, &mut out, max_nodes)?;
    Ok(out.into_page(started.elapsed()))
}

fn walk_html(
    root: &Handle,
    base: &Url,
    out: &mut Collected,
    max_nodes: usize,
) -> Result<(), ExtractError> {
    let mut stack = vec![(root.clone(), Context::Body)];
    let mut visited = 0_usize;

    while let Some((node, ctx)) = stack.pop() {
        visited += 1;
        if visited > max_nodes {
            return Err(ExtractError::TooManyNodes(max_nodes));
        }

        let mut child_ctx = ctx;
        match &node.data {
            NodeData::Text { contents } => match ctx {
                Context::Title => out.title.push_str(&contents.borrow()),
                Context::Heading(idx) => out.headings[idx].push_str(&contents.borrow()),
                Context::Body => {}
            },
            NodeData::Element { name, attrs, .. } if name.ns == ns!(html) => {
                let attrs = attrs.borrow();
                match &*name.local {
                    "title" if !out.title_seen => {
                        out.title_seen = true;
                        child_ctx = Context::Title;
                    }
                    "h1" => {
                        out.headings.push(String::new());
                        child_ctx = Context::Heading(out.headings.len() - 1);
                    }
                    "meta" if out.description.is_none() => {
                        let is_description = attr(&attrs, "name")
                            .is_some_and(|n| n.trim().eq_ignore_ascii_case("description"));
                        if is_description {
                            out.description =
                                Some(attr(&attrs, "content").unwrap_or_default().to_string());
                        }
                    }
                    "a" => {
                        if let Some(href) = attr(&attrs, "href") {
                            match classify_link(base, href) {
                                Some(Link::Internal(url)) => out.internal.push(url),
                                Some(Link::External(url)) => out.external.push(url),
                                None => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }

        // reversed so children pop in document order
        for child in node.children.borrow().iter().rev() {
            stack.push((child.clone(), child_ctx));
        }
    }
    Ok(())
}

fn attr<'a>(attrs: &'a [Attribute], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|a| &*a.name.local == key)
        .map(|a| &*a.value)
}

fn is_excluded(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    lower.starts_with('#')
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("javascript:")
        || lower.ends_with(".pdf")
        || lower.ends_with(".md")
}

fn same_host(a: &Url, b: &Url) -> bool {
    a.host_str() == b.host_str() && a.port() == b.port()
}

/// Decides whether `href` found on `base` is followed, and as what.
///
/// Absolute links keep their original spelling; relative links are resolved
/// against `base` and are always internal.
pub fn classify_link(base: &Url, href: &str) -> Option<Link> {
    let href = href.trim();
    if is_excluded(href) {
        return None;
    }
    match Url::parse(href) {
        Ok(absolute) if same_host(&absolute, base) => Some(Link::Internal(href.to_string())),
        Ok(_) => Some(Link::External(href.to_string())),
        Err(url::ParseError::RelativeUrlWithoutBase) => base
            .join(href)
            .ok()
            .map(|resolved| Link::Internal(resolved.to_string())),
        Err(_) => None,
    }
}
