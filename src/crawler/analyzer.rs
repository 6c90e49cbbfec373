//! Structural analysis of a parsed page
//!
//! Everything in this module is pure: given the same document and base URL it
//! always produces the same [`PageAnalysis`].

use scraper::node::Node;
use scraper::{Html, Selector};
use std::fmt;
use url::Url;

/// Selector group matching any login-form signal
const LOGIN_FORM_SELECTOR: &str = "input[type='password'], input[name*='password'], \
     input[id*='password'], form[action*='login'], form[id*='login'], form[class*='login']";

/// Best-effort HTML flavor detected for a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HtmlVersion {
    Html5,
    Xhtml,
    Html4,
    Unknown,
}

impl HtmlVersion {
    /// Classifies a document from the signals the analyzer collects
    ///
    /// Precedence is fixed: an HTML5 doctype wins over an XHTML namespace,
    /// which wins over the mere presence of a root element.
    pub fn from_signals(html5_doctype: bool, root_present: bool, root_xmlns: Option<&str>) -> Self {
        if html5_doctype {
            Self::Html5
        } else if root_xmlns.is_some_and(|ns| ns.contains("xhtml")) {
            Self::Xhtml
        } else if root_present {
            Self::Html4
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html5 => "HTML5",
            Self::Xhtml => "XHTML",
            Self::Html4 => "HTML4",
            Self::Unknown => "Unknown",
        }
    }

    /// Parses the stored label, falling back to `Unknown`
    pub fn from_label(label: &str) -> Self {
        match label {
            "HTML5" => Self::Html5,
            "XHTML" => Self::Xhtml,
            "HTML4" => Self::Html4,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for HtmlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-level heading counts, index 0 holding `<h1>`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadingCounts(pub [u32; 6]);

impl HeadingCounts {
    /// Count for heading `level` (1..=6); other levels report zero
    pub fn level(&self, level: usize) -> u32 {
        match level {
            1..=6 => self.0[level - 1],
            _ => 0,
        }
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }
}

/// Whether a link stays on the crawled host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkScope {
    Internal,
    External,
}

/// Structural metadata extracted from one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageAnalysis {
    /// Text of the first `<title>`, empty if absent
    pub title: String,
    pub html_version: HtmlVersion,
    pub headings: HeadingCounts,
    pub internal_links: u32,
    pub external_links: u32,
    pub has_login_form: bool,
}

/// Everything persisted for a completed crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMetadata {
    pub analysis: PageAnalysis,
    /// Number of broken links found by the scan
    pub broken_links: u32,
}

/// Analyzes a parsed document
///
/// # Arguments
///
/// * `document` - The parsed page
/// * `base_url` - The address the page was requested from, used to resolve
///   relative links
///
/// # Example
///
/// ```
/// use scraper::Html;
/// use sitelens::crawler::{analyze_document, HtmlVersion};
/// use url::Url;
///
/// let html = Html::parse_document(
///     r#"<!DOCTYPE html><html><head><title>Hi</title></head><body><h1>A</h1></body></html>"#,
/// );
/// let base = Url::parse("https://example.com/").unwrap();
/// let analysis = analyze_document(&html, &base);
/// assert_eq!(analysis.title, "Hi");
/// assert_eq!(analysis.html_version, HtmlVersion::Html5);
/// assert_eq!(analysis.headings.level(1), 1);
/// ```
pub fn analyze_document(document: &Html, base_url: &Url) -> PageAnalysis {
    let (internal_links, external_links) = count_links(document, base_url);

    PageAnalysis {
        title: extract_title(document),
        html_version: detect_html_version(document),
        headings: count_headings(document),
        internal_links,
        external_links,
        has_login_form: has_login_form(document),
    }
}

fn extract_title(document: &Html) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };

    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>())
        .unwrap_or_default()
}

fn detect_html_version(document: &Html) -> HtmlVersion {
    let html5_doctype = document
        .tree
        .root()
        .children()
        .any(|node| match node.value() {
            Node::Doctype(doctype) => {
                doctype.name().eq_ignore_ascii_case("html")
                    && doctype.public_id().is_empty()
                    && (doctype.system_id().is_empty()
                        || doctype.system_id() == "about:legacy-compat")
            }
            _ => false,
        });

    let root = Selector::parse("html")
        .ok()
        .and_then(|selector| document.select(&selector).next());

    HtmlVersion::from_signals(
        html5_doctype,
        root.is_some(),
        root.and_then(|element| element.value().attr("xmlns")),
    )
}

fn count_headings(document: &Html) -> HeadingCounts {
    let mut counts = [0u32; 6];

    for (index, count) in counts.iter_mut().enumerate() {
        if let Ok(selector) = Selector::parse(&format!("h{}", index + 1)) {
            *count = document.select(&selector).count() as u32;
        }
    }

    HeadingCounts(counts)
}

/// Counts `(internal, external)` links over anchors that carry an `href`
fn count_links(document: &Html, base_url: &Url) -> (u32, u32) {
    let Ok(selector) = Selector::parse("a[href]") else {
        return (0, 0);
    };

    let mut internal = 0;
    let mut external = 0;

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };

        match classify_link(href, base_url) {
            Some(LinkScope::Internal) => internal += 1,
            Some(LinkScope::External) => external += 1,
            None => {}
        }
    }

    (internal, external)
}

/// Classifies a single `href` relative to the page it was found on
///
/// Relative references are resolved against `base_url` first, so a path like
/// `/x` is always internal. Absolute links are internal only when their host
/// (and explicit port) equal the base's. Returns `None` for unparsable hrefs.
///
/// ```
/// use sitelens::crawler::{classify_link, LinkScope};
/// use url::Url;
///
/// let base = Url::parse("https://a.example/page").unwrap();
/// assert_eq!(classify_link("/x", &base), Some(LinkScope::Internal));
/// assert_eq!(classify_link("https://b.example/y", &base), Some(LinkScope::External));
/// ```
pub fn classify_link(href: &str, base_url: &Url) -> Option<LinkScope> {
    let href = href.trim();

    let resolved = match Url::parse(href) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base_url.join(href).ok()?,
        Err(_) => return None,
    };

    if resolved.host_str() == base_url.host_str() && resolved.port() == base_url.port() {
        Some(LinkScope::Internal)
    } else {
        Some(LinkScope::External)
    }
}

fn has_login_form(document: &Html) -> bool {
    Selector::parse(LOGIN_FORM_SELECTOR)
        .map(|selector| document.select(&selector).next().is_some())
        .unwrap_or(false)
}
