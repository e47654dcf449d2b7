//! Content extraction: raw markup or pre-extracted text → [`NormalizedDocument`].
//!
//! Extraction is a pluggable strategy behind the [`Extractor`] trait. The
//! default [`HeuristicExtractor`] locates the main content node through an
//! ordered list of [`ContentHint`]s, strips non-content elements, and runs
//! the shared whitespace normalization. Pre-extracted text (e.g. from PDFs)
//! only goes through normalization.
//!
//! An empty result is not an error: the orchestrator applies the
//! minimum-content threshold.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};

use crate::error::ExtractError;
use crate::models::{DocumentMetadata, NormalizedDocument, RawDocument};
use crate::normalize::normalize_text;

pub const MIME_HTML: &str = "text/html";
pub const MIME_XHTML: &str = "application/xhtml+xml";
pub const MIME_TEXT: &str = "text/plain";

/// Elements whose subtree never contributes text.
const STRIPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "noscript", "template",
];

/// Elements that start and end a line of output.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "form", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "li", "main",
    "ol", "p", "pre", "section", "table", "tbody", "td", "th", "thead", "tr", "ul",
];

/// Block elements followed by a blank line.
const PARAGRAPH_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "p", "section", "article"];

/// A strategy that turns one raw document into normalized text + metadata.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, raw: &RawDocument) -> Result<NormalizedDocument, ExtractError>;
}

/// How the input should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Markup,
    Text,
}

impl ContentKind {
    /// Classify a MIME type; parameters such as `; charset=utf-8` are ignored.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            MIME_HTML | MIME_XHTML => Some(ContentKind::Markup),
            m if m.starts_with("text/") => Some(ContentKind::Text),
            _ => None,
        }
    }
}

/// One structural hint for locating the main content node.
#[derive(Debug, Clone)]
pub enum ContentHint {
    /// First `tag` element whose `class` attribute matches `pattern`.
    Class { tag: String, pattern: Regex },
    /// First `tag` element whose `id` attribute matches `pattern`.
    Id { tag: String, pattern: Regex },
    /// First element with this tag name.
    Tag(String),
}

impl ContentHint {
    pub fn class(tag: &str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(ContentHint::Class {
            tag: tag.to_string(),
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn id(tag: &str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(ContentHint::Id {
            tag: tag.to_string(),
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn tag(tag: &str) -> Self {
        ContentHint::Tag(tag.to_string())
    }

    fn candidates<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        let (tag, attr, pattern) = match self {
            ContentHint::Class { tag, pattern } => (tag, Some("class"), Some(pattern)),
            ContentHint::Id { tag, pattern } => (tag, Some("id"), Some(pattern)),
            ContentHint::Tag(tag) => (tag, None, None),
        };
        let Ok(selector) = Selector::parse(tag) else {
            return Vec::new();
        };
        doc.select(&selector)
            .filter(|el| match (attr, pattern) {
                (Some(attr), Some(pattern)) => el
                    .value()
                    .attr(attr)
                    .is_some_and(|value| pattern.is_match(value)),
                _ => true,
            })
            .collect()
    }
}

/// The standard hint list, semantic containers first.
pub fn default_hints() -> Vec<ContentHint> {
    vec![
        ContentHint::Class {
            tag: "div".to_string(),
            pattern: Regex::new(r"(?i)article|content|law-text|main-content").unwrap(),
        },
        ContentHint::Id {
            tag: "div".to_string(),
            pattern: Regex::new(r"(?i)MainContent|article|content").unwrap(),
        },
        ContentHint::tag("article"),
        ContentHint::tag("main"),
    ]
}

/// Rule-based extractor used for the government portals.
#[derive(Debug, Clone)]
pub struct HeuristicExtractor {
    hints: Vec<ContentHint>,
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self {
            hints: default_hints(),
        }
    }
}

impl HeuristicExtractor {
    pub fn with_hints(hints: Vec<ContentHint>) -> Self {
        Self { hints }
    }

    fn extract_markup(&self, raw: &RawDocument) -> NormalizedDocument {
        let doc = Html::parse_document(&raw.raw_content);

        let full_text = self
            .hints
            .iter()
            .flat_map(|hint| hint.candidates(&doc))
            .map(element_text)
            .find(|text| !text.is_empty())
            .or_else(|| first_match(&doc, "body").map(element_text))
            .unwrap_or_else(|| element_text(doc.root_element()));

        let title = resolve_title(
            raw.title.as_deref(),
            &[
                first_text(&doc, "h1"),
                first_text(&doc, "h2"),
                first_text(&doc, "title"),
            ],
            &raw.url,
        );

        let page_text = element_text(doc.root_element());
        let metadata = extract_metadata(&title, &page_text);
        NormalizedDocument::new(title, full_text, metadata)
    }

    fn extract_plain(&self, raw: &RawDocument) -> NormalizedDocument {
        let full_text = normalize_text(&raw.raw_content);
        let title = resolve_title(raw.title.as_deref(), &[], &raw.url);
        let metadata = extract_metadata(&title, &full_text);
        NormalizedDocument::new(title, full_text, metadata)
    }
}

impl Extractor for HeuristicExtractor {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn extract(&self, raw: &RawDocument) -> Result<NormalizedDocument, ExtractError> {
        let kind = ContentKind::from_content_type(&raw.content_type)
            .ok_or_else(|| ExtractError::UnsupportedContentType(raw.content_type.clone()))?;
        if raw.raw_content.contains('\0') {
            return Err(ExtractError::NotText);
        }
        Ok(match kind {
            ContentKind::Markup => self.extract_markup(raw),
            ContentKind::Text => self.extract_plain(raw),
        })
    }
}

// ── Markup text collection ──────────────────────────────────────────────

#[derive(Default)]
struct TextSink {
    lines: Vec<String>,
    current: String,
}

impl TextSink {
    fn push_inline(&mut self, text: &str) {
        self.current
            .extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
    }

    fn break_line(&mut self) {
        if !self.current.trim().is_empty() {
            self.lines.push(std::mem::take(&mut self.current));
        } else {
            self.current.clear();
        }
    }

    fn break_paragraph(&mut self) {
        self.break_line();
        if self.lines.last().is_some_and(|l| !l.is_empty()) {
            self.lines.push(String::new());
        }
    }

    fn finish(mut self) -> String {
        self.break_line();
        normalize_text(&self.lines.join("\n"))
    }
}

fn collect_text(el: ElementRef<'_>, sink: &mut TextSink) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            sink.push_inline(text);
            continue;
        }
        let Some(child_el) = ElementRef::wrap(child) else {
            continue;
        };
        let name = child_el.value().name();
        if STRIPPED_TAGS.contains(&name) {
            continue;
        }
        if name == "br" {
            sink.break_line();
            continue;
        }
        let block = BLOCK_TAGS.contains(&name);
        if block {
            sink.break_line();
        }
        collect_text(child_el, sink);
        if PARAGRAPH_TAGS.contains(&name) {
            sink.break_paragraph();
        } else if block {
            sink.break_line();
        }
    }
}

/// Visible, normalized text of an element with non-content subtrees removed.
fn element_text(el: ElementRef<'_>) -> String {
    let mut sink = TextSink::default();
    collect_text(el, &mut sink);
    sink.finish()
}

fn first_match<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    doc.select(&selector).next()
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let text = first_match(doc, selector)?
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    let text = collapse_ws(&text);
    (!text.is_empty()).then_some(text)
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Title resolution ────────────────────────────────────────────────────

/// Explicit title → candidates in order → fallback identifier from the URL.
pub fn resolve_title(explicit: Option<&str>, candidates: &[Option<String>], url: &str) -> String {
    explicit
        .map(collapse_ws)
        .filter(|t| !t.is_empty())
        .or_else(|| candidates.iter().flatten().find(|t| !t.is_empty()).cloned())
        .unwrap_or_else(|| fallback_identifier(url))
}

/// Identifier used when a document carries no title: the last URL path
/// segment without its extension, or a short hash of the URL.
pub fn fallback_identifier(url: &str) -> String {
    let from_path = url::Url::parse(url).ok().and_then(|u| {
        u.path_segments()?
            .filter(|s| !s.is_empty())
            .last()
            .map(|seg| match seg.rsplit_once('.') {
                Some((stem, _)) if !stem.is_empty() => stem.to_string(),
                _ => seg.to_string(),
            })
    });

    match from_path {
        Some(name) if !name.is_empty() => name,
        _ => {
            let digest = hex::encode(Sha256::digest(url.as_bytes()));
            format!("document-{}", &digest[..12])
        }
    }
}

// ── Metadata matchers ───────────────────────────────────────────────────

static ISSUE_DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)Issued on (\d{1,2}/\d{1,2}/\d{4})",
        r"(?i)Issued Date[:\s]+(\d{1,2}/\d{1,2}/\d{4})",
        r"(?i)\bDate[:\s]+(\d{1,2}/\d{1,2}/\d{4})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static HIJRI_DATE_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| vec![Regex::new(r"Corresponding to (\d+ \w+ \d+ H\.?)").unwrap()]);

static LAW_NUMBER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(Federal (?:Law|Decree-Law) No\.?\s*\d+(?:\s+of\s+\d{4})?)",
        r"(?i)((?:Law|Decree) No\.?\s*\d+\s+of\s+\d{4})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// First pattern (in list order) that matches any haystack wins. Haystacks
/// are tried in order for each pattern.
fn first_capture(patterns: &[Regex], haystacks: &[&str]) -> Option<String> {
    patterns.iter().find_map(|re| {
        haystacks
            .iter()
            .find_map(|h| re.captures(h))
            .and_then(|c| c.get(1))
            .map(|m| collapse_ws(m.as_str()))
    })
}

/// Run the ordered metadata matchers over a title and page text.
pub fn extract_metadata(title: &str, text: &str) -> DocumentMetadata {
    DocumentMetadata {
        issue_date: first_capture(&ISSUE_DATE_PATTERNS, &[text]),
        hijri_date: first_capture(&HIJRI_DATE_PATTERNS, &[text]),
        law_number: first_capture(&LAW_NUMBER_PATTERNS, &[title, text]),
    }
}
