//! Root-page heuristics that decide the order parsers are tried in.
//!
//! This only reorders: every parser stays a candidate, since a vendor name in
//! an ISP banner says little about the modem behind it.

use crate::registry::ModemParser;
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, SERVER, WWW_AUTHENTICATE};
use scraper::{Html, Selector};
use std::sync::Arc;

const BANNER_BYTES: usize = 1000;

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

/// Strongest hint a root page gives about one parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Manufacturer named in `<title>`
    Title,
    /// Manufacturer near the top of the body or in server/auth headers
    Banner,
    /// One of the parser's model numbers anywhere in the body
    Model,
    None,
}

impl Signal {
    pub fn score(&self) -> u8 {
        match self {
            Self::Title => 3,
            Self::Banner | Self::Model => 2,
            Self::None => 0,
        }
    }

    /// Title and model hits are specific enough to blame the credentials when login fails
    pub fn is_strong(&self) -> bool {
        matches!(self, Self::Title | Self::Model)
    }
}

/// A parser with the signal that placed it
#[derive(Clone)]
pub struct Ranked {
    pub parser: Arc<dyn ModemParser>,
    pub signal: Signal,
}

/// Text of the page's `<title>`, trimmed
pub fn page_title(body: &str) -> Option<String> {
    let doc = Html::parse_document(body);
    let title = doc.select(&TITLE).next()?;
    let text = title.text().collect::<String>();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn banner(body: &str) -> &str {
    let mut end = body.len().min(BANNER_BYTES);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

fn contains_ci(haystack_lower: &str, needle: &str) -> bool {
    !needle.is_empty() && haystack_lower.contains(&needle.to_lowercase())
}

/// Evidence context computed once per root page
struct RootPage {
    title: String,
    banner: String,
    body: String,
    headers: String,
}

impl RootPage {
    fn new(body: &str, headers: &HeaderMap) -> Self {
        let header_text = [SERVER, WWW_AUTHENTICATE]
            .iter()
            .filter_map(|name| headers.get(name).and_then(|v| v.to_str().ok()))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            title: page_title(body).unwrap_or_default().to_lowercase(),
            banner: banner(body).to_lowercase(),
            body: body.to_lowercase(),
            headers: header_text.to_lowercase(),
        }
    }

    fn signal_for(&self, parser: &dyn ModemParser) -> Signal {
        let d = parser.descriptor();
        if contains_ci(&self.title, d.manufacturer) {
            Signal::Title
        } else if contains_ci(&self.banner, d.manufacturer) || contains_ci(&self.headers, d.manufacturer) {
            Signal::Banner
        } else if d.models.iter().any(|m| contains_ci(&self.body, m) || contains_ci(&self.headers, m)) {
            Signal::Model
        } else {
            Signal::None
        }
    }
}

/// Order parsers by root-page signal, then by declared priority.
///
/// The sort is stable, so equal signal and priority keep registry order.
pub fn rank(parsers: &[Arc<dyn ModemParser>], body: &str, headers: &HeaderMap) -> Vec<Ranked> {
    let page = RootPage::new(body, headers);
    let mut ranked: Vec<Ranked> = parsers
        .iter()
        .map(|p| Ranked {
            parser: Arc::clone(p),
            signal: page.signal_for(p.as_ref()),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.signal
            .score()
            .cmp(&a.signal.score())
            .then(b.parser.descriptor().priority.cmp(&a.parser.descriptor().priority))
    });

    for r in &ranked {
        tracing::debug!(
            "Heuristic rank: {} ({:?}, priority {})",
            r.parser.descriptor().name,
            r.signal,
            r.parser.descriptor().priority
        );
    }
    ranked
}
