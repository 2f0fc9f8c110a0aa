//! Source parsers
//!
//! Convert one raw fetched document (ranked-list pages rendered to
//! markdown) into zero or more normalized entries. Parsers are pure: no
//! network, no state, tested against fixed sample documents. A source whose
//! layout has drifted yields zero entries - the calling agent reports the
//! diagnostic, parsers never fail.

use once_cell::sync::Lazy;
use regex::Regex;

use super::validation::{clean_title, is_plausible_title};

/// One entry extracted from a source document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEntry {
    pub title: String,
    pub year: Option<i32>,
    pub rank: Option<u32>,
    pub source: String,
}

/// Known source layouts. Unknown names fall back to the generic parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    /// Review aggregator "in theaters" browse page.
    RtTheaters,
    /// Content database popularity chart.
    ImdbMeter,
    /// Title (Year) pairs in arbitrary text.
    Generic,
}

impl ParserKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "rt_theaters" | "rt_home" => ParserKind::RtTheaters,
            "imdb_meter" | "imdb_moviemeter" => ParserKind::ImdbMeter,
            _ => ParserKind::Generic,
        }
    }
}

/// Parse a document with the given layout, tagging entries with the source
/// name.
pub fn parse_document(kind: ParserKind, content: &str, source: &str) -> Vec<ParsedEntry> {
    match kind {
        ParserKind::RtTheaters => parse_rt_theaters(content, source),
        ParserKind::ImdbMeter => parse_imdb_meter(content, source),
        ParserKind::Generic => parse_generic(content, source),
    }
}

fn push_unique(
    entries: &mut Vec<ParsedEntry>,
    seen: &mut Vec<String>,
    title: String,
    year: Option<i32>,
    rank: Option<u32>,
    source: &str,
) {
    let key = title.to_lowercase();
    if !is_plausible_title(&title) || seen.contains(&key) {
        return;
    }
    seen.push(key);
    entries.push(ParsedEntry {
        title,
        year,
        rank,
        source: source.to_string(),
    });
}

/// Review aggregator browse page: movie links carry an opening date and a
/// `/m/` details URL.
fn parse_rt_theaters(content: &str, source: &str) -> Vec<ParsedEntry> {
    static MOVIE_LINK: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)\[\s*(?:\d+%\s*)*([A-Z][^\[\]]{2,80}?)\s+(?:Opened?|Opens)\s+[A-Z][a-z]{2}\s+\d{1,2},\s+(\d{4})\s*\]\s*\(https?://www\.rottentomatoes\.com/m/",
        )
        .unwrap()
    });
    static CERTIFIED_PICK: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"\[\s*\d+%\s+([A-Z][^\[\]]{2,60}?)\s+Link to\s+[^\[\]]+\]\s*\(https?://www\.rottentomatoes\.com/m/",
        )
        .unwrap()
    });

    let mut entries = Vec::new();
    let mut seen = Vec::new();

    for caps in MOVIE_LINK.captures_iter(content) {
        let title = clean_title(caps[1].trim());
        let year = caps[2].parse().ok();
        push_unique(&mut entries, &mut seen, title, year, None, source);
    }
    for caps in CERTIFIED_PICK.captures_iter(content) {
        let title = clean_title(caps[1].trim());
        push_unique(&mut entries, &mut seen, title, None, None, source);
    }

    entries
}

/// Content database chart page: `### [Title](...)` headers whose link refs
/// encode the chart rank, with a plain-link fallback for older layouts.
fn parse_imdb_meter(content: &str, source: &str) -> Vec<ParsedEntry> {
    static CHART_HEADER: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"###\s*\[([^\]]{2,80})\]\(https?://www\.imdb\.com/title/tt\d+/\?ref_=chtmvm_t_(\d+)\)",
        )
        .unwrap()
    });
    static RANKED_HEADER: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"###\s*\[(\d+)\.\s*([^\]]{2,80})\]\(https?://www\.imdb\.com/title/tt\d+")
            .unwrap()
    });
    static PLAIN_LINK: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\[([^\]]{3,80})\]\(https?://www\.imdb\.com/title/tt\d+").unwrap());

    let mut entries = Vec::new();
    let mut seen = Vec::new();

    for caps in CHART_HEADER.captures_iter(content) {
        let title = clean_title(caps[1].trim());
        let rank: u32 = caps[2].parse().unwrap_or(u32::MAX);
        if rank <= 100 {
            push_unique(&mut entries, &mut seen, title, None, Some(rank), source);
        }
    }
    for caps in RANKED_HEADER.captures_iter(content) {
        let rank: u32 = caps[1].parse().unwrap_or(u32::MAX);
        let title = clean_title(caps[2].trim());
        if rank <= 100 {
            push_unique(&mut entries, &mut seen, title, None, Some(rank), source);
        }
    }

    if entries.is_empty() {
        for caps in PLAIN_LINK.captures_iter(content) {
            let title = clean_title(caps[1].trim());
            push_unique(&mut entries, &mut seen, title, None, None, source);
        }
    }

    entries
}

/// Last-resort parser: `Title (Year)` pairs anywhere in the text.
fn parse_generic(content: &str, source: &str) -> Vec<ParsedEntry> {
    static TITLE_YEAR: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"([A-Z][^(\n\[\]]{2,55}?)\s*\(((?:19|20)\d{2})\)").unwrap());

    let mut entries = Vec::new();
    let mut seen = Vec::new();

    for caps in TITLE_YEAR.captures_iter(content) {
        let title = clean_title(caps[1].trim());
        let year = caps[2].parse().ok();
        push_unique(&mut entries, &mut seen, title, year, None, source);
    }

    entries
}
