//! Title validation and the exclusion taxonomy
//!
//! Shared rules used by the parsers (while extracting titles from scraped
//! pages) and by the validator agent (while filtering candidates). A title
//! is either genuine or excluded for exactly one reason from the fixed
//! taxonomy.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Lookup years older than this many years behind the current year mark a
/// theatrical re-release rather than a new film.
pub const RE_RELEASE_THRESHOLD_YEARS: i32 = 2;

/// Why a candidate was excluded. Fixed taxonomy; each reason maps to one
/// rule below or to the validator's enrichment pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    ConcertFilm,
    Compilation,
    Collection,
    ReRelease,
    LimitedRelease,
    TvSeries,
    NotATitle,
    LowConfidence,
    Duplicate,
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            ExclusionReason::ConcertFilm => "concert_film",
            ExclusionReason::Compilation => "compilation",
            ExclusionReason::Collection => "collection",
            ExclusionReason::ReRelease => "re_release",
            ExclusionReason::LimitedRelease => "limited_release",
            ExclusionReason::TvSeries => "tv_series",
            ExclusionReason::NotATitle => "not_a_title",
            ExclusionReason::LowConfidence => "low_confidence",
            ExclusionReason::Duplicate => "duplicate",
        };
        write!(f, "{reason}")
    }
}

/// Per-candidate validation verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Genuine,
    Excluded(ExclusionReason),
}

static CONCERT_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(live in concert|in concert|concert film|live at|world tour|tour film|on stage|the movie: the tour)\b",
    )
    .unwrap()
});

static COMPILATION_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(compilation|recap|marathon|double feature|sing-?along|greatest hits)\b")
        .unwrap()
});

static COLLECTION_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(collection|complete series|trilogy|quadrilogy|box set|anthology)\b")
        .unwrap()
});

static RERELEASE_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(re-?release|anniversary edition|remastered|imax release|extended cut)\b")
        .unwrap()
});

static LIMITED_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(limited release|limited engagement|streaming only|fathom events?)\b")
        .unwrap()
});

static TV_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(season \d+|s\d{2}e\d{2}|episode \d+|the series|miniseries|tv special)\b")
        .unwrap()
});

/// Page furniture, rating text, and promotional strings the scrape parsers
/// sometimes capture instead of a title.
static JUNK_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)^(menu|home|sign in|log in|see all|view all|more|trailer|teaser|coming soon|",
        r"watch now|tickets?|showtimes|untitled|unknown|tba|tbd|n/a|new releases?|",
        r"top (movies?|films?)|popular (movies?|films?))$"
    ))
    .unwrap()
});

static RATING_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+%|tomatometer|popcornmeter|metascore|imdb rating)").unwrap());

/// Strip rank prefixes, markdown residue, and a trailing parenthesized year.
pub fn clean_title(raw: &str) -> String {
    static RANK_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d{1,3}[.)]\s*").unwrap());
    static TRAILING_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\((19|20)\d{2}\)\s*$").unwrap());

    let cleaned = RANK_PREFIX.replace(raw, "");
    let cleaned = TRAILING_YEAR.replace(&cleaned, "");
    cleaned
        .trim_matches(|c: char| c.is_whitespace() || c == '*' || c == '#' || c == '[' || c == ']')
        .to_string()
}

/// Whether a string plausibly names a film at all.
pub fn is_plausible_title(title: &str) -> bool {
    let trimmed = title.trim();
    if trimmed.len() < 2 || trimmed.len() > 120 {
        return false;
    }
    if trimmed.chars().all(|c| c.is_numeric() || c.is_whitespace()) {
        return false;
    }
    if JUNK_PATTERNS.is_match(trimmed) || RATING_TEXT.is_match(trimmed) {
        return false;
    }
    true
}

/// Classify a title against the exclusion taxonomy using title text alone.
/// Re-release detection by year needs lookup metadata and lives in the
/// validator agent's enrichment pass.
pub fn classify_title(title: &str) -> Verdict {
    if !is_plausible_title(title) {
        return Verdict::Excluded(ExclusionReason::NotATitle);
    }
    if CONCERT_PATTERNS.is_match(title) {
        return Verdict::Excluded(ExclusionReason::ConcertFilm);
    }
    if COMPILATION_PATTERNS.is_match(title) {
        return Verdict::Excluded(ExclusionReason::Compilation);
    }
    if COLLECTION_PATTERNS.is_match(title) {
        return Verdict::Excluded(ExclusionReason::Collection);
    }
    if RERELEASE_PATTERNS.is_match(title) {
        return Verdict::Excluded(ExclusionReason::ReRelease);
    }
    if LIMITED_PATTERNS.is_match(title) {
        return Verdict::Excluded(ExclusionReason::LimitedRelease);
    }
    if TV_PATTERNS.is_match(title) {
        return Verdict::Excluded(ExclusionReason::TvSeries);
    }
    Verdict::Genuine
}

/// Whether a release year from lookup metadata marks a re-release.
pub fn is_rerelease_year(lookup_year: Option<i32>, current_year: i32) -> bool {
    match lookup_year {
        Some(year) => year < current_year - RE_RELEASE_THRESHOLD_YEARS,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genuine_titles_pass() {
        for title in [
            "Weapons",
            "One Battle After Another",
            "The Conjuring: Last Rites",
            "28 Years Later",
        ] {
            assert_eq!(classify_title(title), Verdict::Genuine, "{title}");
        }
    }

    #[test]
    fn test_concert_films_excluded() {
        assert_eq!(
            classify_title("BTS: Yet to Come in Cinemas - Live at Busan"),
            Verdict::Excluded(ExclusionReason::ConcertFilm)
        );
        assert_eq!(
            classify_title("Taylor Swift: The Eras Tour Film"),
            Verdict::Excluded(ExclusionReason::ConcertFilm)
        );
    }

    #[test]
    fn test_compilations_and_collections_excluded() {
        assert_eq!(
            classify_title("Demon Slayer Recap: To the Hashira Training"),
            Verdict::Excluded(ExclusionReason::Compilation)
        );
        assert_eq!(
            classify_title("The Lord of the Rings Trilogy"),
            Verdict::Excluded(ExclusionReason::Collection)
        );
    }

    #[test]
    fn test_rereleases_excluded() {
        assert_eq!(
            classify_title("Interstellar: 10th Anniversary Edition"),
            Verdict::Excluded(ExclusionReason::ReRelease)
        );
    }

    #[test]
    fn test_tv_patterns_excluded() {
        assert_eq!(
            classify_title("Stranger Things Season 5"),
            Verdict::Excluded(ExclusionReason::TvSeries)
        );
    }

    #[test]
    fn test_junk_is_not_a_title() {
        for junk in ["Sign In", "98%", "Coming Soon", "2025", "Tickets"] {
            assert_eq!(
                classify_title(junk),
                Verdict::Excluded(ExclusionReason::NotATitle),
                "{junk}"
            );
        }
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("3. The Running Man"), "The Running Man");
        assert_eq!(clean_title("Sinners (2025)"), "Sinners");
        assert_eq!(clean_title("  **Wicked**  "), "Wicked");
    }

    #[test]
    fn test_rerelease_year() {
        assert!(is_rerelease_year(Some(2014), 2026));
        assert!(!is_rerelease_year(Some(2025), 2026));
        assert!(!is_rerelease_year(None, 2026));
    }
}
