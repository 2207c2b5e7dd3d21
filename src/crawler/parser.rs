//! Detail page parsing
//!
//! The crawl core only depends on the [`DocumentParser`] contract: given an
//! identifier and a fetched document, produce a record, a skip, or an error
//! message when the document cannot be classified. [`MoviePageParser`] is the
//! implementation for the movie detail pages the crawler targets.

use crate::state::Record;
use scraper::{Html, Selector};

/// Why a fetched document produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// No rating shown (unreleased or too few votes)
    MissingRating,

    /// Rating present but not a number on the 0-10 scale
    InvalidRating,

    /// No title element
    MissingTitle,

    /// The item no longer exists (404/410)
    NotFound,

    /// The parser rejected the document; counted as a skip by the crawl
    Malformed,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingRating => "missing_rating",
            Self::InvalidRating => "invalid_rating",
            Self::MissingTitle => "missing_title",
            Self::NotFound => "not_found",
            Self::Malformed => "malformed",
        }
    }
}

/// Terminal result of fetching one item
#[derive(Debug, Clone, PartialEq)]
pub enum DetailOutcome {
    Record(Record),
    Skip(SkipReason),
}

/// Maps one fetched document to a record
pub trait DocumentParser: Send + Sync + 'static {
    /// Parses `html` fetched from `id`
    ///
    /// # Returns
    ///
    /// * `Ok(DetailOutcome::Record)` - All required fields present
    /// * `Ok(DetailOutcome::Skip)` - Well-formed page without a usable record
    /// * `Err(String)` - Document shape the parser does not understand
    fn parse(&self, id: &str, html: &str) -> Result<DetailOutcome, String>;
}

/// Parser for movie detail pages
///
/// # Extraction Rules
///
/// | Field | Source |
/// |-------|--------|
/// | rating | `strong.rating_num` (required) |
/// | title | `span[property="v:itemreviewed"]` (required) |
/// | year | `span.year`, parentheses stripped, 0 if absent |
/// | director, genres, country, language | `div#info` label lines |
/// | votes | `span[property="v:votes"]`, 0 if absent |
///
/// A page with rating and title but no `div#info` block is reported as an
/// error rather than a skip.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoviePageParser;

impl MoviePageParser {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentParser for MoviePageParser {
    fn parse(&self, id: &str, html: &str) -> Result<DetailOutcome, String> {
        let document = Html::parse_document(html);

        let rating = match select_text(&document, "strong.rating_num") {
            Some(text) => text,
            None => return Ok(DetailOutcome::Skip(SkipReason::MissingRating)),
        };
        let rating = match rating.parse::<f64>() {
            Ok(value) => value,
            Err(_) => return Ok(DetailOutcome::Skip(SkipReason::InvalidRating)),
        };

        let title = match select_text(&document, r#"span[property="v:itemreviewed"]"#) {
            Some(text) => text,
            None => return Ok(DetailOutcome::Skip(SkipReason::MissingTitle)),
        };

        let info = select_text(&document, "div#info")
            .ok_or_else(|| "page has a rating but no info block".to_string())?;

        let year = select_text(&document, "span.year")
            .map(|text| text.trim_matches(|c| c == '(' || c == ')').trim().to_string())
            .and_then(|text| text.parse::<u32>().ok())
            .unwrap_or(0);

        let votes = select_text(&document, r#"span[property="v:votes"]"#)
            .and_then(|text| text.replace(',', "").parse::<u64>().ok())
            .unwrap_or(0);

        let record = Record {
            title,
            year,
            director: info_field(&info, "导演"),
            genres: info_field(&info, "类型"),
            country: info_field(&info, "制片国家/地区"),
            language: info_field(&info, "语言"),
            rating,
            votes,
            id: id.to_string(),
        };

        if !record.has_valid_rating() {
            return Ok(DetailOutcome::Skip(SkipReason::InvalidRating));
        }
        Ok(DetailOutcome::Record(record))
    }
}

/// Returns the trimmed text of the first element matching `css`, if non-empty
fn select_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;

    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts the value of a `label: value` line from the info block
///
/// Both ASCII and full-width colons are accepted; a missing label yields an
/// empty string.
fn info_field(info: &str, label: &str) -> String {
    info.lines()
        .map(str::trim)
        .find_map(|line| {
            let rest = line.strip_prefix(label)?.trim_start();
            rest.strip_prefix(':')
                .or_else(|| rest.strip_prefix('：'))
                .map(|value| value.trim().to_string())
        })
        .unwrap_or_default()
}
