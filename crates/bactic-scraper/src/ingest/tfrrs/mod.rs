//! TFRRS results-site parsing
//!
//! Pure functions over fetched documents: the RSS feed of newly posted
//! meets, meet result pages, athlete profiles and team pages. Nothing in
//! here performs I/O.

use bactic_common::types::{Division, EventType};
use thiserror::Error;

pub mod classify;
pub mod feed;
pub mod html;
pub mod rows;

pub use classify::EventClassifier;
pub use feed::{parse_feed, parse_meet_date, FeedItem};
pub use html::{
    extract_companion_links, extract_result_tables, parse_athlete_page, parse_division,
    parse_school_page, AthleteProfile, RawTable,
};
pub use rows::{parse_source_id, parse_time, Cell, ParsedRow, RowParsers};

/// Root of the results site
pub const TFRRS_BASE_URL: &str = "https://www.tfrrs.org";

/// Layout family of a meet result page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Track,
    CrossCountry,
}

impl PageKind {
    pub fn from_url(url: &str) -> Self {
        if url.contains("/xc/") {
            PageKind::CrossCountry
        } else {
            PageKind::Track
        }
    }
}

/// Errors raised while interpreting scraped documents
#[derive(Debug, Error)]
pub enum ParseError {
    /// The row records a non-performance (DNF, DQ, ...) rather than a mark
    #[error("non-performance code {code}")]
    Timing { code: String },

    #[error("malformed row: {0}")]
    MalformedRow(String),

    #[error("unrecognized event '{0}'")]
    UnrecognizedEvent(String),

    #[error("no row parser for {0}")]
    NotImplemented(EventType),

    #[error("malformed meet date '{0}'")]
    MalformedDate(String),

    #[error("malformed feed: {0}")]
    Feed(#[from] quick_xml::DeError),

    #[error("page has no {0}")]
    MissingElement(&'static str),

    #[error("'{0}' is not an athlete profile URL")]
    NotAProfile(String),

    #[error("school lists conflicting divisions {first} and {second}")]
    ConflictingDivisions { first: Division, second: Division },
}

impl ParseError {
    pub fn timing(code: impl Into<String>) -> Self {
        Self::Timing { code: code.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRow(message.into())
    }

    pub fn is_timing(&self) -> bool {
        matches!(self, Self::Timing { .. })
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
