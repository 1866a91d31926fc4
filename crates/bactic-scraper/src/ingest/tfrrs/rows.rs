// Row Parsing
//
// A results table row is a list of cells. Column offsets depend on the
// event family, so parsers are dispatched through a table built once from
// every known event type.

use bactic_common::types::{EventFamily, EventType, SourceId};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::{ParseError, Result};

#[allow(clippy::expect_used)]
static TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+):)?(\d+)\.(\d{1,2})$").expect("time pattern is valid")
});

#[allow(clippy::expect_used)]
static ATHLETE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?:)?//(?:www\.)?tfrrs\.org/athletes/(\d+)")
        .expect("athlete link pattern is valid")
});

/// Entries that record a non-performance instead of a mark
const NON_PERFORMANCE_CODES: &[&str] = &["DNF", "DQ", "FS", "DNS", "NT"];

/// Most relay members recorded per line
pub const MAX_RELAY_MEMBERS: usize = 4;

/// One table cell: its text and the hyperlinks it carries
///
/// Multiple anchors in one cell are joined with `", "`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    pub text: String,
    pub link: Option<String>,
}

impl Cell {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link: None,
        }
    }

    pub fn linked(text: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link: Some(link.into()),
        }
    }

    fn links(&self) -> impl Iterator<Item = &str> {
        self.link
            .as_deref()
            .into_iter()
            .flat_map(|joined| joined.split(", "))
            .map(str::trim)
            .filter(|link| !link.is_empty())
    }
}

/// A row after column extraction, before identities are resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub place: u32,
    /// Seconds for timed events
    pub quantity: f64,
    pub wind: Option<f64>,
    /// Performer's link id; [`SourceId::NONE`] for relays and unlinked names
    pub performer: SourceId,
    pub school_link: Option<String>,
    pub team: Option<String>,
    pub members: Vec<SourceId>,
}

impl ParsedRow {
    /// Every athlete link id this row needs resolved
    pub fn source_ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        std::iter::once(self.performer)
            .chain(self.members.iter().copied())
            .filter(|id| !id.is_none())
    }
}

type RowParser = fn(&[Cell]) -> Result<ParsedRow>;

/// Immutable event-type to row-parser dispatch table
#[derive(Clone)]
pub struct RowParsers {
    parsers: HashMap<EventType, RowParser>,
}

impl Default for RowParsers {
    fn default() -> Self {
        Self::new()
    }
}

impl RowParsers {
    pub fn new() -> Self {
        let parsers = EventType::ALL
            .iter()
            .filter_map(|event| {
                let parser: RowParser = match event.family() {
                    EventFamily::Sprint => parse_sprint_row,
                    EventFamily::Distance => parse_distance_row,
                    EventFamily::Relay => parse_relay_row,
                    EventFamily::CrossCountry => parse_cross_country_row,
                    EventFamily::Field => return None,
                };
                Some((*event, parser))
            })
            .collect();
        Self { parsers }
    }

    pub fn parse(&self, event_type: EventType, row: &[Cell]) -> Result<ParsedRow> {
        let parser = self
            .parsers
            .get(&event_type)
            .ok_or(ParseError::NotImplemented(event_type))?;
        parser(row)
    }

    pub fn supports(&self, event_type: EventType) -> bool {
        self.parsers.contains_key(&event_type)
    }
}

impl std::fmt::Debug for RowParsers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut supported: Vec<_> = self.parsers.keys().collect();
        supported.sort();
        f.debug_struct("RowParsers").field("supported", &supported).finish()
    }
}

// ============================================================================
// Field parsing
// ============================================================================

/// Parse a `[m:]s.f` mark into seconds
///
/// A single fraction digit is tenths. Non-performance codes yield
/// [`ParseError::Timing`] so callers can drop the row quietly.
pub fn parse_time(text: &str) -> Result<f64> {
    let token = text.split_whitespace().next().unwrap_or_default();

    let upper = token.to_ascii_uppercase();
    if NON_PERFORMANCE_CODES.contains(&upper.as_str()) {
        return Err(ParseError::timing(upper));
    }

    let captures = TIME_PATTERN
        .captures(token)
        .ok_or_else(|| ParseError::malformed(format!("unparseable time '{}'", text.trim())))?;

    let number = |index: usize| -> Result<u64> {
        captures
            .get(index)
            .map_or(Ok(0), |m| m.as_str().parse::<u64>())
            .map_err(|_| ParseError::malformed(format!("time field out of range in '{}'", token)))
    };

    let minutes = number(1)?;
    let seconds = number(2)?;
    let fraction = captures.get(3).map_or("", |m| m.as_str());
    let hundredths = match fraction.len() {
        1 => number(3)? * 10,
        _ => number(3)?,
    };

    let total = minutes
        .checked_mul(60)
        .and_then(|secs| secs.checked_add(seconds))
        .ok_or_else(|| ParseError::malformed(format!("time out of range '{}'", token)))?;

    Ok(total as f64 + hundredths as f64 / 100.0)
}

/// Extract the athlete id from a profile hyperlink
///
/// Links that are not athlete profiles give [`SourceId::NONE`].
pub fn parse_source_id(url: &str) -> SourceId {
    ATHLETE_LINK
        .captures(url.trim())
        .and_then(|captures| captures.get(1))
        .and_then(|id| id.as_str().parse::<u32>().ok())
        .map_or(SourceId::NONE, SourceId)
}

fn parse_place(cell: &Cell) -> Result<u32> {
    let text = cell.text.trim().trim_end_matches('.');
    if text.is_empty() || text == "-" {
        return Ok(0);
    }
    text.parse()
        .map_err(|_| ParseError::malformed(format!("unparseable place '{}'", text)))
}

fn parse_wind(cell: Option<&Cell>) -> Option<f64> {
    cell.and_then(|cell| cell.text.trim().parse::<f64>().ok())
        .filter(|wind| wind.is_finite())
}

fn require_width(row: &[Cell], min: usize) -> Result<()> {
    if row.len() < min {
        return Err(ParseError::malformed(format!(
            "expected at least {} cells, found {}",
            min,
            row.len()
        )));
    }
    Ok(())
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

// ============================================================================
// Family parsers
// ============================================================================

fn parse_individual_row(
    row: &[Cell],
    time_column: usize,
    wind_column: Option<usize>,
) -> Result<ParsedRow> {
    require_width(row, time_column + 1)?;

    let quantity = parse_time(&row[time_column].text)?;
    let place = parse_place(&row[0])?;
    let performer = row[1].link.as_deref().map_or(SourceId::NONE, parse_source_id);

    Ok(ParsedRow {
        place,
        quantity,
        wind: wind_column.and_then(|column| parse_wind(row.get(column))),
        performer,
        school_link: row[3].links().next().map(str::to_string),
        team: non_empty(&row[3].text),
        members: Vec::new(),
    })
}

fn parse_distance_row(row: &[Cell]) -> Result<ParsedRow> {
    parse_individual_row(row, 4, None)
}

fn parse_sprint_row(row: &[Cell]) -> Result<ParsedRow> {
    parse_individual_row(row, 4, Some(5))
}

fn parse_cross_country_row(row: &[Cell]) -> Result<ParsedRow> {
    parse_individual_row(row, 5, None)
}

fn parse_relay_row(row: &[Cell]) -> Result<ParsedRow> {
    require_width(row, 5)?;

    let quantity = parse_time(&row[3].text)?;
    let members = row[2]
        .links()
        .map(parse_source_id)
        .filter(|id| !id.is_none())
        .take(MAX_RELAY_MEMBERS)
        .collect();

    Ok(ParsedRow {
        place: parse_place(&row[0])?,
        quantity,
        wind: None,
        performer: SourceId::NONE,
        school_link: row[0].links().next().map(str::to_string),
        team: non_empty(&row[0].text),
        members,
    })
}
