// Event Classification
//
// Maps result-table headers to event types. The title table is built once
// and shared read-only by every page task.

use bactic_common::types::{EventType, Stage};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::{ParseError, Result};

#[allow(clippy::expect_used)]
static SEX_QUALIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:women|men)['’]s\b").expect("sex qualifier pattern is valid")
});

#[allow(clippy::expect_used)]
static ROUND_QUALIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:preliminaries|finals|heat\s+\d+)\b").expect("round pattern is valid")
});

const TRACK_TITLES: &[(&str, EventType)] = &[
    ("60 meters", EventType::T60M),
    ("100 meters", EventType::T100M),
    ("200 meters", EventType::T200M),
    ("400 meters", EventType::T400M),
    ("800 meters", EventType::T800M),
    ("1500 meters", EventType::T1500M),
    ("mile", EventType::TMile),
    ("3000 meters", EventType::T3000M),
    ("3000 steeplechase", EventType::T3000MSteeple),
    ("2 mile", EventType::T2Mile),
    ("5000 meters", EventType::T5000M),
    ("5,000 meters", EventType::T5000M),
    ("10000 meters", EventType::T10000M),
    ("10,000 meters", EventType::T10000M),
    ("100 hurdles", EventType::T100MHurdles),
    ("110 hurdles", EventType::T110MHurdles),
    ("400 hurdles", EventType::T400MHurdles),
    ("4 x 100 relay", EventType::T4x100Relay),
    ("4 x 100m relay", EventType::T4x100Relay),
    ("4x100 relay", EventType::T4x100Relay),
    ("4 x 400 relay", EventType::T4x400Relay),
    ("4 x 400m relay", EventType::T4x400Relay),
    ("4x400 relay", EventType::T4x400Relay),
    ("high jump", EventType::HighJump),
    ("pole vault", EventType::PoleVault),
    ("long jump", EventType::LongJump),
    ("triple jump", EventType::TripleJump),
    ("shot put", EventType::ShotPut),
    ("weight throw", EventType::WeightThrow),
    ("discus", EventType::Discus),
    ("hammer", EventType::Hammer),
    ("javelin", EventType::Javelin),
    ("decathlon", EventType::Decathlon),
    ("heptathlon", EventType::Heptathlon),
];

// Checked in order; no token is a substring of another
const XC_DISTANCES: &[(&str, EventType)] = &[
    ("10k", EventType::Xc10K),
    ("8k", EventType::Xc8K),
    ("6k", EventType::Xc6K),
];

/// Immutable header-to-event lookup
#[derive(Debug, Clone)]
pub struct EventClassifier {
    titles: HashMap<&'static str, EventType>,
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl EventClassifier {
    pub fn new() -> Self {
        Self {
            titles: TRACK_TITLES.iter().copied().collect(),
        }
    }

    /// Classify a track or field table header such as `"Men's 5000 Meters"`
    pub fn classify_track_event(&self, header: &str) -> Result<EventType> {
        let title = normalize_title(header);
        self.titles
            .get(title.as_str())
            .copied()
            .ok_or_else(|| ParseError::UnrecognizedEvent(header.trim().to_string()))
    }

    /// Classify a cross-country header by its distance token
    pub fn classify_cross_country_event(&self, header: &str) -> Result<EventType> {
        let lowered = header.to_lowercase();
        XC_DISTANCES
            .iter()
            .find(|(token, _)| lowered.contains(token))
            .map(|(_, event)| *event)
            .ok_or_else(|| ParseError::UnrecognizedEvent(header.trim().to_string()))
    }

    /// Cross-country team scoring tables carry no individual marks
    pub fn is_team_results(header: &str) -> bool {
        header.to_lowercase().contains("team results")
    }

    pub fn stage(header: &str) -> Option<Stage> {
        let lowered = header.to_lowercase();
        if lowered.contains("preliminaries") {
            Some(Stage::Prelim)
        } else if lowered.contains("finals") {
            Some(Stage::Final)
        } else {
            None
        }
    }
}

/// Strip sex and round qualifiers, collapse whitespace and lowercase
fn normalize_title(header: &str) -> String {
    let without_sex = SEX_QUALIFIER.replace_all(header, " ");
    let without_round = ROUND_QUALIFIER.replace_all(&without_sex, " ");
    without_round
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
