//! Common types used across Bactic

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BacticError;

mod event;

pub use event::{EventFamily, EventType, Stage};

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! global_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

global_id!(
    /// Athlete identifier assigned by this system; never reused
    AthleteId
);
global_id!(SchoolId);
global_id!(MeetId);
global_id!(HeatId);
global_id!(ResultId);

/// Identifier embedded in a results-site hyperlink
///
/// The same number space holds link ids (unstable, page specific) and
/// canonical ids (the id in an athlete's own profile URL). Zero means the
/// cell carried no profile reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub u32);

impl SourceId {
    pub const NONE: SourceId = SourceId(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Governing division of a school
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i16)]
pub enum Division {
    #[default]
    Unknown = 0,
    DI = 1,
    DII = 2,
    DIII = 3,
    Naia = 4,
}

impl Division {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Result<Self, BacticError> {
        match code {
            0 => Ok(Division::Unknown),
            1 => Ok(Division::DI),
            2 => Ok(Division::DII),
            3 => Ok(Division::DIII),
            4 => Ok(Division::Naia),
            other => Err(BacticError::InvalidDivision(other.to_string())),
        }
    }
}

impl std::fmt::Display for Division {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Division::Unknown => "Unknown",
            Division::DI => "NCAA DI",
            Division::DII => "NCAA DII",
            Division::DIII => "NCAA DIII",
            Division::Naia => "NAIA",
        };
        f.write_str(label)
    }
}

/// Competition season a meet belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum Season {
    CrossCountry = 0,
    Indoor = 1,
    Outdoor = 2,
}

impl Season {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Result<Self, BacticError> {
        match code {
            0 => Ok(Season::CrossCountry),
            1 => Ok(Season::Indoor),
            2 => Ok(Season::Outdoor),
            other => Err(BacticError::InvalidSeason(other.to_string())),
        }
    }
}

impl std::fmt::Display for Season {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Season::CrossCountry => write!(f, "XC"),
            Season::Indoor => write!(f, "Indoor"),
            Season::Outdoor => write!(f, "Outdoor"),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A real-world athlete, created once per canonical profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Athlete {
    pub id: AthleteId,
    pub name: String,
    pub schools: Vec<SchoolId>,
}

/// A school, unique by its canonical source URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct School {
    pub id: SchoolId,
    pub name: String,
    pub division: Division,
    pub url: String,
    pub leagues: Vec<String>,
}

/// School fields scraped from its own page, before an id is assigned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSchool {
    pub name: String,
    pub division: Division,
    pub url: String,
    pub leagues: Vec<String>,
}

/// A meet, unique by the feed link it was discovered through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meet {
    pub id: MeetId,
    pub name: String,
    pub date: NaiveDate,
    pub season: Season,
    pub source_url: String,
    /// Set once every page of the meet has been ingested
    pub ingested_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeet {
    pub name: String,
    pub date: NaiveDate,
    pub season: Season,
    pub source_url: String,
}

/// One scored event within a meet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heat {
    pub id: HeatId,
    pub meet_id: MeetId,
    pub event_type: EventType,
}

/// A single finishing line of a heat
///
/// `quantity` is seconds for timed events and meters for field events.
/// Relay lines carry a team name and members instead of an athlete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventResult {
    pub id: ResultId,
    pub heat_id: HeatId,
    pub athlete_id: Option<AthleteId>,
    pub place: u32,
    pub quantity: f64,
    pub wind: Option<f64>,
    pub stage: Option<Stage>,
    pub team: Option<String>,
    pub members: Vec<AthleteId>,
}

/// A result line whose athlete identities are fully resolved, ready to commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResult {
    pub athlete_id: Option<AthleteId>,
    pub school_id: Option<SchoolId>,
    pub place: u32,
    pub quantity: f64,
    pub wind: Option<f64>,
    pub stage: Option<Stage>,
    pub team: Option<String>,
    pub members: Vec<AthleteId>,
}
