//! Event classification enums
//!
//! Heats are keyed by [`EventType`]; rows inside a heat are parsed according
//! to the event's [`EventFamily`].

use serde::{Deserialize, Serialize};

use crate::error::BacticError;

/// A scored event, as stored on each heat
///
/// The discriminant is the persisted code and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i16)]
pub enum EventType {
    T60M = 0,
    T100M = 1,
    T200M = 2,
    T400M = 3,
    T800M = 4,
    T1500M = 5,
    TMile = 6,
    T3000M = 7,
    T3000MSteeple = 8,
    T2Mile = 9,
    T5000M = 10,
    T10000M = 11,
    T4x100Relay = 12,
    T4x400Relay = 13,
    HighJump = 14,
    PoleVault = 15,
    LongJump = 16,
    TripleJump = 17,
    ShotPut = 18,
    WeightThrow = 19,
    Discus = 20,
    Hammer = 21,
    Javelin = 22,
    Decathlon = 23,
    Heptathlon = 24,
    T100MHurdles = 25,
    T110MHurdles = 26,
    T400MHurdles = 27,
    Xc6K = 28,
    Xc8K = 29,
    Xc10K = 30,
}

impl EventType {
    /// Every event type, in code order
    pub const ALL: [EventType; 31] = [
        EventType::T60M,
        EventType::T100M,
        EventType::T200M,
        EventType::T400M,
        EventType::T800M,
        EventType::T1500M,
        EventType::TMile,
        EventType::T3000M,
        EventType::T3000MSteeple,
        EventType::T2Mile,
        EventType::T5000M,
        EventType::T10000M,
        EventType::T4x100Relay,
        EventType::T4x400Relay,
        EventType::HighJump,
        EventType::PoleVault,
        EventType::LongJump,
        EventType::TripleJump,
        EventType::ShotPut,
        EventType::WeightThrow,
        EventType::Discus,
        EventType::Hammer,
        EventType::Javelin,
        EventType::Decathlon,
        EventType::Heptathlon,
        EventType::T100MHurdles,
        EventType::T110MHurdles,
        EventType::T400MHurdles,
        EventType::Xc6K,
        EventType::Xc8K,
        EventType::Xc10K,
    ];

    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Result<Self, BacticError> {
        Self::ALL
            .iter()
            .copied()
            .find(|event| event.code() == code)
            .ok_or_else(|| BacticError::InvalidEventType(code.to_string()))
    }

    /// Which row layout and quantity unit this event uses
    pub fn family(self) -> EventFamily {
        use EventType::*;
        match self {
            T60M | T100M | T200M | T400M | T100MHurdles | T110MHurdles | T400MHurdles => {
                EventFamily::Sprint
            },
            T800M | T1500M | TMile | T3000M | T3000MSteeple | T2Mile | T5000M | T10000M => {
                EventFamily::Distance
            },
            T4x100Relay | T4x400Relay => EventFamily::Relay,
            HighJump | PoleVault | LongJump | TripleJump | ShotPut | WeightThrow | Discus
            | Hammer | Javelin | Decathlon | Heptathlon => EventFamily::Field,
            Xc6K | Xc8K | Xc10K => EventFamily::CrossCountry,
        }
    }

    pub fn label(self) -> &'static str {
        use EventType::*;
        match self {
            T60M => "60 Meters",
            T100M => "100 Meters",
            T200M => "200 Meters",
            T400M => "400 Meters",
            T800M => "800 Meters",
            T1500M => "1500 Meters",
            TMile => "1 Mile",
            T3000M => "3000 Meters",
            T3000MSteeple => "3000 Meter Steeplechase",
            T2Mile => "2 Mile",
            T5000M => "5,000 Meters",
            T10000M => "10,000 Meters",
            T4x100Relay => "4x100 Meter Relay",
            T4x400Relay => "4x400 Meter Relay",
            HighJump => "High Jump",
            PoleVault => "Pole Vault",
            LongJump => "Long Jump",
            TripleJump => "Triple Jump",
            ShotPut => "Shot Put",
            WeightThrow => "Weight Throw",
            Discus => "Discus",
            Hammer => "Hammer Throw",
            Javelin => "Javelin",
            Decathlon => "Decathlon",
            Heptathlon => "Heptathlon",
            T100MHurdles => "100 Meter Hurdles",
            T110MHurdles => "110 Meter Hurdles",
            T400MHurdles => "400 Meter Hurdles",
            Xc6K => "Cross Country 6K",
            Xc8K => "Cross Country 8K",
            Xc10K => "Cross Country 10K",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Row layout and unit family of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventFamily {
    Sprint,
    Distance,
    Relay,
    /// Jumps, throws and multi-events; quantities are meters or points
    Field,
    CrossCountry,
}

impl EventFamily {
    pub fn is_track_distance(self) -> bool {
        matches!(self, EventFamily::Distance)
    }

    /// Whether the quantity is an elapsed time in seconds
    pub fn is_timed(self) -> bool {
        !matches!(self, EventFamily::Field)
    }
}

/// Round of a heat within a meet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum Stage {
    Prelim = 0,
    Final = 1,
}

impl Stage {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(Stage::Prelim),
            1 => Some(Stage::Final),
            _ => None,
        }
    }
}
