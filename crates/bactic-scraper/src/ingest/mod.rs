//! Results ingestion
//!
//! # Architecture
//!
//! - **tfrrs**: pure parsing of the feed, meet pages, athlete and team pages
//! - **fetcher**: [`PageFetcher`] seam and the reqwest implementation
//! - **identity**: converges unstable athlete link ids onto one athlete
//! - **schools**: idempotent school creation keyed by team page URL
//! - **heats**: meet deduplication and atomic heat commits
//! - **meet_page**: per-page state machine driving the above
//! - **orchestrator**: feed polling loop and page task supervision
//!
//! Storage goes through [`crate::db::Store`] so every component runs
//! against Postgres or the in-memory store.

use bactic_common::types::SourceId;
use thiserror::Error;

use crate::db::DbError;

pub mod config;
pub mod fetcher;
pub mod heats;
pub mod identity;
pub mod meet_page;
pub mod orchestrator;
pub mod schools;
pub mod tfrrs;

pub use config::ScrapeConfig;
pub use fetcher::{FetchError, FetchedPage, HttpFetcher, PageFetcher};
pub use heats::MeetIngestor;
pub use identity::{IdentityResolver, Resolution};
pub use meet_page::{MeetPageOrchestrator, PageReport};
pub use orchestrator::{FeedOrchestrator, PageTasks, PollReport};
pub use schools::SchoolResolver;
pub use tfrrs::ParseError;

/// Athlete identity resolution failures
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Store(#[from] DbError),

    /// A map edge points at a canonical id that owns no athlete
    #[error("link id {external} maps to canonical id {canonical}, which has no athlete")]
    BrokenChain {
        external: SourceId,
        canonical: SourceId,
    },

    /// Still unmapped after its profile page was processed
    #[error("link id {0} is still unresolved")]
    Unresolved(SourceId),
}

impl IdentityError {
    /// Whether this indicates corrupted identity state rather than an outage
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::BrokenChain { .. } | Self::Unresolved(_))
    }
}

/// School resolution failures
#[derive(Debug, Error)]
pub enum SchoolError {
    #[error(transparent)]
    Store(#[from] DbError),

    #[error("Failed to fetch team page: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to parse team page: {0}")]
    Parse(#[from] ParseError),
}

/// Errors that abort ingestion of a whole page
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to parse document: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] DbError),

    #[error("Invalid page URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Identity state is inconsistent; the process must stop
    #[error("Identity invariant violated while ingesting {url}: {source}")]
    Invariant {
        url: String,
        #[source]
        source: IdentityError,
    },
}

impl IngestError {
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::Invariant { .. })
    }

    /// Attribute an identity failure to the page being ingested
    pub fn identity(url: &str, error: IdentityError) -> Self {
        match error {
            IdentityError::Store(db) => Self::Store(db),
            other => Self::Invariant {
                url: url.to_string(),
                source: other,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
