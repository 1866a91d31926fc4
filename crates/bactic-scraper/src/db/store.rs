// Store abstraction shared by the Postgres and in-memory backends

use async_trait::async_trait;
use bactic_common::types::{
    AthleteId, EventType, HeatId, Meet, MeetId, NewMeet, NewResult, NewSchool, School, SchoolId,
    SourceId,
};

use super::DbResult;

/// Target of an athlete-map edge
///
/// The map is keyed by source ids. An alias edge points at another source id
/// (the athlete's canonical profile id); a canonical key points at the
/// global athlete id. Keeping the two kinds apart means a global id can
/// never be mistaken for a source id when following a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappedId {
    Canonical(SourceId),
    Global(AthleteId),
}

/// Persistence operations used by the ingestion core
///
/// Every `create_*` call is an atomic check-then-create: when two callers
/// race on the same key, exactly one row is written and the loser gets the
/// winner's row back with `created == false`.
#[async_trait]
pub trait Store: Send + Sync {
    // ========================================================================
    // Athlete identity
    // ========================================================================

    /// Single hop of the athlete map
    async fn athlete_mapping(&self, id: SourceId) -> DbResult<Option<MappedId>>;

    /// Record `external -> canonical` unless `external` is already mapped
    async fn link_alias(&self, external: SourceId, canonical: SourceId) -> DbResult<()>;

    /// Create the athlete for `canonical` with map edges for both ids
    ///
    /// Returns the athlete that owns `canonical` after the call and whether
    /// this call created it.
    async fn create_athlete(
        &self,
        canonical: SourceId,
        external: SourceId,
        name: &str,
    ) -> DbResult<(AthleteId, bool)>;

    // ========================================================================
    // Schools
    // ========================================================================

    async fn school_by_url(&self, url: &str) -> DbResult<Option<School>>;

    async fn create_school(&self, school: &NewSchool) -> DbResult<(School, bool)>;

    // ========================================================================
    // Meets and heats
    // ========================================================================

    async fn meet_by_source(&self, source_url: &str) -> DbResult<Option<Meet>>;

    async fn create_meet(&self, meet: &NewMeet) -> DbResult<(Meet, bool)>;

    /// Record that every page of the meet has been ingested
    async fn complete_meet(&self, meet_id: MeetId) -> DbResult<()>;

    /// Delete the heats (and their results) of a meet that never completed
    ///
    /// Returns the number of heats removed.
    async fn clear_heats(&self, meet_id: MeetId) -> DbResult<u64>;

    /// Write a heat, its results and the implied affiliations as one unit
    ///
    /// Nothing is visible if any row fails.
    async fn insert_heat(
        &self,
        meet_id: MeetId,
        event_type: EventType,
        results: &[NewResult],
        affiliations: &[(AthleteId, SchoolId)],
    ) -> DbResult<HeatId>;
}
