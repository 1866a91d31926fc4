// Meet and Heat Ingestion

use bactic_common::types::{AthleteId, EventType, HeatId, Meet, MeetId, NewMeet, NewResult, SchoolId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::{DbResult, Store};

#[derive(Clone)]
pub struct MeetIngestor {
    store: Arc<dyn Store>,
}

impl MeetIngestor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create the meet unless one with the same source link exists
    ///
    /// Returns `created == false` with the stored meet for duplicates, so a
    /// feed item seen twice is dispatched once.
    pub async fn ingest_meet(&self, meet: &NewMeet) -> DbResult<(Meet, bool)> {
        let (meet, created) = self.store.create_meet(meet).await?;
        if created {
            info!(
                meet_id = %meet.id,
                name = %meet.name,
                date = %meet.date,
                season = %meet.season,
                "Created meet"
            );
        } else {
            debug!(meet_id = %meet.id, url = %meet.source_url, "Meet already known");
        }
        Ok((meet, created))
    }

    /// Mark the meet as fully ingested so later polls skip it
    pub async fn complete_meet(&self, meet_id: MeetId) -> DbResult<()> {
        self.store.complete_meet(meet_id).await?;
        info!(meet_id = %meet_id, "Meet complete");
        Ok(())
    }

    /// Drop heats left by an interrupted run before ingesting the meet again
    pub async fn reset_meet(&self, meet_id: MeetId) -> DbResult<()> {
        let removed = self.store.clear_heats(meet_id).await?;
        if removed > 0 {
            info!(meet_id = %meet_id, heats = removed, "Cleared heats of incomplete meet");
        }
        Ok(())
    }

    /// Commit one heat with all of its results
    ///
    /// Every (athlete, school) pair implied by the results, relay members
    /// included, is recorded in the same transaction.
    pub async fn ingest_heat(
        &self,
        event_type: EventType,
        meet_id: MeetId,
        results: &[NewResult],
    ) -> DbResult<HeatId> {
        let affiliations = affiliations(results);
        let heat_id = self
            .store
            .insert_heat(meet_id, event_type, results, &affiliations)
            .await?;

        info!(
            heat_id = %heat_id,
            meet_id = %meet_id,
            event = %event_type,
            results = results.len(),
            "Ingested heat"
        );

        Ok(heat_id)
    }
}

fn affiliations(results: &[NewResult]) -> Vec<(AthleteId, SchoolId)> {
    results
        .iter()
        .filter_map(|result| result.school_id.map(|school| (result, school)))
        .flat_map(|(result, school)| {
            result
                .athlete_id
                .into_iter()
                .chain(result.members.iter().copied())
                .map(move |athlete| (athlete, school))
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
