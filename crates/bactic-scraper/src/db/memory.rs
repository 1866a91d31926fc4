// In-memory Store
//
// Enforces the same keys and references as the Postgres schema so the
// ingestion core behaves identically against either backend.

use async_trait::async_trait;
use bactic_common::types::{
    Athlete, AthleteId, EventResult, EventType, Heat, HeatId, Meet, MeetId, NewMeet, NewResult,
    NewSchool, ResultId, School, SchoolId, SourceId,
};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::Mutex;

use super::{DbError, DbResult, MappedId, Store};

#[derive(Default)]
struct Tables {
    next_id: i64,
    athletes: BTreeMap<AthleteId, String>,
    athlete_map: HashMap<SourceId, MappedId>,
    schools: BTreeMap<SchoolId, School>,
    athlete_in_school: BTreeSet<(AthleteId, SchoolId)>,
    meets: BTreeMap<MeetId, Meet>,
    heats: BTreeMap<HeatId, Heat>,
    results: BTreeMap<ResultId, EventResult>,
    fail_result_at: Option<usize>,
}

impl Tables {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local store, used by tests and `--dry-run`
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next heat insert fail on its `index`-th result row
    pub async fn fail_result_insert_at(&self, index: usize) {
        self.tables.lock().await.fail_result_at = Some(index);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub async fn athlete_count(&self) -> usize {
        self.tables.lock().await.athletes.len()
    }

    pub async fn school_count(&self) -> usize {
        self.tables.lock().await.schools.len()
    }

    pub async fn meet_count(&self) -> usize {
        self.tables.lock().await.meets.len()
    }

    pub async fn heat_count(&self) -> usize {
        self.tables.lock().await.heats.len()
    }

    pub async fn result_count(&self) -> usize {
        self.tables.lock().await.results.len()
    }

    pub async fn athlete(&self, id: AthleteId) -> Option<Athlete> {
        let tables = self.tables.lock().await;
        let name = tables.athletes.get(&id)?.clone();
        let schools = tables
            .athlete_in_school
            .iter()
            .filter(|(athlete, _)| *athlete == id)
            .map(|(_, school)| *school)
            .collect();
        Some(Athlete { id, name, schools })
    }

    pub async fn heats(&self) -> Vec<Heat> {
        self.tables.lock().await.heats.values().copied().collect()
    }

    pub async fn results_for_heat(&self, heat_id: HeatId) -> Vec<EventResult> {
        self.tables
            .lock()
            .await
            .results
            .values()
            .filter(|result| result.heat_id == heat_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn athlete_mapping(&self, id: SourceId) -> DbResult<Option<MappedId>> {
        Ok(self.tables.lock().await.athlete_map.get(&id).copied())
    }

    async fn link_alias(&self, external: SourceId, canonical: SourceId) -> DbResult<()> {
        self.tables
            .lock()
            .await
            .athlete_map
            .entry(external)
            .or_insert(MappedId::Canonical(canonical));
        Ok(())
    }

    async fn create_athlete(
        &self,
        canonical: SourceId,
        external: SourceId,
        name: &str,
    ) -> DbResult<(AthleteId, bool)> {
        let mut tables = self.tables.lock().await;

        let (athlete_id, created) = match tables.athlete_map.get(&canonical).copied() {
            Some(MappedId::Global(existing)) => (existing, false),
            Some(MappedId::Canonical(other)) => {
                return Err(DbError::integrity(format!(
                    "canonical id {} is mapped as an alias of {}",
                    canonical, other
                )));
            },
            None => {
                let athlete_id = AthleteId(tables.allocate());
                tables.athletes.insert(athlete_id, name.to_string());
                tables
                    .athlete_map
                    .insert(canonical, MappedId::Global(athlete_id));
                (athlete_id, true)
            },
        };

        if external != canonical {
            tables
                .athlete_map
                .entry(external)
                .or_insert(MappedId::Canonical(canonical));
        }

        Ok((athlete_id, created))
    }

    async fn school_by_url(&self, url: &str) -> DbResult<Option<School>> {
        Ok(self
            .tables
            .lock()
            .await
            .schools
            .values()
            .find(|school| school.url == url)
            .cloned())
    }

    async fn create_school(&self, school: &NewSchool) -> DbResult<(School, bool)> {
        let mut tables = self.tables.lock().await;

        if let Some(existing) = tables.schools.values().find(|s| s.url == school.url) {
            return Ok((existing.clone(), false));
        }

        let mut leagues = school.leagues.clone();
        leagues.sort();
        leagues.dedup();

        let created = School {
            id: SchoolId(tables.allocate()),
            name: school.name.clone(),
            division: school.division,
            url: school.url.clone(),
            leagues,
        };
        tables.schools.insert(created.id, created.clone());

        Ok((created, true))
    }

    async fn meet_by_source(&self, source_url: &str) -> DbResult<Option<Meet>> {
        Ok(self
            .tables
            .lock()
            .await
            .meets
            .values()
            .find(|meet| meet.source_url == source_url)
            .cloned())
    }

    async fn create_meet(&self, meet: &NewMeet) -> DbResult<(Meet, bool)> {
        let mut tables = self.tables.lock().await;

        if let Some(existing) = tables.meets.values().find(|m| m.source_url == meet.source_url) {
            return Ok((existing.clone(), false));
        }

        let created = Meet {
            id: MeetId(tables.allocate()),
            name: meet.name.clone(),
            date: meet.date,
            season: meet.season,
            source_url: meet.source_url.clone(),
            ingested_at: None,
        };
        tables.meets.insert(created.id, created.clone());

        Ok((created, true))
    }

    async fn complete_meet(&self, meet_id: MeetId) -> DbResult<()> {
        let mut tables = self.tables.lock().await;
        let meet = tables
            .meets
            .get_mut(&meet_id)
            .ok_or_else(|| DbError::integrity(format!("unknown meet {}", meet_id)))?;
        meet.ingested_at.get_or_insert_with(Utc::now);
        Ok(())
    }

    async fn clear_heats(&self, meet_id: MeetId) -> DbResult<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.heats.len();
        tables.heats.retain(|_, heat| heat.meet_id != meet_id);

        let Tables { heats, results, .. } = &mut *tables;
        results.retain(|_, result| heats.contains_key(&result.heat_id));

        Ok((before - tables.heats.len()) as u64)
    }

    async fn insert_heat(
        &self,
        meet_id: MeetId,
        event_type: EventType,
        results: &[NewResult],
        affiliations: &[(AthleteId, SchoolId)],
    ) -> DbResult<HeatId> {
        let mut tables = self.tables.lock().await;
        let fail_at = tables.fail_result_at.take();

        if !tables.meets.contains_key(&meet_id) {
            return Err(DbError::integrity(format!("heat references unknown meet {}", meet_id)));
        }

        // Validate everything before touching the tables
        for (index, result) in results.iter().enumerate() {
            if fail_at == Some(index) {
                return Err(DbError::integrity(format!("injected failure on result {}", index)));
            }
            let referenced = result.athlete_id.iter().chain(result.members.iter());
            for athlete_id in referenced {
                if !tables.athletes.contains_key(athlete_id) {
                    return Err(DbError::integrity(format!(
                        "result references unknown athlete {}",
                        athlete_id
                    )));
                }
            }
        }
        for (athlete_id, school_id) in affiliations {
            if !tables.athletes.contains_key(athlete_id) || !tables.schools.contains_key(school_id)
            {
                return Err(DbError::integrity(format!(
                    "affiliation ({}, {}) references a missing row",
                    athlete_id, school_id
                )));
            }
        }

        let heat_id = HeatId(tables.allocate());
        tables.heats.insert(
            heat_id,
            Heat {
                id: heat_id,
                meet_id,
                event_type,
            },
        );

        for result in results {
            let result_id = ResultId(tables.allocate());
            tables.results.insert(
                result_id,
                EventResult {
                    id: result_id,
                    heat_id,
                    athlete_id: result.athlete_id,
                    place: result.place,
                    quantity: result.quantity,
                    wind: result.wind,
                    stage: result.stage,
                    team: result.team.clone(),
                    members: result.members.clone(),
                },
            );
        }

        tables.athlete_in_school.extend(affiliations.iter().copied());

        Ok(heat_id)
    }
}
