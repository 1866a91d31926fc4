// PostgreSQL Store

use async_trait::async_trait;
use bactic_common::types::{
    AthleteId, Division, EventType, HeatId, Meet, MeetId, NewMeet, NewResult, NewSchool, School,
    SchoolId, Season, SourceId,
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::{DbError, DbResult, MappedId, Store};

/// Store backed by the schema in `migrations/`
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }

    async fn leagues_of(&self, school_id: i64) -> DbResult<Vec<String>> {
        let leagues: Vec<String> =
            sqlx::query_scalar("SELECT name FROM league WHERE school_id = $1 ORDER BY name")
                .bind(school_id)
                .fetch_all(&self.db)
                .await?;
        Ok(leagues)
    }

    async fn insert_result(
        tx: &mut Transaction<'_, Postgres>,
        heat_id: i64,
        result: &NewResult,
    ) -> DbResult<()> {
        let place = i32::try_from(result.place)
            .map_err(|_| DbError::integrity(format!("place {} out of range", result.place)))?;

        let result_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO result (heat_id, athlete_id, place, quantity, wind, stage, team)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(heat_id)
        .bind(result.athlete_id.map(|id| id.0))
        .bind(place)
        .bind(result.quantity)
        .bind(result.wind)
        .bind(result.stage.map(|stage| stage.code()))
        .bind(result.team.as_deref())
        .fetch_one(&mut **tx)
        .await?;

        for (leg, member) in result.members.iter().enumerate() {
            let leg = i16::try_from(leg + 1)
                .map_err(|_| DbError::integrity("relay has too many members"))?;
            sqlx::query("INSERT INTO relay_member (result_id, leg, athlete_id) VALUES ($1, $2, $3)")
                .bind(result_id)
                .bind(leg)
                .bind(member.0)
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }
}

fn decode_mapping(mapped_id: i64, is_global: bool) -> DbResult<MappedId> {
    if is_global {
        return Ok(MappedId::Global(AthleteId(mapped_id)));
    }
    u32::try_from(mapped_id)
        .map(|id| MappedId::Canonical(SourceId(id)))
        .map_err(|_| DbError::integrity(format!("alias target {} is not a source id", mapped_id)))
}

type MeetRow = (i64, String, NaiveDate, i16, String, Option<DateTime<Utc>>);

const MEET_COLUMNS: &str = "id, name, date, season, source_url, ingested_at";

fn decode_meet(row: MeetRow) -> DbResult<Meet> {
    let (id, name, date, season, source_url, ingested_at) = row;
    let season = Season::from_code(season).map_err(|e| DbError::integrity(e.to_string()))?;
    Ok(Meet {
        id: MeetId(id),
        name,
        date,
        season,
        source_url,
        ingested_at,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn athlete_mapping(&self, id: SourceId) -> DbResult<Option<MappedId>> {
        let row: Option<(i64, bool)> =
            sqlx::query_as("SELECT mapped_id, is_global FROM athlete_map WHERE external_id = $1")
                .bind(i64::from(id.0))
                .fetch_optional(&self.db)
                .await?;

        row.map(|(mapped_id, is_global)| decode_mapping(mapped_id, is_global))
            .transpose()
    }

    async fn link_alias(&self, external: SourceId, canonical: SourceId) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO athlete_map (external_id, mapped_id, is_global)
            VALUES ($1, $2, FALSE)
            ON CONFLICT (external_id) DO NOTHING
            "#,
        )
        .bind(i64::from(external.0))
        .bind(i64::from(canonical.0))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn create_athlete(
        &self,
        canonical: SourceId,
        external: SourceId,
        name: &str,
    ) -> DbResult<(AthleteId, bool)> {
        let mut tx = self.db.begin().await?;

        let athlete_id: i64 =
            sqlx::query_scalar("INSERT INTO athlete (name) VALUES ($1) RETURNING id")
                .bind(name)
                .fetch_one(&mut *tx)
                .await?;

        // Blocks behind a concurrent insert of the same key until it commits
        let claimed: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO athlete_map (external_id, mapped_id, is_global)
            VALUES ($1, $2, TRUE)
            ON CONFLICT (external_id) DO NOTHING
            RETURNING mapped_id
            "#,
        )
        .bind(i64::from(canonical.0))
        .bind(athlete_id)
        .fetch_optional(&mut *tx)
        .await?;

        let created = claimed.is_some();
        if created {
            if external != canonical {
                sqlx::query(
                    r#"
                    INSERT INTO athlete_map (external_id, mapped_id, is_global)
                    VALUES ($1, $2, FALSE)
                    ON CONFLICT (external_id) DO NOTHING
                    "#,
                )
                .bind(i64::from(external.0))
                .bind(i64::from(canonical.0))
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            return Ok((AthleteId(athlete_id), true));
        }

        // Lost the race: discard our athlete row and adopt the winner's
        tx.rollback().await?;
        debug!(canonical = %canonical, "Athlete created concurrently, adopting existing row");

        match self.athlete_mapping(canonical).await? {
            Some(MappedId::Global(existing)) => {
                if external != canonical {
                    self.link_alias(external, canonical).await?;
                }
                Ok((existing, false))
            },
            Some(MappedId::Canonical(other)) => Err(DbError::integrity(format!(
                "canonical id {} is mapped as an alias of {}",
                canonical, other
            ))),
            None => Err(DbError::not_found("athlete mapping", canonical)),
        }
    }

    async fn school_by_url(&self, url: &str) -> DbResult<Option<School>> {
        let row: Option<(i64, String, i16, String)> =
            sqlx::query_as("SELECT id, name, division, url FROM school WHERE url = $1")
                .bind(url)
                .fetch_optional(&self.db)
                .await?;

        let Some((id, name, division, url)) = row else {
            return Ok(None);
        };

        let division = Division::from_code(division).map_err(|e| DbError::integrity(e.to_string()))?;
        let leagues = self.leagues_of(id).await?;

        Ok(Some(School {
            id: SchoolId(id),
            name,
            division,
            url,
            leagues,
        }))
    }

    async fn create_school(&self, school: &NewSchool) -> DbResult<(School, bool)> {
        let mut tx = self.db.begin().await?;

        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO school (name, division, url)
            VALUES ($1, $2, $3)
            ON CONFLICT (url) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&school.name)
        .bind(school.division.code())
        .bind(&school.url)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(school_id) = inserted else {
            tx.rollback().await?;
            let existing = self
                .school_by_url(&school.url)
                .await?
                .ok_or_else(|| DbError::not_found("school", &school.url))?;
            return Ok((existing, false));
        };

        for league in &school.leagues {
            sqlx::query(
                "INSERT INTO league (school_id, name) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(school_id)
            .bind(league)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let mut leagues = school.leagues.clone();
        leagues.sort();
        leagues.dedup();

        Ok((
            School {
                id: SchoolId(school_id),
                name: school.name.clone(),
                division: school.division,
                url: school.url.clone(),
                leagues,
            },
            true,
        ))
    }

    async fn meet_by_source(&self, source_url: &str) -> DbResult<Option<Meet>> {
        let row: Option<MeetRow> = sqlx::query_as(&format!(
            "SELECT {} FROM meet WHERE source_url = $1",
            MEET_COLUMNS
        ))
        .bind(source_url)
        .fetch_optional(&self.db)
        .await?;

        row.map(decode_meet).transpose()
    }

    async fn create_meet(&self, meet: &NewMeet) -> DbResult<(Meet, bool)> {
        let mut tx = self.db.begin().await?;

        // Serialize check-then-insert per source link
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&meet.source_url)
            .execute(&mut *tx)
            .await?;

        let existing: Option<MeetRow> = sqlx::query_as(&format!(
            "SELECT {} FROM meet WHERE source_url = $1",
            MEET_COLUMNS
        ))
        .bind(&meet.source_url)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = existing {
            tx.commit().await?;
            return Ok((decode_meet(row)?, false));
        }

        let meet_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO meet (name, date, season, source_url)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&meet.name)
        .bind(meet.date)
        .bind(meet.season.code())
        .bind(&meet.source_url)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((
            Meet {
                id: MeetId(meet_id),
                name: meet.name.clone(),
                date: meet.date,
                season: meet.season,
                source_url: meet.source_url.clone(),
                ingested_at: None,
            },
            true,
        ))
    }

    async fn complete_meet(&self, meet_id: MeetId) -> DbResult<()> {
        let updated = sqlx::query(
            "UPDATE meet SET ingested_at = NOW() WHERE id = $1 AND ingested_at IS NULL",
        )
        .bind(meet_id.0)
        .execute(&self.db)
        .await?
        .rows_affected();

        debug!(meet_id = %meet_id, updated, "Meet marked ingested");
        Ok(())
    }

    async fn clear_heats(&self, meet_id: MeetId) -> DbResult<u64> {
        // Results and relay members go with their heat
        let removed = sqlx::query("DELETE FROM heat WHERE meet_id = $1")
            .bind(meet_id.0)
            .execute(&self.db)
            .await?
            .rows_affected();
        Ok(removed)
    }

    async fn insert_heat(
        &self,
        meet_id: MeetId,
        event_type: EventType,
        results: &[NewResult],
        affiliations: &[(AthleteId, SchoolId)],
    ) -> DbResult<HeatId> {
        let mut tx = self.db.begin().await?;

        let heat_id: i64 =
            sqlx::query_scalar("INSERT INTO heat (meet_id, event_type) VALUES ($1, $2) RETURNING id")
                .bind(meet_id.0)
                .bind(event_type.code())
                .fetch_one(&mut *tx)
                .await?;

        for result in results {
            Self::insert_result(&mut tx, heat_id, result).await?;
        }

        for (athlete_id, school_id) in affiliations {
            sqlx::query(
                r#"
                INSERT INTO athlete_in_school (athlete_id, school_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(athlete_id.0)
            .bind(school_id.0)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            heat_id,
            meet_id = %meet_id,
            event = %event_type,
            results = results.len(),
            "Heat committed"
        );

        Ok(HeatId(heat_id))
    }
}
