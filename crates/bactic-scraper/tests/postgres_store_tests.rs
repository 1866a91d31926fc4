//! Postgres store tests
//!
//! These run against the database named by `DATABASE_URL` and are skipped
//! when it is unset. Keys are salted per run so a shared development
//! database can be reused.

use bactic_common::types::{
    AthleteId, Division, EventType, NewMeet, NewResult, NewSchool, Season, SourceId, Stage,
};
use bactic_scraper::db::{self, DbConfig, MappedId, PgStore, Store};
use chrono::{NaiveDate, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock};

static NEXT_ID: AtomicU32 = AtomicU32::new(0);

// Source ids above the range real links use, offset per run
static RUN_BASE: LazyLock<u32> =
    LazyLock::new(|| 3_000_000_000 + (Utc::now().timestamp() % 1_000_000) as u32 * 1_000);

async fn connect() -> Option<PgStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = DbConfig {
        url,
        max_connections: 8,
        min_connections: 0,
        ..DbConfig::default()
    };
    let pool = db::create_pool(&config).await.expect("connect to DATABASE_URL");
    db::migrate(&pool).await.expect("apply migrations");
    Some(PgStore::new(pool))
}

/// A run-unique key suffix
fn salt() -> String {
    format!(
        "{}-{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        NEXT_ID.fetch_add(1, Ordering::Relaxed)
    )
}

fn source_id() -> SourceId {
    SourceId(*RUN_BASE + NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

macro_rules! store_or_skip {
    () => {
        match connect().await {
            Some(store) => store,
            None => {
                eprintln!("DATABASE_URL not set, skipping");
                return;
            },
        }
    };
}

fn new_meet(salt: &str) -> NewMeet {
    NewMeet {
        name: "Spring Invitational".to_string(),
        date: NaiveDate::from_ymd_opt(2023, 4, 28).unwrap(),
        season: Season::Outdoor,
        source_url: format!("https://www.tfrrs.org/results/{}/Spring_Invitational", salt),
    }
}

// ============================================================================
// Athletes
// ============================================================================

#[tokio::test]
async fn test_create_athlete_writes_both_edges() {
    let store = store_or_skip!();
    let canonical = source_id();
    let external = source_id();

    let (athlete_id, created) = store
        .create_athlete(canonical, external, "Jane Runner")
        .await
        .unwrap();
    assert!(created);

    assert_eq!(
        store.athlete_mapping(canonical).await.unwrap(),
        Some(MappedId::Global(athlete_id))
    );
    assert_eq!(
        store.athlete_mapping(external).await.unwrap(),
        Some(MappedId::Canonical(canonical))
    );
}

#[tokio::test]
async fn test_concurrent_create_athlete_converges() {
    let store = store_or_skip!();
    let store = Arc::new(store);
    let canonical = source_id();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let external = source_id();
            tokio::spawn(async move { store.create_athlete(canonical, external, "Pat").await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }

    let athlete = outcomes[0].0;
    assert!(outcomes.iter().all(|(id, _)| *id == athlete));
    assert_eq!(outcomes.iter().filter(|(_, created)| *created).count(), 1);
}

#[tokio::test]
async fn test_link_alias_never_overwrites() {
    let store = store_or_skip!();
    let external = source_id();
    let first = source_id();

    store.link_alias(external, first).await.unwrap();
    store.link_alias(external, source_id()).await.unwrap();

    assert_eq!(
        store.athlete_mapping(external).await.unwrap(),
        Some(MappedId::Canonical(first))
    );
}

// ============================================================================
// Schools and meets
// ============================================================================

#[tokio::test]
async fn test_create_school_is_idempotent() {
    let store = store_or_skip!();
    let school = NewSchool {
        name: "Pomona-Pitzer".to_string(),
        division: Division::DIII,
        url: format!("https://www.tfrrs.org/teams/{}.html", salt()),
        leagues: vec!["SCIAC".to_string(), "West Region".to_string()],
    };

    let (first, created) = store.create_school(&school).await.unwrap();
    assert!(created);
    let (second, created) = store.create_school(&school).await.unwrap();
    assert!(!created);

    assert_eq!(first.id, second.id);
    assert_eq!(second.division, Division::DIII);
    assert_eq!(second.leagues, school.leagues);
    assert_eq!(store.school_by_url(&school.url).await.unwrap(), Some(first));
}

#[tokio::test]
async fn test_duplicate_meet_returns_existing_row() {
    let store = store_or_skip!();
    let meet = new_meet(&salt());

    let (first, created) = store.create_meet(&meet).await.unwrap();
    assert!(created);
    let (second, created) = store.create_meet(&meet).await.unwrap();
    assert!(!created);

    assert_eq!(first, second);
    assert_eq!(store.meet_by_source(&meet.source_url).await.unwrap(), Some(first));
}

// ============================================================================
// Heats
// ============================================================================

#[tokio::test]
async fn test_insert_heat_with_relay_members() {
    let store = store_or_skip!();
    let (meet, _) = store.create_meet(&new_meet(&salt())).await.unwrap();
    let (school, _) = store
        .create_school(&NewSchool {
            name: "Amherst".to_string(),
            division: Division::DIII,
            url: format!("https://www.tfrrs.org/teams/{}.html", salt()),
            leagues: Vec::new(),
        })
        .await
        .unwrap();

    let mut members = Vec::new();
    for _ in 0..4 {
        let id = source_id();
        members.push(store.create_athlete(id, id, "Leg").await.unwrap().0);
    }

    let relay = NewResult {
        athlete_id: None,
        school_id: Some(school.id),
        place: 1,
        quantity: 195.2,
        wind: None,
        stage: Some(Stage::Final),
        team: Some("Amherst".to_string()),
        members: members.clone(),
    };
    let affiliations: Vec<_> = members.iter().map(|id| (*id, school.id)).collect();

    let heat_id = store
        .insert_heat(meet.id, EventType::T4x400Relay, &[relay], &affiliations)
        .await
        .unwrap();

    let legs: Vec<i64> = sqlx::query_scalar(
        "SELECT rm.athlete_id FROM relay_member rm JOIN result r ON r.id = rm.result_id \
         WHERE r.heat_id = $1 ORDER BY rm.leg",
    )
    .bind(heat_id.0)
    .fetch_all(store.pool())
    .await
    .unwrap();
    assert_eq!(legs, members.iter().map(|id| id.0).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_failed_heat_rolls_back() {
    let store = store_or_skip!();
    let (meet, _) = store.create_meet(&new_meet(&salt())).await.unwrap();
    let id = source_id();
    let (athlete, _) = store.create_athlete(id, id, "Solo").await.unwrap();

    let good = NewResult {
        athlete_id: Some(athlete),
        school_id: None,
        place: 1,
        quantity: 841.29,
        wind: None,
        stage: None,
        team: None,
        members: Vec::new(),
    };
    // References an athlete that does not exist
    let bad = NewResult {
        athlete_id: Some(AthleteId(i64::MAX)),
        place: 2,
        ..good.clone()
    };

    let outcome = store
        .insert_heat(meet.id, EventType::T5000M, &[good, bad], &[])
        .await;
    assert!(outcome.is_err());

    let heats: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM heat WHERE meet_id = $1")
        .bind(meet.id.0)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(heats, 0);
}

#[tokio::test]
async fn test_clear_heats_and_complete_meet() {
    let store = store_or_skip!();
    let (meet, _) = store.create_meet(&new_meet(&salt())).await.unwrap();
    assert!(meet.ingested_at.is_none());
    let id = source_id();
    let (athlete, _) = store.create_athlete(id, id, "Solo").await.unwrap();

    let result = NewResult {
        athlete_id: Some(athlete),
        school_id: None,
        place: 1,
        quantity: 841.29,
        wind: None,
        stage: None,
        team: None,
        members: Vec::new(),
    };
    for _ in 0..2 {
        store
            .insert_heat(meet.id, EventType::T5000M, &[result.clone()], &[])
            .await
            .unwrap();
    }

    assert_eq!(store.clear_heats(meet.id).await.unwrap(), 2);
    let results: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM result r JOIN heat h ON h.id = r.heat_id WHERE h.meet_id = $1",
    )
    .bind(meet.id.0)
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(results, 0);

    store.complete_meet(meet.id).await.unwrap();
    let stored = store.meet_by_source(&meet.source_url).await.unwrap().unwrap();
    assert!(stored.ingested_at.is_some());
}
