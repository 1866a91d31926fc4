//! Athlete identity convergence tests
//!
//! Link ids differ between result pages for the same athlete. These tests
//! drive the resolver against the in-memory store and check that every id
//! ends up on one athlete within two map hops.

use bactic_common::types::SourceId;
use bactic_scraper::db::{MappedId, MemoryStore, Store};
use bactic_scraper::ingest::tfrrs::AthleteProfile;
use bactic_scraper::ingest::{IdentityError, IdentityResolver};
use std::sync::Arc;

fn profile(canonical: u32, name: &str) -> AthleteProfile {
    AthleteProfile {
        canonical_id: SourceId(canonical),
        name: name.to_string(),
    }
}

fn resolver() -> (Arc<MemoryStore>, IdentityResolver) {
    let store = Arc::new(MemoryStore::new());
    let resolver = IdentityResolver::new(store.clone());
    (store, resolver)
}

// ============================================================================
// Convergence
// ============================================================================

#[tokio::test]
async fn test_aliases_converge_on_one_athlete() {
    let (store, resolver) = resolver();
    let jane = profile(500, "Jane Runner");

    let first = resolver.resolve_or_create(SourceId(101), &jane).await.unwrap();
    let second = resolver.resolve_or_create(SourceId(202), &jane).await.unwrap();
    let direct = resolver.resolve_or_create(SourceId(500), &jane).await.unwrap();

    assert!(first.is_new);
    assert!(!second.is_new);
    assert!(!direct.is_new);
    assert_eq!(first.athlete_id, second.athlete_id);
    assert_eq!(first.athlete_id, direct.athlete_id);
    assert_eq!(store.athlete_count().await, 1);

    assert_eq!(
        store.athlete_mapping(SourceId(500)).await.unwrap(),
        Some(MappedId::Global(first.athlete_id))
    );
    assert_eq!(
        store.athlete_mapping(SourceId(202)).await.unwrap(),
        Some(MappedId::Canonical(SourceId(500)))
    );
}

#[tokio::test]
async fn test_known_id_resolves_without_profile() {
    let (_, resolver) = resolver();
    let created = resolver
        .resolve_or_create(SourceId(7), &profile(7, "Sam Sprinter"))
        .await
        .unwrap();

    assert_eq!(resolver.lookup(SourceId(7)).await.unwrap(), Some(created.athlete_id));
    assert_eq!(resolver.require(SourceId(7)).await.unwrap(), created.athlete_id);
    assert_eq!(resolver.lookup(SourceId(8)).await.unwrap(), None);
}

#[tokio::test]
async fn test_alias_of_alias_stays_within_two_hops() {
    let (store, resolver) = resolver();
    let created = resolver
        .resolve_or_create(SourceId(11), &profile(10, "Kim Thrower"))
        .await
        .unwrap();

    // A profile page that reports an alias id as its own
    let resolution = resolver
        .resolve_or_create(SourceId(12), &profile(11, "Kim Thrower"))
        .await
        .unwrap();

    assert_eq!(resolution.athlete_id, created.athlete_id);
    assert_eq!(
        store.athlete_mapping(SourceId(12)).await.unwrap(),
        Some(MappedId::Canonical(SourceId(10)))
    );
    assert_eq!(resolver.require(SourceId(12)).await.unwrap(), created.athlete_id);
}

#[tokio::test]
async fn test_existing_edges_are_never_rewritten() {
    let (store, resolver) = resolver();
    let first = resolver
        .resolve_or_create(SourceId(30), &profile(31, "Alex Hurdler"))
        .await
        .unwrap();

    store.link_alias(SourceId(30), SourceId(99)).await.unwrap();

    assert_eq!(
        store.athlete_mapping(SourceId(30)).await.unwrap(),
        Some(MappedId::Canonical(SourceId(31)))
    );
    assert_eq!(resolver.require(SourceId(30)).await.unwrap(), first.athlete_id);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolution_creates_one_athlete() {
    let (store, resolver) = resolver();
    let shared = profile(4000, "Pat Distance");

    let handles: Vec<_> = (0..16u32)
        .map(|n| {
            let resolver = resolver.clone();
            let shared = shared.clone();
            tokio::spawn(async move {
                resolver
                    .resolve_or_create(SourceId(4100 + n), &shared)
                    .await
            })
        })
        .collect();

    let mut resolutions = Vec::new();
    for handle in handles {
        resolutions.push(handle.await.unwrap().unwrap());
    }

    let athlete = resolutions[0].athlete_id;
    assert!(resolutions.iter().all(|r| r.athlete_id == athlete));
    assert_eq!(resolutions.iter().filter(|r| r.is_new).count(), 1);
    assert_eq!(store.athlete_count().await, 1);

    for n in 0..16u32 {
        assert_eq!(resolver.require(SourceId(4100 + n)).await.unwrap(), athlete);
    }
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_unknown_id_fails_second_pass() {
    let (_, resolver) = resolver();
    let err = resolver.require(SourceId(404)).await.unwrap_err();
    assert!(matches!(err, IdentityError::Unresolved(SourceId(404))));
    assert!(err.is_invariant_violation());
}

#[tokio::test]
async fn test_dangling_alias_is_a_broken_chain() {
    let (store, resolver) = resolver();
    store.link_alias(SourceId(1), SourceId(2)).await.unwrap();

    let err = resolver.lookup(SourceId(1)).await.unwrap_err();
    assert!(matches!(
        err,
        IdentityError::BrokenChain {
            external: SourceId(1),
            canonical: SourceId(2)
        }
    ));
}
