// Athlete Identity Resolution
//
// Result tables link athletes with ids that change from page to page. Each
// link id is mapped to the id in the athlete's own profile URL (the
// canonical id), and each canonical id to one global athlete. Any link id
// reaches its athlete in at most two map hops.

use bactic_common::types::{AthleteId, SourceId};
use std::sync::Arc;
use tracing::debug;

use super::tfrrs::AthleteProfile;
use super::IdentityError;
use crate::db::{MappedId, Store};

type Result<T> = std::result::Result<T, IdentityError>;

/// Outcome of resolving a link id against its profile page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub athlete_id: AthleteId,
    /// True only for the call that created the athlete
    pub is_new: bool,
}

#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn Store>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Follow the map from `external` without touching the network
    ///
    /// `None` means the id has never been seen and its profile page must be
    /// fetched before it can be resolved.
    pub async fn lookup(&self, external: SourceId) -> Result<Option<AthleteId>> {
        match self.store.athlete_mapping(external).await? {
            None => Ok(None),
            Some(MappedId::Global(athlete_id)) => Ok(Some(athlete_id)),
            Some(MappedId::Canonical(canonical)) => {
                match self.store.athlete_mapping(canonical).await? {
                    Some(MappedId::Global(athlete_id)) => Ok(Some(athlete_id)),
                    _ => Err(IdentityError::BrokenChain {
                        external,
                        canonical,
                    }),
                }
            },
        }
    }

    /// Resolve `external` using the profile fetched for it, creating the
    /// athlete when neither id is known
    ///
    /// Concurrent calls for ids that share a canonical id converge on one
    /// athlete; exactly one of them reports `is_new`.
    pub async fn resolve_or_create(
        &self,
        external: SourceId,
        profile: &AthleteProfile,
    ) -> Result<Resolution> {
        if let Some(athlete_id) = self.lookup(external).await? {
            return Ok(Resolution {
                athlete_id,
                is_new: false,
            });
        }

        let canonical = profile.canonical_id;
        match self.store.athlete_mapping(canonical).await? {
            Some(MappedId::Global(athlete_id)) => {
                if external != canonical {
                    self.store.link_alias(external, canonical).await?;
                }
                debug!(external = %external, canonical = %canonical, "Linked id to known athlete");
                return Ok(Resolution {
                    athlete_id,
                    is_new: false,
                });
            },
            // The profile id is itself an alias; point at its target to stay within two hops
            Some(MappedId::Canonical(target)) => {
                let athlete_id = self.lookup(canonical).await?.ok_or(IdentityError::BrokenChain {
                    external: canonical,
                    canonical: target,
                })?;
                self.store.link_alias(external, target).await?;
                return Ok(Resolution {
                    athlete_id,
                    is_new: false,
                });
            },
            None => {},
        }

        let (athlete_id, is_new) = self
            .store
            .create_athlete(canonical, external, &profile.name)
            .await?;

        if is_new {
            debug!(
                athlete_id = %athlete_id,
                canonical = %canonical,
                name = %profile.name,
                "Created athlete"
            );
        }

        Ok(Resolution { athlete_id, is_new })
    }

    /// Second-pass lookup after profile pages were processed
    ///
    /// A miss here means identity state is inconsistent.
    pub async fn require(&self, external: SourceId) -> Result<AthleteId> {
        self.lookup(external)
            .await?
            .ok_or(IdentityError::Unresolved(external))
    }
}
